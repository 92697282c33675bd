use super::schema::{PartialConfig, TrackerConfig};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_SAVE_INTERVAL: Duration = Duration::from_secs(30);
pub const DEFAULT_MAX_TASK_AGE: Duration = Duration::from_secs(24 * 60 * 60);
pub const DEFAULT_CLEANUP_MAX_AGE: Duration = Duration::from_secs(60 * 60);
pub const DEFAULT_TASK_LIST: &str = "default";

impl PartialConfig {
    /// Merge self with a lower-priority fallback.
    /// Self's non-None values take precedence.
    pub fn with_fallback(self, fallback: PartialConfig) -> PartialConfig {
        PartialConfig {
            state_file: self.state_file.or(fallback.state_file),
            save_interval: self.save_interval.or(fallback.save_interval),
            max_task_age: self.max_task_age.or(fallback.max_task_age),
            cleanup_max_age: self.cleanup_max_age.or(fallback.cleanup_max_age),
            task_lists_dir: self.task_lists_dir.or(fallback.task_lists_dir),
            default_task_list: self.default_task_list.or(fallback.default_task_list),
        }
    }

    /// Convert to TrackerConfig, filling any remaining gaps with defaults
    /// rooted at `data_dir`.
    pub fn finalize(self, data_dir: &Path) -> TrackerConfig {
        TrackerConfig {
            state_file: self
                .state_file
                .unwrap_or_else(|| data_dir.join("subagents.json")),
            save_interval: self
                .save_interval
                .filter(|interval| {
                    if interval.is_zero() {
                        tracing::warn!("save_interval_secs = 0 is not allowed, using the default");
                    }
                    !interval.is_zero()
                })
                .unwrap_or(DEFAULT_SAVE_INTERVAL),
            max_task_age: self.max_task_age.unwrap_or(DEFAULT_MAX_TASK_AGE),
            cleanup_max_age: self.cleanup_max_age.unwrap_or(DEFAULT_CLEANUP_MAX_AGE),
            task_lists_dir: self
                .task_lists_dir
                .unwrap_or_else(|| data_dir.join("tasks")),
            default_task_list: self
                .default_task_list
                .unwrap_or_else(|| DEFAULT_TASK_LIST.to_string()),
        }
    }
}

impl TrackerConfig {
    /// Defaults only, rooted at `data_dir`.
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        PartialConfig::default().finalize(&data_dir.into())
    }
}
