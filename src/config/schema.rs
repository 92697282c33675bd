use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// The TOML file structure for tally.toml.
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFile {
    pub persistence: Option<PersistenceSection>,
    pub work_items: Option<WorkItemsSection>,
}

#[derive(Debug, Deserialize)]
pub struct PersistenceSection {
    pub state_file: Option<String>,
    pub save_interval_secs: Option<u64>,
    /// Snapshot entries created earlier than this are dropped on load
    /// (running entries are always kept).
    pub max_task_age_secs: Option<u64>,
    pub cleanup_max_age_secs: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct WorkItemsSection {
    pub task_lists_dir: Option<String>,
    pub default_task_list: Option<String>,
}

/// Fully-resolved runtime configuration. All fields have values.
#[derive(Debug, Clone)]
pub struct TrackerConfig {
    pub state_file: PathBuf,
    pub save_interval: Duration,
    pub max_task_age: Duration,
    pub cleanup_max_age: Duration,
    pub task_lists_dir: PathBuf,
    pub default_task_list: String,
}

/// Partial config used during merge. All fields are Option so that
/// missing fields don't override lower-priority values.
#[derive(Debug, Clone, Default)]
pub struct PartialConfig {
    pub state_file: Option<PathBuf>,
    pub save_interval: Option<Duration>,
    pub max_task_age: Option<Duration>,
    pub cleanup_max_age: Option<Duration>,
    pub task_lists_dir: Option<PathBuf>,
    pub default_task_list: Option<String>,
}

impl ConfigFile {
    /// Flatten the sectioned file shape into a [`PartialConfig`].
    pub fn to_partial(&self) -> PartialConfig {
        let persistence = self.persistence.as_ref();
        let work_items = self.work_items.as_ref();
        PartialConfig {
            state_file: persistence
                .and_then(|p| p.state_file.as_ref())
                .map(PathBuf::from),
            save_interval: persistence
                .and_then(|p| p.save_interval_secs)
                .map(Duration::from_secs),
            max_task_age: persistence
                .and_then(|p| p.max_task_age_secs)
                .map(Duration::from_secs),
            cleanup_max_age: persistence
                .and_then(|p| p.cleanup_max_age_secs)
                .map(Duration::from_secs),
            task_lists_dir: work_items
                .and_then(|w| w.task_lists_dir.as_ref())
                .map(PathBuf::from),
            default_task_list: work_items.and_then(|w| w.default_task_list.clone()),
        }
    }
}
