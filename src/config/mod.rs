pub mod merge;
pub mod schema;

pub use schema::*;

use anyhow::Context;
use std::path::{Path, PathBuf};

/// Load configuration by merging an explicit file, the global file, and defaults.
/// Precedence: explicit file > global config > defaults.
///
/// Missing config files are handled gracefully (defaults apply).
pub fn load_config(explicit: Option<&Path>) -> TrackerConfig {
    let global = load_global_config();
    let explicit = explicit.and_then(load_toml_file).unwrap_or_default();

    explicit.with_fallback(global).finalize(&data_dir())
}

/// Load global config from the platform-specific config directory.
/// Returns empty PartialConfig if file not found.
fn load_global_config() -> PartialConfig {
    match global_config_path() {
        Some(p) => load_toml_file(&p).unwrap_or_default(),
        None => {
            tracing::debug!("Could not determine global config directory");
            PartialConfig::default()
        }
    }
}

/// Parse TOML text into a PartialConfig.
pub fn parse_config(contents: &str, path: &Path) -> anyhow::Result<PartialConfig> {
    let file = toml::from_str::<ConfigFile>(contents)
        .with_context(|| format!("Failed to parse {}", path.display()))?;
    Ok(file.to_partial())
}

/// Load and parse a TOML config file into a PartialConfig.
/// Returns None on file-not-found; parse errors are logged and skipped.
fn load_toml_file(path: &Path) -> Option<PartialConfig> {
    match std::fs::read_to_string(path) {
        Ok(contents) => match parse_config(&contents, path) {
            Ok(partial) => {
                tracing::info!("Loaded config from {}", path.display());
                Some(partial)
            }
            Err(e) => {
                tracing::warn!("Config parse error: {:#}", e);
                None
            }
        },
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("No config file at {}, using defaults", path.display());
            None
        }
        Err(e) => {
            tracing::warn!("Failed to read config at {}: {}", path.display(), e);
            None
        }
    }
}

/// Resolve the platform-specific global config path.
/// Linux: ~/.config/tally/tally.toml
fn global_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "tally").map(|dirs| dirs.config_dir().join("tally.toml"))
}

/// Directory that holds snapshots and task lists when not configured.
pub fn data_dir() -> PathBuf {
    directories::ProjectDirs::from("", "", "tally")
        .map(|dirs| dirs.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("./.tally"))
}
