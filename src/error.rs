use std::path::PathBuf;

/// Errors raised by the subagent registry when importing state.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("Snapshot version mismatch: found {found}, expected {expected}")]
    VersionMismatch { found: u32, expected: u32 },
}

/// Errors related to durable snapshots of the subagent registry.
#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Snapshot serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Failed to replace snapshot at {path}: {message}")]
    Persist { path: PathBuf, message: String },
}

/// Errors related to the file-backed work-item store.
#[derive(Debug, thiserror::Error)]
pub enum WorkItemError {
    #[error("Task not found: {0}")]
    NotFound(String),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed task file {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to watch {path}: {message}")]
    Watch { path: PathBuf, message: String },
}

impl WorkItemError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

impl PersistenceError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

pub type PersistenceResult<T> = Result<T, PersistenceError>;
pub type WorkItemResult<T> = Result<T, WorkItemError>;
