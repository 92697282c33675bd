//! Filesystem watch on a task-list directory.
//!
//! ```text
//! filesystem events (notify)
//!   -> forward over an unbounded channel
//!   -> keep only create/modify/remove of `*.json`
//!   -> drain any burst already queued
//!   -> re-list the directory
//!   -> hand the full list to the callback
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::store::{TASK_FILE_SUFFIX, read_all};
use super::types::WorkItem;
use crate::error::{WorkItemError, WorkItemResult};

pub type WatchCallback = Arc<dyn Fn(Vec<WorkItem>) + Send + Sync>;

/// Live subscription. Dropping it stops the watch.
pub struct DirectoryWatch {
    /// Dropping the `notify` handle stops filesystem monitoring.
    _watcher: RecommendedWatcher,
    task: JoinHandle<()>,
}

fn is_relevant(event: &Event) -> bool {
    let kind_matches = matches!(
        event.kind,
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_) | EventKind::Any
    );
    kind_matches
        && event.paths.iter().any(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.ends_with(TASK_FILE_SUFFIX))
        })
}

impl DirectoryWatch {
    /// Start watching `dir`. Must be called inside a Tokio runtime.
    pub fn spawn(dir: PathBuf, callback: WatchCallback) -> WorkItemResult<Self> {
        let (raw_tx, mut raw_rx) = mpsc::unbounded_channel::<notify::Result<Event>>();

        let mut watcher = RecommendedWatcher::new(
            move |res| {
                let _ = raw_tx.send(res);
            },
            notify::Config::default(),
        )
        .map_err(|e| watch_error(&dir, e))?;
        watcher
            .watch(&dir, RecursiveMode::NonRecursive)
            .map_err(|e| watch_error(&dir, e))?;
        info!(path = %dir.display(), "Watching task list directory");

        let task = tokio::spawn(async move {
            while let Some(res) = raw_rx.recv().await {
                match res {
                    Ok(event) if is_relevant(&event) => {}
                    Ok(_) => continue,
                    Err(e) => {
                        warn!(path = %dir.display(), error = %e, "Task list watch error");
                        continue;
                    }
                }
                // Coalesce whatever else is already queued into this one re-list.
                while raw_rx.try_recv().is_ok() {}

                match read_all(&dir).await {
                    Ok(items) => {
                        debug!(path = %dir.display(), count = items.len(), "Task list changed");
                        callback(items);
                    }
                    Err(e) => warn!(path = %dir.display(), "Failed to re-list tasks: {}", e),
                }
            }
        });

        Ok(Self {
            _watcher: watcher,
            task,
        })
    }
}

impl Drop for DirectoryWatch {
    fn drop(&mut self) {
        self.task.abort();
    }
}

fn watch_error(dir: &Path, e: notify::Error) -> WorkItemError {
    WorkItemError::Watch {
        path: dir.to_path_buf(),
        message: e.to_string(),
    }
}
