//! Durable snapshots of a [`SubagentRegistry`].
//!
//! The manager owns no canonical data. It listens to the registry's lifecycle
//! events, raises a dirty flag, and a periodic timer writes a snapshot only
//! when that flag is set. Writes go to a temporary file in the target
//! directory which is then persisted over the state file, so a reader never
//! observes a partial snapshot.
//!
//! The dirty flag is cleared *before* each write. A transition that lands
//! mid-write re-raises it and is picked up on the next tick; a failed write
//! restores it so the next tick retries. Timer flushes and forced flushes
//! are serialized, so snapshots reach disk in the order they were taken.
//!
//! Each tick also sweeps finished entries older than the cleanup age.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde::Deserialize;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::filter::TaskFilter;
use super::output;
use crate::config::TrackerConfig;
use crate::config::merge::{DEFAULT_CLEANUP_MAX_AGE, DEFAULT_MAX_TASK_AGE, DEFAULT_SAVE_INTERVAL};
use crate::error::{PersistenceError, PersistenceResult};
use crate::orchestration::events::{ListenerId, SubagentEventKind, listener};
use crate::orchestration::registry::SubagentRegistry;
use crate::orchestration::snapshot::{RegistrySnapshot, SNAPSHOT_VERSION};
use crate::orchestration::types::{SubagentStatus, TrackedSubagent, now_ms};

/// Settings for a [`PersistenceManager`].
#[derive(Clone, Debug)]
pub struct PersistenceOptions {
    pub state_file: PathBuf,
    pub save_interval: Duration,
    /// Entries created longer ago than this are dropped on load unless running.
    pub max_task_age: Duration,
    /// Finished entries older than this are swept on each auto-save tick.
    pub cleanup_max_age: Duration,
}

impl PersistenceOptions {
    pub fn new(state_file: impl Into<PathBuf>) -> Self {
        Self {
            state_file: state_file.into(),
            save_interval: DEFAULT_SAVE_INTERVAL,
            max_task_age: DEFAULT_MAX_TASK_AGE,
            cleanup_max_age: DEFAULT_CLEANUP_MAX_AGE,
        }
    }
}

impl From<&TrackerConfig> for PersistenceOptions {
    fn from(config: &TrackerConfig) -> Self {
        Self {
            state_file: config.state_file.clone(),
            save_interval: config.save_interval,
            max_task_age: config.max_task_age,
            cleanup_max_age: config.cleanup_max_age,
        }
    }
}

#[derive(Deserialize)]
struct SnapshotHeader {
    version: u32,
}

struct Inner {
    registry: SubagentRegistry,
    options: PersistenceOptions,
    dirty: Arc<AtomicBool>,
    /// Held from the dirty-flag swap until the snapshot is persisted.
    flush: Mutex<()>,
    subscriptions: Vec<(SubagentEventKind, ListenerId)>,
}

impl Inner {
    /// Write a snapshot if anything changed since the last successful write.
    fn save_if_dirty(&self) -> bool {
        let _flush = self.flush.lock().unwrap_or_else(PoisonError::into_inner);
        if !self.dirty.swap(false, Ordering::SeqCst) {
            return false;
        }
        match self.write_snapshot() {
            Ok(()) => true,
            Err(e) => {
                self.dirty.store(true, Ordering::SeqCst);
                warn!(path = %self.options.state_file.display(), "Snapshot write failed: {}", e);
                false
            }
        }
    }

    fn save_now(&self) -> PersistenceResult<()> {
        let _flush = self.flush.lock().unwrap_or_else(PoisonError::into_inner);
        self.dirty.store(false, Ordering::SeqCst);
        self.write_snapshot().inspect_err(|_| {
            self.dirty.store(true, Ordering::SeqCst);
        })
    }

    /// Remove finished entries past the cleanup age. Removals emit no events,
    /// so the dirty flag is raised here.
    fn sweep(&self) -> usize {
        let removed = self.registry.cleanup(self.options.cleanup_max_age);
        if removed > 0 {
            self.dirty.store(true, Ordering::SeqCst);
        }
        removed
    }

    fn write_snapshot(&self) -> PersistenceResult<()> {
        let path = &self.options.state_file;
        let snapshot = self.registry.export_state();
        let json = serde_json::to_vec_pretty(&snapshot)?;

        let dir = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(dir).map_err(|e| PersistenceError::io(dir, e))?;

        // Atomic write: temp file in the same directory, then rename over the target.
        let mut tmp =
            tempfile::NamedTempFile::new_in(dir).map_err(|e| PersistenceError::io(dir, e))?;
        tmp.write_all(&json)
            .and_then(|()| tmp.as_file().sync_all())
            .map_err(|e| PersistenceError::io(tmp.path(), e))?;
        tmp.persist(path).map_err(|e| PersistenceError::Persist {
            path: path.clone(),
            message: e.error.to_string(),
        })?;

        debug!(path = %path.display(), tasks = snapshot.tasks.len(), "Snapshot saved");
        Ok(())
    }
}

/// Periodic, crash-safe persistence for a [`SubagentRegistry`].
pub struct PersistenceManager {
    inner: Arc<Inner>,
    shutdown: CancellationToken,
    timer: Mutex<Option<JoinHandle<()>>>,
}

impl PersistenceManager {
    /// Wrap `registry` and subscribe to its lifecycle events.
    ///
    /// The auto-save timer is not running until [`start`](Self::start) is
    /// called.
    pub fn new(registry: SubagentRegistry, options: PersistenceOptions) -> Self {
        let dirty = Arc::new(AtomicBool::new(false));
        let subscriptions = SubagentEventKind::LIFECYCLE
            .into_iter()
            .map(|kind| {
                let dirty = dirty.clone();
                let id = registry.add_event_listener(
                    kind,
                    listener(move |_| {
                        dirty.store(true, Ordering::SeqCst);
                        Ok(())
                    }),
                );
                (kind, id)
            })
            .collect();

        Self {
            inner: Arc::new(Inner {
                registry,
                options,
                dirty,
                flush: Mutex::new(()),
                subscriptions,
            }),
            shutdown: CancellationToken::new(),
            timer: Mutex::new(None),
        }
    }

    pub fn from_config(registry: SubagentRegistry, config: &TrackerConfig) -> Self {
        Self::new(registry, PersistenceOptions::from(config))
    }

    pub fn registry(&self) -> &SubagentRegistry {
        &self.inner.registry
    }

    pub fn state_file(&self) -> &Path {
        &self.inner.options.state_file
    }

    pub fn is_dirty(&self) -> bool {
        self.inner.dirty.load(Ordering::SeqCst)
    }

    /// Launch the auto-save loop. Must be called inside a Tokio runtime.
    /// Calling it again while the loop is running has no effect.
    pub fn start(&self) {
        let mut timer = self.timer.lock().unwrap_or_else(PoisonError::into_inner);
        if timer.is_some() || self.shutdown.is_cancelled() {
            return;
        }

        let inner = self.inner.clone();
        let shutdown = self.shutdown.clone();
        let period = match inner.options.save_interval {
            interval if interval.is_zero() => {
                warn!(
                    fallback_secs = DEFAULT_SAVE_INTERVAL.as_secs(),
                    "Zero save interval is not allowed, using the default"
                );
                DEFAULT_SAVE_INTERVAL
            }
            interval => interval,
        };
        *timer = Some(tokio::spawn(async move {
            let mut ticks = tokio::time::interval_at(Instant::now() + period, period);
            ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticks.tick() => {
                        let inner = inner.clone();
                        let flushed = tokio::task::spawn_blocking(move || {
                            inner.sweep();
                            inner.save_if_dirty();
                        })
                        .await;
                        if let Err(e) = flushed {
                            warn!("Auto-save flush failed: {}", e);
                        }
                    }
                }
            }
        }));
        debug!(interval_ms = period.as_millis() as u64, "Auto-save started");
    }

    /// Whether the auto-save loop is alive.
    pub fn is_running(&self) -> bool {
        self.timer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Write a snapshot if the registry changed since the last write.
    /// Failures are logged and retried on the next tick.
    pub fn save_if_dirty(&self) -> bool {
        self.inner.save_if_dirty()
    }

    /// Write a snapshot immediately, bypassing the timer.
    pub fn save_now(&self) -> PersistenceResult<()> {
        self.inner.save_now()
    }

    /// Restore the registry from the state file.
    ///
    /// Missing, unreadable or malformed files and unknown snapshot versions
    /// leave the registry untouched. Entries older than the retention window
    /// are dropped unless they are still running. Returns the number of
    /// entries imported.
    pub fn load(&self) -> usize {
        let path = &self.inner.options.state_file;
        let contents = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "No subagent snapshot to load");
                return 0;
            }
            Err(e) => {
                warn!(path = %path.display(), "Failed to read subagent snapshot: {}", e);
                return 0;
            }
        };

        match serde_json::from_str::<SnapshotHeader>(&contents) {
            Ok(header) if header.version == SNAPSHOT_VERSION => {}
            Ok(header) => {
                warn!(
                    path = %path.display(),
                    found = header.version,
                    expected = SNAPSHOT_VERSION,
                    "Subagent snapshot version mismatch, not loading"
                );
                return 0;
            }
            Err(e) => {
                warn!(path = %path.display(), "Malformed subagent snapshot: {}", e);
                return 0;
            }
        }

        let mut snapshot: RegistrySnapshot = match serde_json::from_str(&contents) {
            Ok(s) => s,
            Err(e) => {
                warn!(path = %path.display(), "Malformed subagent snapshot: {}", e);
                return 0;
            }
        };

        let max_age_ms = i64::try_from(self.inner.options.max_task_age.as_millis())
            .unwrap_or(i64::MAX);
        let cutoff = now_ms().saturating_sub(max_age_ms);
        let before = snapshot.tasks.len();
        snapshot
            .tasks
            .retain(|t| t.status == SubagentStatus::Running || t.created_at >= cutoff);
        let dropped = before - snapshot.tasks.len();

        match self.inner.registry.import_state(snapshot) {
            Ok(count) => {
                // Imports emit no events; rewrite the file if retention pruned anything.
                self.inner.dirty.store(dropped > 0, Ordering::SeqCst);
                info!(path = %path.display(), loaded = count, dropped, "Loaded subagent snapshot");
                count
            }
            Err(_) => 0,
        }
    }

    /// Tracked subagents matching `filter`, newest first.
    pub fn get_all_tasks(&self, filter: Option<&TaskFilter>) -> Vec<TrackedSubagent> {
        let mut tasks: Vec<_> = self
            .inner
            .registry
            .get_all_subagents()
            .into_iter()
            .filter(|t| filter.is_none_or(|f| f.matches(t)))
            .collect();
        tasks.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
        tasks
    }

    pub fn get_task(&self, id: &str) -> Option<TrackedSubagent> {
        self.inner.registry.get_subagent(id)
    }

    /// Full contents of the task's output file, if it has one and it is readable.
    pub async fn get_task_output(&self, id: &str) -> Option<String> {
        let path = self.output_path(id)?;
        output::read_output(&path).await
    }

    /// Last `lines` lines of the task's output file.
    pub async fn get_task_output_tail(&self, id: &str, lines: usize) -> Option<String> {
        let path = self.output_path(id)?;
        output::read_output_tail(&path, lines).await
    }

    fn output_path(&self, id: &str) -> Option<PathBuf> {
        self.inner
            .registry
            .get_subagent(id)
            .and_then(|t| t.output_file)
            .map(PathBuf::from)
    }

    /// Cancel a running task and flush immediately.
    ///
    /// Returns `false` if the task is unknown or not running. A failed flush
    /// is logged; the dirty flag stays raised so the timer retries.
    pub fn cancel_task(&self, id: &str) -> bool {
        let running = self
            .inner
            .registry
            .get_subagent(id)
            .is_some_and(|t| t.status == SubagentStatus::Running);
        if !running {
            return false;
        }

        self.inner.registry.cancel_subagent(id);
        if let Err(e) = self.inner.save_now() {
            warn!(id, "Failed to persist cancellation: {}", e);
        }
        true
    }

    /// Sweep finished entries older than `max_age` and persist the result.
    pub fn cleanup(&self, max_age: Duration) -> usize {
        let removed = self.inner.registry.cleanup(max_age);
        if removed > 0 {
            if let Err(e) = self.inner.save_now() {
                warn!("Failed to persist cleanup: {}", e);
            }
        }
        removed
    }

    /// Stop the timer, unsubscribe, and flush one last time. Never fails.
    pub async fn dispose(&self) {
        self.shutdown.cancel();
        let handle = self
            .timer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!("Auto-save task ended abnormally: {}", e);
            }
        }

        for (kind, id) in &self.inner.subscriptions {
            self.inner.registry.remove_event_listener(*kind, *id);
        }
        let inner = self.inner.clone();
        if let Err(e) = tokio::task::spawn_blocking(move || inner.save_if_dirty()).await {
            warn!("Final snapshot flush failed: {}", e);
        }
        debug!("Persistence manager disposed");
    }
}

impl Drop for PersistenceManager {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}
