//! Central in-memory registry for subagent executions.
//!
//! [`SubagentRegistry`] is the single source of truth for subagent lifecycle
//! state. It wraps a `HashMap` plus two secondary indices (session id and
//! agent id) behind `Arc<Mutex<..>>` so the orchestrator, the persistence
//! layer and any UI can share one instance through cheap clones.
//!
//! **Lifecycle:** `pending -> running -> {completed, failed, cancelled, stopped}`.
//! Transitions are not checked against the current status; callers are
//! trusted to drive them in order.
//!
//! **Events:** every state change is published on the [`EventBus`] after the
//! lock is released, so listeners may call back into the registry.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tracing::{debug, error, info, warn};

use super::events::{EventBus, Listener, ListenerId, SubagentEvent, SubagentEventKind};
use super::hooks::{OneShotHook, OneShotHooks};
use super::snapshot::{RegistrySnapshot, SNAPSHOT_VERSION};
use super::types::{
    SubagentId, SubagentInput, SubagentStatus, TaskNotification, TrackedSubagent, now_ms,
};
use crate::error::RegistryError;
use crate::notification::{NoopSink, NotificationSink, SubagentNotification};

#[derive(Default)]
struct RegistryState {
    subagents: HashMap<SubagentId, TrackedSubagent>,
    by_session: HashMap<String, HashSet<SubagentId>>,
    /// Reverse index from external resume handle to subagent id.
    by_agent_id: HashMap<String, SubagentId>,
}

impl RegistryState {
    fn index(&mut self, subagent: &TrackedSubagent) {
        self.by_session
            .entry(subagent.parent_session_id.clone())
            .or_default()
            .insert(subagent.id.clone());
        if let Some(agent_id) = &subagent.agent_id {
            self.by_agent_id
                .insert(agent_id.clone(), subagent.id.clone());
        }
    }

    fn remove(&mut self, id: &str) -> Option<TrackedSubagent> {
        let subagent = self.subagents.remove(id)?;
        if let Some(ids) = self.by_session.get_mut(&subagent.parent_session_id) {
            ids.remove(id);
            if ids.is_empty() {
                self.by_session.remove(&subagent.parent_session_id);
            }
        }
        if let Some(agent_id) = &subagent.agent_id {
            if self.by_agent_id.get(agent_id).map(String::as_str) == Some(id) {
                self.by_agent_id.remove(agent_id);
            }
        }
        Some(subagent)
    }
}

/// How a terminal transition reacts to an unknown id.
#[derive(Clone, Copy, PartialEq, Eq)]
enum OnMissing {
    Log,
    Ignore,
}

/// Lifecycle tracker for subagent executions.
///
/// Designed to be cloned and shared: all fields are behind `Arc`.
///
/// # Example
///
/// ```ignore
/// let registry = SubagentRegistry::new();
/// registry.track_subagent("t1", "session-1", &input, Some("toolu_1".into()));
/// registry.start_subagent("t1");
/// registry.complete_subagent("t1", Some("done".into()), Some("agent-9".into()));
/// ```
#[derive(Clone)]
pub struct SubagentRegistry {
    state: Arc<Mutex<RegistryState>>,
    events: EventBus,
    finish_hooks: Arc<OneShotHooks<TrackedSubagent>>,
    sink: Arc<dyn NotificationSink>,
}

impl Default for SubagentRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SubagentRegistry {
    /// Create an empty registry that discards notifications.
    pub fn new() -> Self {
        Self::with_sink(Arc::new(NoopSink))
    }

    /// Create an empty registry that forwards notifications to `sink`.
    pub fn with_sink(sink: Arc<dyn NotificationSink>) -> Self {
        Self {
            state: Arc::new(Mutex::new(RegistryState::default())),
            events: EventBus::new(),
            finish_hooks: Arc::new(OneShotHooks::default()),
            sink,
        }
    }

    fn lock(&self) -> MutexGuard<'_, RegistryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start tracking a new subagent in `pending` state.
    ///
    /// When `input.resume` names an agent id known to the reverse index, the
    /// new entry's `original_task_id` points at the subagent that produced it.
    pub fn track_subagent(
        &self,
        id: impl Into<SubagentId>,
        session_id: impl Into<String>,
        input: &SubagentInput,
        parent_tool_use_id: Option<String>,
    ) -> TrackedSubagent {
        let mut subagent =
            TrackedSubagent::pending(id.into(), session_id.into(), input, parent_tool_use_id);

        {
            let mut state = self.lock();
            if let Some(resume) = &input.resume {
                subagent.original_task_id = state.by_agent_id.get(resume).cloned();
            }
            if state.remove(&subagent.id).is_some() {
                warn!(id = %subagent.id, "Re-tracking subagent; previous entry replaced");
            }
            state.index(&subagent);
            state
                .subagents
                .insert(subagent.id.clone(), subagent.clone());
        }

        debug!(
            id = %subagent.id,
            session = %subagent.parent_session_id,
            subagent_type = %subagent.subagent_type,
            resumed = subagent.is_resumed,
            "Tracking subagent"
        );
        self.publish(SubagentEventKind::Created, &subagent, None);
        subagent
    }

    /// Move a subagent to `running`. Unknown ids are logged and ignored.
    pub fn start_subagent(&self, id: &str) {
        let started = {
            let mut state = self.lock();
            state.subagents.get_mut(id).map(|subagent| {
                subagent.status = SubagentStatus::Running;
                subagent.started_at = Some(now_ms().max(subagent.created_at));
                subagent.clone()
            })
        };

        match started {
            Some(subagent) => {
                debug!(id, "Subagent started");
                self.publish(SubagentEventKind::Started, &subagent, None);
                self.notify(&subagent, SubagentEventKind::Started, None);
            }
            None => error!(id, "Cannot start unknown subagent"),
        }
    }

    /// Mark a subagent `completed`. A supplied `agent_id` becomes resumable.
    pub fn complete_subagent(&self, id: &str, result: Option<String>, agent_id: Option<String>) {
        self.finish(id, SubagentStatus::Completed, OnMissing::Log, None, |s| {
            s.result = result;
            if agent_id.is_some() {
                s.agent_id = agent_id;
            }
        });
    }

    /// Mark a subagent `failed` with an error message.
    pub fn fail_subagent(&self, id: &str, error: impl Into<String>) {
        let error = error.into();
        self.finish(id, SubagentStatus::Failed, OnMissing::Log, None, |s| {
            s.error = Some(error);
        });
    }

    /// Mark a subagent `cancelled`. Unknown ids are ignored silently since
    /// cancellation routinely races with cleanup.
    ///
    /// This only updates bookkeeping; stopping the underlying work is the
    /// responsibility of whoever owns it.
    pub fn cancel_subagent(&self, id: &str) {
        self.finish(id, SubagentStatus::Cancelled, OnMissing::Ignore, None, |_| {});
    }

    /// Apply an out-of-band completion signal for a background subagent.
    pub fn handle_task_notification(&self, notification: TaskNotification) {
        let status = SubagentStatus::from(notification.status);
        let TaskNotification {
            task_id,
            output_file,
            summary,
            result,
            error,
            agent_id,
            raw,
            ..
        } = notification;

        self.finish(&task_id, status, OnMissing::Log, raw, |s| {
            if output_file.is_some() {
                s.output_file = output_file;
            }
            if summary.is_some() {
                s.summary = summary;
            }
            if agent_id.is_some() {
                s.agent_id = agent_id;
            }
            match status {
                SubagentStatus::Completed => {
                    if result.is_some() {
                        s.result = result;
                    }
                }
                SubagentStatus::Failed => {
                    let fallback = s.summary.clone();
                    s.error = error.or(fallback);
                }
                _ => {}
            }
        });
    }

    /// Publish a progress event for a running subagent. Anything else is a
    /// silent no-op; status never changes here.
    pub fn update_progress(&self, id: &str, data: Option<serde_json::Value>) {
        let running = {
            let state = self.lock();
            state
                .subagents
                .get(id)
                .filter(|s| s.status == SubagentStatus::Running)
                .cloned()
        };
        if let Some(subagent) = running {
            self.publish(SubagentEventKind::Progress, &subagent, data);
        }
    }

    /// Register a hook to run once when `id` reaches a terminal status.
    pub fn on_finish(&self, id: impl Into<String>, hook: OneShotHook<TrackedSubagent>) {
        self.finish_hooks.register(id, hook);
    }

    fn finish(
        &self,
        id: &str,
        status: SubagentStatus,
        on_missing: OnMissing,
        raw: Option<serde_json::Value>,
        apply: impl FnOnce(&mut TrackedSubagent),
    ) {
        let finished = {
            let mut state = self.lock();
            let mut previous_agent_id = None;
            let finished = state.subagents.get_mut(id).map(|subagent| {
                previous_agent_id = subagent.agent_id.clone();
                subagent.status = status;
                subagent.completed_at = Some(now_ms().max(subagent.completion_floor()));
                apply(subagent);
                subagent.clone()
            });
            let current_agent_id = finished.as_ref().and_then(|s| s.agent_id.clone());
            if let Some(old) = previous_agent_id {
                if current_agent_id.as_ref() != Some(&old)
                    && state.by_agent_id.get(&old).map(String::as_str) == Some(id)
                {
                    state.by_agent_id.remove(&old);
                }
            }
            if let Some(agent_id) = current_agent_id {
                state.by_agent_id.insert(agent_id, id.to_string());
            }
            finished
        };

        let Some(subagent) = finished else {
            if on_missing == OnMissing::Log {
                error!(id, status = status.as_str(), "Cannot finish unknown subagent");
            }
            return;
        };

        let kind = match status {
            SubagentStatus::Completed => SubagentEventKind::Completed,
            SubagentStatus::Failed => SubagentEventKind::Failed,
            SubagentStatus::Cancelled => SubagentEventKind::Cancelled,
            _ => SubagentEventKind::Stopped,
        };
        debug!(id, status = status.as_str(), "Subagent finished");
        self.publish(kind, &subagent, None);
        self.notify(&subagent, kind, raw);
        self.finish_hooks.fire(id, &subagent);
    }

    fn publish(
        &self,
        kind: SubagentEventKind,
        subagent: &TrackedSubagent,
        progress: Option<serde_json::Value>,
    ) {
        self.events.emit(&SubagentEvent {
            kind,
            subagent: subagent.clone(),
            progress,
        });
    }

    fn notify(
        &self,
        subagent: &TrackedSubagent,
        kind: SubagentEventKind,
        raw: Option<serde_json::Value>,
    ) {
        let mut notification = SubagentNotification::from_subagent(subagent, kind.as_str());
        notification.task_notification = raw;
        self.sink.subagent(notification);
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn get_subagent(&self, id: &str) -> Option<TrackedSubagent> {
        self.lock().subagents.get(id).cloned()
    }

    pub fn is_subagent(&self, id: &str) -> bool {
        self.lock().subagents.contains_key(id)
    }

    pub fn get_session_subagents(&self, session_id: &str) -> Vec<TrackedSubagent> {
        let state = self.lock();
        state
            .by_session
            .get(session_id)
            .into_iter()
            .flatten()
            .filter_map(|id| state.subagents.get(id).cloned())
            .collect()
    }

    /// Running subagents across every session.
    pub fn get_running_subagents(&self) -> Vec<TrackedSubagent> {
        self.lock()
            .subagents
            .values()
            .filter(|s| s.status == SubagentStatus::Running)
            .cloned()
            .collect()
    }

    /// Running subagents of one session, most recently started first.
    pub fn get_running_subagents_for_session(&self, session_id: &str) -> Vec<TrackedSubagent> {
        let mut running: Vec<_> = self
            .get_session_subagents(session_id)
            .into_iter()
            .filter(|s| s.status == SubagentStatus::Running)
            .collect();
        running.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        running
    }

    /// The most recently started running subagent in a session, used to
    /// attribute nested activity to the subagent that spawned it.
    pub fn get_active_subagent(&self, session_id: &str) -> Option<TrackedSubagent> {
        self.get_running_subagents_for_session(session_id)
            .into_iter()
            .next()
    }

    pub fn find_by_agent_id(&self, agent_id: &str) -> Option<TrackedSubagent> {
        let state = self.lock();
        state
            .by_agent_id
            .get(agent_id)
            .and_then(|id| state.subagents.get(id))
            .cloned()
    }

    /// Entries that carry an agent id and finished in a resumable state.
    pub fn get_resumable_tasks(&self) -> Vec<TrackedSubagent> {
        self.lock()
            .subagents
            .values()
            .filter(|s| s.agent_id.is_some() && s.status.is_resumable())
            .cloned()
            .collect()
    }

    pub fn get_all_subagents(&self) -> Vec<TrackedSubagent> {
        self.lock().subagents.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lock().subagents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // ── Events ───────────────────────────────────────────────────────

    pub fn add_event_listener(&self, kind: SubagentEventKind, listener: Listener) -> ListenerId {
        self.events.add_listener(kind, listener)
    }

    pub fn remove_event_listener(&self, kind: SubagentEventKind, id: ListenerId) -> bool {
        self.events.remove_listener(kind, id)
    }

    /// Deliver an event to every listener registered for its kind.
    pub fn emit_event(&self, event: &SubagentEvent) {
        self.events.emit(event);
    }

    // ── Maintenance ──────────────────────────────────────────────────

    /// Remove terminal entries that finished more than `max_age` ago.
    ///
    /// Pending and running entries are never removed. Returns the number of
    /// entries removed.
    pub fn cleanup(&self, max_age: Duration) -> usize {
        let max_age_ms = i64::try_from(max_age.as_millis()).unwrap_or(i64::MAX);
        let now = now_ms();

        let removed: Vec<SubagentId> = {
            let mut state = self.lock();
            let expired: Vec<SubagentId> = state
                .subagents
                .values()
                .filter(|s| s.status.is_terminal())
                .filter(|s| now - s.completed_at.unwrap_or(s.created_at) > max_age_ms)
                .map(|s| s.id.clone())
                .collect();
            for id in &expired {
                state.remove(id);
            }
            expired
        };

        for id in &removed {
            self.finish_hooks.discard(id);
        }
        if !removed.is_empty() {
            info!(removed = removed.len(), "Cleaned up finished subagents");
        }
        removed.len()
    }

    /// Export every tracked entry, oldest first.
    pub fn export_state(&self) -> RegistrySnapshot {
        let mut tasks = self.get_all_subagents();
        tasks.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        RegistrySnapshot {
            version: SNAPSHOT_VERSION,
            tasks,
            last_updated: now_ms(),
        }
    }

    /// Replace the registry contents with `snapshot`.
    ///
    /// A snapshot with an unknown version is rejected and current state is
    /// left untouched. Returns the number of imported entries.
    pub fn import_state(&self, snapshot: RegistrySnapshot) -> Result<usize, RegistryError> {
        if snapshot.version != SNAPSHOT_VERSION {
            warn!(
                found = snapshot.version,
                expected = SNAPSHOT_VERSION,
                "Ignoring subagent snapshot with unknown version"
            );
            return Err(RegistryError::VersionMismatch {
                found: snapshot.version,
                expected: SNAPSHOT_VERSION,
            });
        }

        let count = snapshot.tasks.len();
        let mut fresh = RegistryState::default();
        for subagent in snapshot.tasks {
            fresh.index(&subagent);
            fresh.subagents.insert(subagent.id.clone(), subagent);
        }
        *self.lock() = fresh;

        debug!(count, "Imported subagent snapshot");
        Ok(count)
    }
}
