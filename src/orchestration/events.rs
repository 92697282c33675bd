//! Typed fan-out event bus for subagent lifecycle events.
//!
//! Listeners are registered per [`SubagentEventKind`] and invoked in
//! registration order. A listener that returns `Err` or panics is logged and
//! skipped; delivery continues with the next listener and nothing propagates
//! to the code that emitted the event.

use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;

use super::types::TrackedSubagent;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum SubagentEventKind {
    #[serde(rename = "subagent_created")]
    Created,
    #[serde(rename = "subagent_started")]
    Started,
    #[serde(rename = "subagent_progress")]
    Progress,
    #[serde(rename = "subagent_completed")]
    Completed,
    #[serde(rename = "subagent_failed")]
    Failed,
    #[serde(rename = "subagent_cancelled")]
    Cancelled,
    #[serde(rename = "subagent_stopped")]
    Stopped,
}

impl SubagentEventKind {
    pub const ALL: [SubagentEventKind; 7] = [
        Self::Created,
        Self::Started,
        Self::Progress,
        Self::Completed,
        Self::Failed,
        Self::Cancelled,
        Self::Stopped,
    ];

    /// Kinds that correspond to a state change.
    pub const LIFECYCLE: [SubagentEventKind; 6] = [
        Self::Created,
        Self::Started,
        Self::Completed,
        Self::Failed,
        Self::Cancelled,
        Self::Stopped,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Created => "subagent_created",
            Self::Started => "subagent_started",
            Self::Progress => "subagent_progress",
            Self::Completed => "subagent_completed",
            Self::Failed => "subagent_failed",
            Self::Cancelled => "subagent_cancelled",
            Self::Stopped => "subagent_stopped",
        }
    }
}

/// A single event as delivered to listeners.
#[derive(Clone, Debug)]
pub struct SubagentEvent {
    pub kind: SubagentEventKind,
    /// Snapshot of the entry right after the change.
    pub subagent: TrackedSubagent,
    /// Caller-supplied data for progress events.
    pub progress: Option<serde_json::Value>,
}

pub type Listener = Arc<dyn Fn(&SubagentEvent) -> anyhow::Result<()> + Send + Sync>;

/// Wrap a closure as a [`Listener`].
pub fn listener<F>(f: F) -> Listener
where
    F: Fn(&SubagentEvent) -> anyhow::Result<()> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Handle returned by [`EventBus::add_listener`], used for removal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

#[derive(Default)]
struct Listeners {
    next_id: u64,
    by_kind: HashMap<SubagentEventKind, Vec<(ListenerId, Listener)>>,
}

#[derive(Clone, Default)]
pub struct EventBus {
    listeners: Arc<Mutex<Listeners>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Listeners> {
        self.listeners.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn add_listener(&self, kind: SubagentEventKind, listener: Listener) -> ListenerId {
        let mut listeners = self.lock();
        let id = ListenerId(listeners.next_id);
        listeners.next_id += 1;
        listeners.by_kind.entry(kind).or_default().push((id, listener));
        id
    }

    /// Returns `true` if a listener with that id was registered for `kind`.
    pub fn remove_listener(&self, kind: SubagentEventKind, id: ListenerId) -> bool {
        let mut listeners = self.lock();
        let Some(list) = listeners.by_kind.get_mut(&kind) else {
            return false;
        };
        let before = list.len();
        list.retain(|(lid, _)| *lid != id);
        before != list.len()
    }

    pub fn listener_count(&self, kind: SubagentEventKind) -> usize {
        self.lock().by_kind.get(&kind).map_or(0, Vec::len)
    }

    /// Deliver `event` to every listener registered for its kind.
    ///
    /// The listener list is cloned before delivery so listeners may add or
    /// remove listeners without deadlocking.
    pub fn emit(&self, event: &SubagentEvent) {
        let targets: Vec<(ListenerId, Listener)> = self
            .lock()
            .by_kind
            .get(&event.kind)
            .cloned()
            .unwrap_or_default();

        for (id, listener) in targets {
            match catch_unwind(AssertUnwindSafe(|| listener(event))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::error!(
                    event = event.kind.as_str(),
                    listener = id.0,
                    subagent = %event.subagent.id,
                    "Event listener failed: {:#}",
                    e
                ),
                Err(_) => tracing::error!(
                    event = event.kind.as_str(),
                    listener = id.0,
                    subagent = %event.subagent.id,
                    "Event listener panicked"
                ),
            }
        }
    }
}
