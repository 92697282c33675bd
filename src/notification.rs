//! Outbound notifications for an external UI/protocol collaborator.
//!
//! The wire encoding belongs to whoever implements [`NotificationSink`]; this
//! crate only builds the payloads. Components that are constructed without a
//! sink use [`NoopSink`].

use serde::Serialize;

use crate::orchestration::types::{SubagentStatus, TrackedSubagent};
use crate::tasks::types::WorkItem;

/// Lifecycle notification for a tracked subagent.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubagentNotification {
    pub id: String,
    pub event_type: String,
    pub subagent_type: String,
    pub description: String,
    pub status: SubagentStatus,
    pub parent_session_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_tool_use_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_file: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    /// Raw payload of an out-of-band task completion, when that is what
    /// triggered the notification.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_notification: Option<serde_json::Value>,
}

impl SubagentNotification {
    pub fn from_subagent(subagent: &TrackedSubagent, event_type: &str) -> Self {
        let duration_ms = match (subagent.started_at, subagent.completed_at) {
            (Some(start), Some(end)) => Some(end - start),
            _ => None,
        };
        Self {
            id: subagent.id.clone(),
            event_type: event_type.to_string(),
            subagent_type: subagent.subagent_type.clone(),
            description: subagent.description.clone(),
            status: subagent.status,
            parent_session_id: subagent.parent_session_id.clone(),
            parent_tool_use_id: subagent.parent_tool_use_id.clone(),
            model: subagent.model.clone(),
            agent_id: subagent.agent_id.clone(),
            duration_ms,
            output_file: subagent.output_file.clone(),
            summary: subagent.summary.clone(),
            task_notification: None,
        }
    }
}

/// Acknowledgement of a work-item create/update/delete.
#[derive(Clone, Debug, Serialize)]
pub struct WorkItemAck {
    /// Free-text confirmation, e.g. `Task #3 created successfully: Run tests`.
    pub message: String,
    pub item: WorkItem,
}

/// Receiver for outbound notifications.
pub trait NotificationSink: Send + Sync {
    fn subagent(&self, notification: SubagentNotification);

    fn work_item(&self, ack: WorkItemAck);
}

/// Sink used when no real receiver is attached.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopSink;

impl NotificationSink for NoopSink {
    fn subagent(&self, _notification: SubagentNotification) {}

    fn work_item(&self, _ack: WorkItemAck) {}
}
