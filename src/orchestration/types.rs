//! Type definitions for subagent tracking.
//!
//! These types form the shared vocabulary between the
//! [`super::registry::SubagentRegistry`], the persistence layer and the
//! notification payloads. Field names serialize in camelCase because the same
//! records are written verbatim into the persistence snapshot.

use serde::{Deserialize, Serialize};

/// Opaque identifier for a tracked subagent.
pub type SubagentId = String;

/// Milliseconds since the Unix epoch.
pub type EpochMs = i64;

pub(crate) fn now_ms() -> EpochMs {
    chrono::Utc::now().timestamp_millis()
}

/// Lifecycle status of a tracked subagent.
///
/// `Pending` and `Running` are live; the other four are terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubagentStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
    Stopped,
}

impl SubagentStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending | Self::Running)
    }

    /// Terminal states from which the subagent can be resumed via its agent id.
    pub fn is_resumable(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Stopped)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
            Self::Stopped => "stopped",
        }
    }
}

/// Spawn parameters supplied by the orchestrating agent.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubagentInput {
    pub subagent_type: String,
    pub description: String,
    pub prompt: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub run_in_background: bool,
    #[serde(default)]
    pub max_turns: Option<u32>,
    /// Agent id of an earlier run to resume.
    #[serde(default)]
    pub resume: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub team_name: Option<String>,
    #[serde(default)]
    pub mode: Option<String>,
}

/// A subagent execution tracked from creation to a terminal outcome.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackedSubagent {
    pub id: SubagentId,
    pub parent_session_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_tool_use_id: Option<String>,
    pub subagent_type: String,
    pub description: String,
    pub prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    pub status: SubagentStatus,
    pub created_at: EpochMs,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<EpochMs>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<EpochMs>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub run_in_background: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_turns: Option<u32>,
    /// External resume handle reported on completion.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub team_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub permission_mode: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_resumed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_task_id: Option<SubagentId>,
}

impl TrackedSubagent {
    /// Build a fresh `Pending` entry from spawn input.
    pub fn pending(
        id: SubagentId,
        parent_session_id: String,
        input: &SubagentInput,
        parent_tool_use_id: Option<String>,
    ) -> Self {
        Self {
            id,
            parent_session_id,
            parent_tool_use_id,
            subagent_type: input.subagent_type.clone(),
            description: input.description.clone(),
            prompt: input.prompt.clone(),
            model: input.model.clone(),
            status: SubagentStatus::Pending,
            created_at: now_ms(),
            started_at: None,
            completed_at: None,
            result: None,
            error: None,
            run_in_background: input.run_in_background,
            max_turns: input.max_turns,
            agent_id: None,
            output_file: None,
            summary: None,
            agent_name: input.name.clone(),
            team_name: input.team_name.clone(),
            permission_mode: input.mode.clone(),
            is_resumed: input.resume.is_some(),
            original_task_id: None,
        }
    }

    /// Earliest timestamp a completion may carry without breaking ordering.
    pub(crate) fn completion_floor(&self) -> EpochMs {
        self.started_at.unwrap_or(self.created_at)
    }
}

/// Outcome reported by an out-of-band task notification.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskNotificationStatus {
    Completed,
    Failed,
    Stopped,
}

impl From<TaskNotificationStatus> for SubagentStatus {
    fn from(status: TaskNotificationStatus) -> Self {
        match status {
            TaskNotificationStatus::Completed => SubagentStatus::Completed,
            TaskNotificationStatus::Failed => SubagentStatus::Failed,
            TaskNotificationStatus::Stopped => SubagentStatus::Stopped,
        }
    }
}

/// Completion signal from the resource that ran a background subagent.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskNotification {
    pub task_id: SubagentId,
    pub status: TaskNotificationStatus,
    #[serde(default)]
    pub output_file: Option<String>,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub result: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub agent_id: Option<String>,
    /// The raw message as received, forwarded in notifications untouched.
    #[serde(default)]
    pub raw: Option<serde_json::Value>,
}
