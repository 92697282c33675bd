//! Work-item records as stored one-per-file on disk.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkItemStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
}

/// A durable, dependency-linked unit of tracked work.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkItem {
    /// Decimal string of a positive integer, unique within its list.
    pub id: String,
    pub subject: String,
    pub description: String,
    /// Present-participle label shown while the item is in progress.
    pub active_form: String,
    pub status: WorkItemStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    /// Ids of items that cannot start until this one completes.
    #[serde(default)]
    pub blocks: Vec<String>,
    /// Ids of items this one waits on.
    #[serde(default)]
    pub blocked_by: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Map<String, Value>>,
}

impl WorkItem {
    pub fn numeric_id(&self) -> u64 {
        self.id.parse().unwrap_or(0)
    }

    pub fn is_blocked(&self) -> bool {
        self.status != WorkItemStatus::Completed && !self.blocked_by.is_empty()
    }
}

/// Input for creating a work item.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewWorkItem {
    pub subject: String,
    #[serde(default)]
    pub description: String,
    /// Derived from `subject` when absent.
    #[serde(default)]
    pub active_form: Option<String>,
    #[serde(default)]
    pub owner: Option<String>,
    #[serde(default)]
    pub metadata: Option<Map<String, Value>>,
}

/// Partial update for a work item. Unset fields are left alone.
///
/// Metadata is shallow-merged; a key mapped to `null` is removed.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkItemPatch {
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub active_form: Option<String>,
    #[serde(default)]
    pub status: Option<WorkItemStatus>,
    #[serde(default)]
    pub owner: Option<String>,
    #[serde(default)]
    pub add_blocks: Vec<String>,
    #[serde(default)]
    pub add_blocked_by: Vec<String>,
    #[serde(default)]
    pub metadata: Option<Map<String, Value>>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkItemStats {
    pub total: usize,
    pub pending: usize,
    pub in_progress: usize,
    pub completed: usize,
    /// Not completed and waiting on at least one other item.
    pub blocked: usize,
}

impl WorkItemStats {
    pub fn tally<'a>(items: impl IntoIterator<Item = &'a WorkItem>) -> Self {
        let mut stats = Self::default();
        for item in items {
            stats.total += 1;
            match item.status {
                WorkItemStatus::Pending => stats.pending += 1,
                WorkItemStatus::InProgress => stats.in_progress += 1,
                WorkItemStatus::Completed => stats.completed += 1,
            }
            if item.is_blocked() {
                stats.blocked += 1;
            }
        }
        stats
    }
}
