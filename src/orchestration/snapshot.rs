use serde::{Deserialize, Serialize};

use super::types::{EpochMs, TrackedSubagent};

/// Snapshot format understood by this build.
pub const SNAPSHOT_VERSION: u32 = 1;

/// Full export of a [`super::registry::SubagentRegistry`].
///
/// This is also the on-disk shape of the persistence state file.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrySnapshot {
    pub version: u32,
    pub tasks: Vec<TrackedSubagent>,
    pub last_updated: EpochMs,
}
