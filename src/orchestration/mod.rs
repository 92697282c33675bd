//! Subagent lifecycle tracking.
//!
//! Provides the [`registry::SubagentRegistry`] for tracking spawned subagents,
//! its typed [`events`] bus, one-shot [`hooks`], the exportable [`snapshot`]
//! format and the shared [`types`].

pub mod events;
pub mod hooks;
pub mod registry;
pub mod snapshot;
pub mod types;

pub use events::{ListenerId, SubagentEvent, SubagentEventKind, listener};
pub use registry::SubagentRegistry;
pub use snapshot::{RegistrySnapshot, SNAPSHOT_VERSION};
pub use types::{
    SubagentInput, SubagentStatus, TaskNotification, TaskNotificationStatus, TrackedSubagent,
};
