//! File-backed work items with dependency edges.

pub mod active_form;
pub mod store;
pub mod types;
pub mod watch;

pub use active_form::derive_active_form;
pub use store::{WorkItemStore, sanitize_list_id};
pub use types::{NewWorkItem, WorkItem, WorkItemPatch, WorkItemStats, WorkItemStatus};
