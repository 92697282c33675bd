//! Durable snapshots and cross-session queries over the subagent registry.

pub mod filter;
pub mod manager;
pub mod output;

pub use filter::TaskFilter;
pub use manager::{PersistenceManager, PersistenceOptions};
