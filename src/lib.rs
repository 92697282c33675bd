pub mod config;
pub mod error;
pub mod notification;
pub mod orchestration;
pub mod persistence;
pub mod tasks;
