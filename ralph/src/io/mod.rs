//! I/O helpers for the loop: filesystem, HTTP and configuration.

pub mod completion;
pub mod config;
pub mod context;
pub mod iteration_log;
pub mod materialize;
pub mod prompt;
pub mod task_store;
