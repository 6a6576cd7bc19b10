//! Diagnostic tracing for the loop.
//!
//! # Separation of Concerns
//!
//! - **Tracing (this module)**: diagnostics via `RUST_LOG`, output to stderr.
//!   Not persisted, not part of the loop's product output.
//!
//! - **Progress and run logs (`io/task_store`, `io/iteration_log`)**: product
//!   artifacts on disk. Always written, unaffected by `RUST_LOG`.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize the tracing subscriber.
///
/// Reads `RUST_LOG`. Defaults to `ralph=info` if unset, so iteration progress
/// is visible for unattended runs.
///
/// # Example
/// ```bash
/// RUST_LOG=ralph=debug ralph run
/// ```
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("ralph=info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .init();
}
