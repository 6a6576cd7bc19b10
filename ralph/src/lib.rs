//! Unattended multi-turn agent loop ("Ralph loop").
//!
//! Each iteration rebuilds a bounded view of persistent task state, sends it to
//! a completion backend, parses a small tag protocol out of the reply, appends
//! a summary to the progress log and applies file writes to the workspace. The
//! loop ends on a completion sentinel or when the iteration budget runs out.
//!
//! - **[`core`]**: Pure, deterministic logic (protocol parsing, truncation,
//!   path rules, the loop state machine). No I/O.
//! - **[`io`]**: Side-effecting operations (artifact store, context assembly,
//!   HTTP backend, file writes, config).
//!
//! Orchestration modules ([`step`], [`looping`], [`start`]) coordinate core
//! logic with I/O to implement CLI commands.

pub mod core;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod looping;
pub mod start;
pub mod step;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
