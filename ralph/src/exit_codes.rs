//! Stable exit codes for the `ralph` CLI.

/// Command succeeded, or the loop ended on the completion sentinel.
pub const OK: i32 = 0;
/// Fatal error: bad config, unreadable workspace, or a failed backend call.
pub const FATAL: i32 = 1;
/// `ralph run` used its whole iteration budget without the sentinel.
pub const BUDGET_EXHAUSTED: i32 = 2;
