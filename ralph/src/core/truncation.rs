//! Trailing-window truncation for the progress log.
//!
//! Only affects what is read into context; the log on disk is never rewritten.

/// Prepended when older progress was elided.
pub const TRUNCATION_MARKER: &str = "[... earlier progress truncated ...]\n";

/// Keep the trailing `budget` characters of `log`, prefixed by [`TRUNCATION_MARKER`].
///
/// Logs within budget are returned unchanged. Counts `char`s, so multi-byte
/// text is never split. Re-applying with the same budget yields the same text.
pub fn truncate_progress(log: &str, budget: usize) -> String {
    let total = log.chars().count();
    if total <= budget {
        return log.to_string();
    }
    let skip = total - budget;
    let start = log
        .char_indices()
        .nth(skip)
        .map(|(idx, _)| idx)
        .unwrap_or(log.len());
    format!("{TRUNCATION_MARKER}{}", &log[start..])
}
