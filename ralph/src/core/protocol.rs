//! Response protocol parser.
//!
//! The model answers in free text carrying a small tag grammar:
//!
//! - `<think>...</think>` reasoning blocks, discarded before anything else.
//! - `<summary>...</summary>`, the body persisted to the progress log.
//! - `<write_file path="...">...</write_file>`, zero or more file writes.
//! - `<<<ALL_TASKS_COMPLETE>>>`, the completion sentinel.
//!
//! Parsing is pure and never fails: malformed markup degrades to "not found"
//! and is reported through [`ProtocolDiagnostic`]s.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;

use crate::core::path::{fold_parent_segments, normalize_directive_path};
use crate::core::types::{ParsedResponse, ProtocolDiagnostic, WriteDirective};

/// Literal token that ends the loop when present anywhere in a completion.
pub const COMPLETION_SENTINEL: &str = "<<<ALL_TASKS_COMPLETE>>>";

/// Progress body used when the completion has no summary block.
pub const SUMMARY_FALLBACK: &str = "no summary provided";

static REASONING_BLOCK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<think>.*?</think>").expect("reasoning block regex"));
static REASONING_OPEN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)<think>").expect("reasoning open regex"));
static REASONING_CLOSE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)</think>").expect("reasoning close regex"));
static SUMMARY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<summary>(.*?)</summary>").expect("summary regex"));
static SUMMARY_CLOSE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)</summary>").expect("summary close regex"));
static WRITE_FILE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?is)<write_file\s+path\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s>]+))\s*>(.*?)</write_file\s*>"#,
    )
    .expect("write_file regex")
});
static WRITE_FILE_CLOSE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)</write_file\s*>").expect("write_file close regex"));

/// Parse one raw completion into a summary, directives and the sentinel flag.
pub fn parse_response(raw: &str) -> ParsedResponse {
    let mut diagnostics = Vec::new();

    // Checked on the raw text: a sentinel inside reasoning still counts.
    let complete = raw.contains(COMPLETION_SENTINEL);

    let visible = strip_reasoning(raw, &mut diagnostics);
    let summary = extract_summary(&visible, &mut diagnostics);
    let directives = extract_directives(&visible, &mut diagnostics);

    ParsedResponse {
        summary,
        directives,
        complete,
        diagnostics,
    }
}

/// Remove reasoning blocks, including an unclosed trailing one.
///
/// Matched pairs are deleted across line boundaries. An opener with no closer
/// deletes everything from the opener to the end of the text.
pub fn strip_reasoning(raw: &str, diagnostics: &mut Vec<ProtocolDiagnostic>) -> String {
    let without_pairs = REASONING_BLOCK_RE.replace_all(raw, "");
    let visible = match REASONING_OPEN_RE.find(&without_pairs) {
        Some(open) => {
            diagnostics.push(ProtocolDiagnostic::UnclosedReasoning);
            without_pairs[..open.start()].to_string()
        }
        None => without_pairs.into_owned(),
    };
    if REASONING_CLOSE_RE.is_match(&visible) {
        diagnostics.push(ProtocolDiagnostic::StrayCloseTag {
            tag: "think".to_string(),
        });
    }
    visible
}

/// First summary block, trimmed; falls back to [`SUMMARY_FALLBACK`].
pub fn extract_summary(visible: &str, diagnostics: &mut Vec<ProtocolDiagnostic>) -> String {
    let found = SUMMARY_RE
        .captures(visible)
        .and_then(|caps| caps.get(1))
        .map(|inner| inner.as_str().trim())
        .filter(|inner| !inner.is_empty());

    match found {
        Some(summary) => summary.to_string(),
        None => {
            if !SUMMARY_RE.is_match(visible) && SUMMARY_CLOSE_RE.is_match(visible) {
                diagnostics.push(ProtocolDiagnostic::StrayCloseTag {
                    tag: "summary".to_string(),
                });
            }
            diagnostics.push(ProtocolDiagnostic::MissingSummary);
            SUMMARY_FALLBACK.to_string()
        }
    }
}

/// Collect write directives in document order, first occurrence per path wins.
pub fn extract_directives(
    visible: &str,
    diagnostics: &mut Vec<ProtocolDiagnostic>,
) -> Vec<WriteDirective> {
    let mut seen = HashSet::new();
    let mut directives = Vec::new();

    for caps in WRITE_FILE_RE.captures_iter(visible) {
        let raw_path = caps
            .get(1)
            .or_else(|| caps.get(2))
            .or_else(|| caps.get(3))
            .map(|m| m.as_str())
            .unwrap_or_default();
        let content = caps.get(4).map(|m| m.as_str()).unwrap_or_default();

        let path = normalize_directive_path(raw_path);
        if path.is_empty() {
            diagnostics.push(ProtocolDiagnostic::EmptyDirectivePath);
            continue;
        }
        // `a.txt` and `src/../a.txt` name the same file.
        if !seen.insert(fold_parent_segments(&path)) {
            diagnostics.push(ProtocolDiagnostic::DuplicateDirective { path });
            continue;
        }
        directives.push(WriteDirective {
            path,
            content: content.to_string(),
        });
    }

    let remainder = WRITE_FILE_RE.replace_all(visible, "");
    if WRITE_FILE_CLOSE_RE.is_match(&remainder) {
        diagnostics.push(ProtocolDiagnostic::StrayCloseTag {
            tag: "write_file".to_string(),
        });
    }
    if directives.is_empty() {
        diagnostics.push(ProtocolDiagnostic::NoDirectives);
    }
    directives
}
