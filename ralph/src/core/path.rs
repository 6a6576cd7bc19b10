//! Lexical path helpers for write directives.
//!
//! Nothing here touches the filesystem: normalization and confinement are
//! decided on the path text alone so the rules stay deterministic.

use std::path::{Component, Path, PathBuf};

use crate::core::types::WritePolicy;

/// Normalize a directive path for comparison and resolution.
///
/// Trims whitespace and stray quote characters, unifies separators to `/`,
/// and drops empty and `.` segments. `..` segments are kept verbatim.
pub fn normalize_directive_path(raw: &str) -> String {
    let trimmed = raw
        .trim()
        .trim_matches(|c| c == '"' || c == '\'')
        .trim();
    let unified = trimmed.replace('\\', "/");
    let absolute = unified.starts_with('/');
    let joined = unified
        .split('/')
        .filter(|segment| !segment.is_empty() && *segment != ".")
        .collect::<Vec<_>>()
        .join("/");
    if absolute {
        format!("/{joined}")
    } else {
        joined
    }
}

/// Collapse `..` segments lexically (`src/../a.txt` becomes `a.txt`).
///
/// Leading `..` segments that would climb above the start are kept.
pub fn fold_parent_segments(normalized: &str) -> String {
    let absolute = normalized.starts_with('/');
    let mut folded: Vec<&str> = Vec::new();
    for segment in normalized.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                if folded.last().is_some_and(|last| *last != "..") {
                    folded.pop();
                } else if !absolute {
                    folded.push("..");
                }
            }
            other => folded.push(other),
        }
    }
    let joined = folded.join("/");
    if absolute {
        format!("/{joined}")
    } else {
        joined
    }
}

/// Collapse `.` and `..` components of a filesystem path lexically.
///
/// `..` directly under the root is dropped; leading `..` on a relative path
/// is kept.
pub fn fold_path_components(path: &Path) -> PathBuf {
    let mut folded = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if matches!(folded.components().next_back(), Some(Component::Normal(_))) {
                    folded.pop();
                } else if !folded.has_root() {
                    folded.push("..");
                }
            }
            other => folded.push(other.as_os_str()),
        }
    }
    folded
}

/// Resolve a normalized directive path against the project root.
///
/// Returns a stable error message when the policy rejects the path.
pub fn resolve_directive_path(
    root: &Path,
    normalized: &str,
    policy: WritePolicy,
) -> Result<PathBuf, String> {
    if normalized.is_empty() || normalized == "/" {
        return Err("directive path is empty".to_string());
    }
    let candidate = Path::new(normalized);
    let absolute = candidate.is_absolute() || normalized.starts_with('/');

    match policy {
        WritePolicy::Unrestricted => {
            if absolute {
                Ok(candidate.to_path_buf())
            } else {
                Ok(root.join(candidate))
            }
        }
        WritePolicy::Workspace => {
            if absolute {
                return Err(format!(
                    "absolute path '{normalized}' is not allowed by the workspace write policy"
                ));
            }
            let mut depth = 0usize;
            for segment in normalized.split('/') {
                if segment == ".." {
                    depth = depth.checked_sub(1).ok_or_else(|| {
                        format!("path '{normalized}' escapes the project root")
                    })?;
                } else {
                    depth += 1;
                }
            }
            if depth == 0 {
                return Err(format!("path '{normalized}' names the project root itself"));
            }
            Ok(root.join(candidate))
        }
    }
}
