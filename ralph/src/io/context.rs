//! Context assembly: the single user turn built fresh each iteration.

use std::path::Path;

use anyhow::Result;
use tracing::{debug, warn};
use walkdir::{DirEntry, WalkDir};

use crate::core::truncation::truncate_progress;
use crate::core::types::ArtifactKind;
use crate::io::prompt::{UserTurnInputs, render_user_turn};
use crate::io::task_store::TaskStore;

/// Limits applied while assembling context.
#[derive(Debug, Clone, Copy)]
pub struct ContextLimits {
    /// Trailing characters of the progress log to keep.
    pub progress_budget_chars: usize,
    pub max_listed_files: usize,
}

/// Rendered user turn plus what was cut to fit.
#[derive(Debug, Clone)]
pub struct AssembledContext {
    pub user_turn: String,
    pub progress_truncated: bool,
    pub listed_files: usize,
    pub hidden_files: usize,
}

/// Read the artifacts and render the user turn.
///
/// The idea and specification are included verbatim; the progress log keeps
/// only its trailing window; the listing omits the managed artifacts.
pub fn assemble_context(store: &TaskStore, limits: &ContextLimits) -> Result<AssembledContext> {
    let idea = store.read_artifact(ArtifactKind::Idea)?;
    let spec = store.read_artifact(ArtifactKind::Specification)?;
    let progress = store.read_artifact(ArtifactKind::Progress)?;

    let windowed = truncate_progress(&progress, limits.progress_budget_chars);
    let progress_truncated = windowed != progress;

    let mut files = list_other_files(store.root());
    let hidden_files = files.len().saturating_sub(limits.max_listed_files);
    files.truncate(limits.max_listed_files);

    let user_turn = render_user_turn(&UserTurnInputs {
        idea: &idea,
        spec: &spec,
        progress: &windowed,
        files: &files,
        hidden_files,
    })?;

    debug!(
        chars = user_turn.chars().count(),
        progress_truncated,
        listed_files = files.len(),
        hidden_files,
        "context assembled"
    );
    Ok(AssembledContext {
        user_turn,
        progress_truncated,
        listed_files: files.len(),
        hidden_files,
    })
}

/// Sorted `/`-separated paths of workspace files other than the managed artifacts.
///
/// Hidden entries (leading `.`) are skipped along with everything below them.
/// Unreadable entries are skipped with a warning.
pub fn list_other_files(root: &Path) -> Vec<String> {
    if !root.is_dir() {
        return Vec::new();
    }
    let mut files: Vec<String> = WalkDir::new(root)
        .min_depth(1)
        .into_iter()
        .filter_entry(|entry| !is_hidden(entry))
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(err) => {
                warn!(err = %err, "skipping unreadable workspace entry");
                None
            }
        })
        .filter(|entry| !entry.file_type().is_dir())
        .filter_map(|entry| relative_display(root, entry.path()))
        .filter(|rel| ArtifactKind::from_relative_path(rel).is_none())
        .collect();
    files.sort();
    files
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry.depth() > 0
        && entry
            .file_name()
            .to_str()
            .is_some_and(|name| name.starts_with('.'))
}

fn relative_display(root: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(root).ok()?;
    let parts: Vec<String> = rel
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    Some(parts.join("/"))
}
