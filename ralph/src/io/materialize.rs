//! Applies write directives to the project workspace.
//!
//! Every directive is an independent unit of work: a failure is recorded in
//! its [`WriteOutcome`] and the remaining directives are still applied.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::{info, warn};

use crate::core::path::{fold_path_components, resolve_directive_path};
use crate::core::types::{ArtifactKind, WriteDirective, WritePolicy};

/// Result of applying one directive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum WriteOutcome {
    Written { path: PathBuf, bytes: usize },
    Failed { path: String, error: String },
}

impl WriteOutcome {
    pub fn is_written(&self) -> bool {
        matches!(self, WriteOutcome::Written { .. })
    }
}

/// Writes directive content under a project root according to a [`WritePolicy`].
#[derive(Debug, Clone)]
pub struct Materializer {
    root: PathBuf,
    policy: WritePolicy,
}

impl Materializer {
    pub fn new(root: impl Into<PathBuf>, policy: WritePolicy) -> Self {
        Self {
            root: root.into(),
            policy,
        }
    }

    /// Apply one directive; never returns an error.
    pub fn apply(&self, directive: &WriteDirective) -> WriteOutcome {
        match self.try_apply(directive) {
            Ok((path, bytes)) => {
                info!(path = %path.display(), bytes, "wrote file");
                WriteOutcome::Written { path, bytes }
            }
            Err(err) => {
                let error = format!("{err:#}");
                warn!(path = %directive.path, error = %error, "write directive failed");
                WriteOutcome::Failed {
                    path: directive.path.clone(),
                    error,
                }
            }
        }
    }

    /// Apply directives in order.
    pub fn apply_all(&self, directives: &[WriteDirective]) -> Vec<WriteOutcome> {
        directives.iter().map(|d| self.apply(d)).collect()
    }

    fn try_apply(&self, directive: &WriteDirective) -> Result<(PathBuf, usize)> {
        let path = resolve_directive_path(&self.root, &directive.path, self.policy)
            .map_err(anyhow::Error::msg)?;
        self.ensure_writable_artifact(&path)?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("create directory {}", parent.display()))?;
        }
        let contents = render_file_contents(&directive.content);
        fs::write(&path, &contents).with_context(|| format!("write {}", path.display()))?;
        Ok((path, contents.len()))
    }

    /// The idea and the progress log are never writable through directives.
    ///
    /// Both sides are made absolute and folded first, so `../project/idea.txt`
    /// or an absolute path into a relative root is still recognized.
    fn ensure_writable_artifact(&self, path: &Path) -> Result<()> {
        let root = comparable_path(&self.root)?;
        let target = comparable_path(path)?;
        let Ok(rel) = target.strip_prefix(&root) else {
            return Ok(());
        };
        let rel = rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join("/");
        match ArtifactKind::from_relative_path(&rel) {
            Some(ArtifactKind::Idea) => Err(anyhow::anyhow!(
                "{} is immutable",
                ArtifactKind::Idea.file_name()
            )),
            Some(ArtifactKind::Progress) => Err(anyhow::anyhow!(
                "{} is append-only and managed by the loop",
                ArtifactKind::Progress.file_name()
            )),
            Some(ArtifactKind::Specification) | None => Ok(()),
        }
    }
}

fn comparable_path(path: &Path) -> Result<PathBuf> {
    let absolute =
        std::path::absolute(path).with_context(|| format!("resolve {}", path.display()))?;
    Ok(fold_path_components(&absolute))
}

/// File body for a directive: one leading line break dropped, trailing
/// whitespace trimmed, exactly one trailing newline.
pub fn render_file_contents(content: &str) -> String {
    let body = content
        .strip_prefix("\r\n")
        .or_else(|| content.strip_prefix('\n'))
        .unwrap_or(content);
    let mut out = body.trim_end().to_string();
    out.push('\n');
    out
}
