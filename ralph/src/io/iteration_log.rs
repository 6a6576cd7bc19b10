//! Per-iteration run log under `<log_dir>/<index>/`.
//!
//! Separate from the progress log: this keeps the raw completion and what the
//! loop did with it, for humans debugging a run. The model never sees it.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;

use crate::core::types::ProtocolDiagnostic;
use crate::io::materialize::WriteOutcome;

#[derive(Debug, Clone, Serialize)]
pub struct IterationMeta {
    /// Progress record index written this iteration.
    pub index: Option<u32>,
    /// Iteration number within this run (1-indexed).
    pub iteration: u32,
    pub summary: String,
    pub complete: bool,
    pub writes: Vec<WriteOutcome>,
    pub diagnostics: Vec<ProtocolDiagnostic>,
    pub duration_ms: u64,
}

#[derive(Debug, Clone)]
pub struct IterationPaths {
    pub dir: PathBuf,
    pub meta_path: PathBuf,
    pub response_path: PathBuf,
}

impl IterationPaths {
    pub fn new(log_dir: &Path, index: u32) -> Self {
        let dir = log_dir.join(index.to_string());
        Self {
            meta_path: dir.join("meta.json"),
            response_path: dir.join("response.md"),
            dir,
        }
    }
}

/// Write the raw response and metadata for one iteration.
pub fn write_iteration(
    log_dir: &Path,
    index: u32,
    response: &str,
    meta: &IterationMeta,
) -> Result<IterationPaths> {
    let paths = IterationPaths::new(log_dir, index);
    fs::create_dir_all(&paths.dir)
        .with_context(|| format!("create iteration dir {}", paths.dir.display()))?;

    write_text(&paths.response_path, response)?;
    write_json(&paths.meta_path, meta)?;
    Ok(paths)
}

fn write_text(path: &Path, contents: &str) -> Result<()> {
    fs::write(path, contents).with_context(|| format!("write {}", path.display()))
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let mut buf = serde_json::to_string_pretty(value)?;
    buf.push('\n');
    write_text(path, &buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn iteration_paths_are_stable() {
        let temp = tempfile::tempdir().expect("tempdir");
        let paths = IterationPaths::new(&temp.path().join(".ralph/iterations"), 3);

        assert!(paths.dir.ends_with(Path::new(".ralph/iterations/3")));
        assert!(paths.meta_path.ends_with("meta.json"));
        assert!(paths.response_path.ends_with("response.md"));
    }

    #[test]
    fn writes_response_and_meta() {
        let temp = tempfile::tempdir().expect("tempdir");
        let meta = IterationMeta {
            index: Some(2),
            iteration: 1,
            summary: "wrote main.rs".to_string(),
            complete: false,
            writes: vec![
                WriteOutcome::Written {
                    path: temp.path().join("main.rs"),
                    bytes: 12,
                },
                WriteOutcome::Failed {
                    path: "../x".to_string(),
                    error: "path '../x' escapes the project root".to_string(),
                },
            ],
            diagnostics: vec![ProtocolDiagnostic::DuplicateDirective {
                path: "main.rs".to_string(),
            }],
            duration_ms: 42,
        };

        let paths = write_iteration(temp.path(), 2, "raw <summary>x</summary>", &meta)
            .expect("write logs");

        assert_eq!(
            fs::read_to_string(&paths.response_path).expect("response"),
            "raw <summary>x</summary>"
        );
        let json: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&paths.meta_path).expect("meta"))
                .expect("parse meta");
        assert_eq!(json["index"], 2);
        assert_eq!(json["writes"][0]["result"], "written");
        assert_eq!(json["writes"][1]["result"], "failed");
        assert_eq!(json["diagnostics"][0]["kind"], "duplicate_directive");
    }
}
