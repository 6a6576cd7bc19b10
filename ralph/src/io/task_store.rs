//! File-backed task state: the idea, the specification and the progress log.
//!
//! The store exclusively owns the three managed artifacts under the project
//! root. The idea is written once, the specification is only ever changed by
//! write directives, and the progress log only grows.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use anyhow::{Context, Result, anyhow};
use regex::Regex;
use tracing::{debug, info};

use crate::core::types::ArtifactKind;

/// Returned by [`TaskStore::read_artifact`] when the backing file is missing.
pub const ABSENT_ARTIFACT: &str = "(file does not exist)";

/// First line(s) of a freshly initialized progress log.
pub const PROGRESS_HEADER: &str = "Ralph Loop started\n\n";

static RECORD_HEADER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^--- Iteration (\d+) ---$").expect("record header regex")
});

/// Canonical artifact paths for a project root.
#[derive(Debug, Clone)]
pub struct TaskPaths {
    pub root: PathBuf,
    pub idea_path: PathBuf,
    pub spec_path: PathBuf,
    pub progress_path: PathBuf,
}

impl TaskPaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            idea_path: root.join(ArtifactKind::Idea.file_name()),
            spec_path: root.join(ArtifactKind::Specification.file_name()),
            progress_path: root.join(ArtifactKind::Progress.file_name()),
            root,
        }
    }

    pub fn artifact(&self, kind: ArtifactKind) -> &Path {
        match kind {
            ArtifactKind::Idea => &self.idea_path,
            ArtifactKind::Specification => &self.spec_path,
            ArtifactKind::Progress => &self.progress_path,
        }
    }
}

/// What `initialize_if_absent` had to create.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InitOutcome {
    pub created_idea: bool,
    pub created_progress: bool,
}

#[derive(Debug, Clone)]
pub struct TaskStore {
    paths: TaskPaths,
}

impl TaskStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            paths: TaskPaths::new(root),
        }
    }

    pub fn root(&self) -> &Path {
        &self.paths.root
    }

    pub fn paths(&self) -> &TaskPaths {
        &self.paths
    }

    /// Current content of an artifact, or [`ABSENT_ARTIFACT`] if it does not exist.
    pub fn read_artifact(&self, kind: ArtifactKind) -> Result<String> {
        let path = self.paths.artifact(kind);
        match fs::read_to_string(path) {
            Ok(contents) => Ok(contents),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(ABSENT_ARTIFACT.to_string()),
            Err(err) => Err(err).with_context(|| format!("read {}", path.display())),
        }
    }

    /// Append one iteration record and return its index.
    ///
    /// The index continues from the last record already in the log. The new
    /// log is written to a temp file and renamed over the old one, so readers
    /// see either the previous log or the complete new record.
    pub fn append_progress(&self, body: &str) -> Result<u32> {
        let path = &self.paths.progress_path;
        let existing = match fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == ErrorKind::NotFound => PROGRESS_HEADER.to_string(),
            Err(err) => return Err(err).with_context(|| format!("read {}", path.display())),
        };
        let index = last_record_index(&existing) + 1;

        let mut updated = existing;
        if !updated.is_empty() && !updated.ends_with('\n') {
            updated.push('\n');
        }
        updated.push_str(&render_record(index, body));
        write_atomic(path, &updated)?;

        debug!(index, bytes = body.len(), "progress record appended");
        Ok(index)
    }

    /// Index of the most recent record in the log (0 when there are none).
    pub fn last_record_index(&self) -> Result<u32> {
        let log = self.read_artifact(ArtifactKind::Progress)?;
        Ok(last_record_index(&log))
    }

    /// Seed the project on first run.
    ///
    /// Creates the project directory, the idea (from `idea_source`, only
    /// invoked when the idea is missing) and the progress header. Existing
    /// artifacts are left untouched.
    pub fn initialize_if_absent<F>(&self, idea_source: F) -> Result<InitOutcome>
    where
        F: FnOnce() -> Result<String>,
    {
        let root = &self.paths.root;
        fs::create_dir_all(root)
            .with_context(|| format!("create project dir {}", root.display()))?;

        let created_idea = if self.paths.idea_path.exists() {
            false
        } else {
            let idea = idea_source().context("obtain idea")?;
            let idea = idea.trim();
            if idea.is_empty() {
                return Err(anyhow!("idea must not be empty"));
            }
            write_atomic(&self.paths.idea_path, &format!("{idea}\n"))?;
            info!(path = %self.paths.idea_path.display(), "created idea");
            true
        };

        let created_progress = if self.paths.progress_path.exists() {
            false
        } else {
            write_atomic(&self.paths.progress_path, PROGRESS_HEADER)?;
            info!(path = %self.paths.progress_path.display(), "created progress log");
            true
        };

        Ok(InitOutcome {
            created_idea,
            created_progress,
        })
    }
}

/// Render one record: blank line, header, body, trailing newline.
///
/// Header lookalikes inside the body are indented so they never parse as records.
pub fn render_record(index: u32, body: &str) -> String {
    let body = RECORD_HEADER_RE.replace_all(body.trim_end_matches(['\r', '\n']), "  $0");
    format!("\n--- Iteration {index} ---\n{body}\n")
}

fn last_record_index(log: &str) -> u32 {
    RECORD_HEADER_RE
        .captures_iter(log)
        .filter_map(|caps| caps.get(1)?.as_str().parse::<u32>().ok())
        .max()
        .unwrap_or(0)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("artifact path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let mut tmp_name = path
        .file_name()
        .with_context(|| format!("artifact path missing file name {}", path.display()))?
        .to_os_string();
    tmp_name.push(".tmp");
    let tmp_path = parent.join(tmp_name);
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp file {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_idea() -> Result<String> {
        Err(anyhow!("idea source must not be consulted"))
    }

    #[test]
    fn missing_artifacts_read_as_absent() {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = TaskStore::new(temp.path());
        for kind in ArtifactKind::ALL {
            assert_eq!(store.read_artifact(kind).expect("read"), ABSENT_ARTIFACT);
        }
    }

    #[test]
    fn initialize_seeds_idea_and_header_once() {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = TaskStore::new(temp.path().join("project"));

        let first = store
            .initialize_if_absent(|| Ok("  build a todo app \n".to_string()))
            .expect("init");
        assert_eq!(
            first,
            InitOutcome {
                created_idea: true,
                created_progress: true
            }
        );
        assert_eq!(
            store.read_artifact(ArtifactKind::Idea).expect("idea"),
            "build a todo app\n"
        );
        assert_eq!(
            store.read_artifact(ArtifactKind::Progress).expect("progress"),
            PROGRESS_HEADER
        );

        let second = store.initialize_if_absent(no_idea).expect("re-init");
        assert_eq!(
            second,
            InitOutcome {
                created_idea: false,
                created_progress: false
            }
        );
    }

    #[test]
    fn initialize_rejects_empty_idea() {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = TaskStore::new(temp.path());
        let err = store
            .initialize_if_absent(|| Ok("   ".to_string()))
            .unwrap_err();
        assert!(err.to_string().contains("idea must not be empty"));
        assert!(!store.paths().idea_path.exists());
    }

    #[test]
    fn append_progress_numbers_records_and_preserves_prefix() {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = TaskStore::new(temp.path());
        store
            .initialize_if_absent(|| Ok("idea".to_string()))
            .expect("init");

        assert_eq!(store.append_progress("first").expect("append"), 1);
        let after_one = store.read_artifact(ArtifactKind::Progress).expect("read");
        assert_eq!(store.append_progress("second\n").expect("append"), 2);
        let after_two = store.read_artifact(ArtifactKind::Progress).expect("read");

        assert!(after_two.starts_with(&after_one));
        assert_eq!(
            after_two,
            "Ralph Loop started\n\n\n--- Iteration 1 ---\nfirst\n\n--- Iteration 2 ---\nsecond\n"
        );
        assert!(!temp.path().join("progress.txt.tmp").exists());
    }

    #[test]
    fn append_progress_continues_existing_numbering() {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = TaskStore::new(temp.path());
        fs::write(
            &store.paths().progress_path,
            "Ralph Loop started\n\n--- Iteration 1 ---\na\n--- Iteration 4 ---\nb\n",
        )
        .expect("seed");

        assert_eq!(store.last_record_index().expect("index"), 4);
        assert_eq!(store.append_progress("c").expect("append"), 5);
    }

    #[test]
    fn record_bodies_cannot_forge_headers() {
        let record = render_record(3, "--- Iteration 40 ---\nfake");
        assert_eq!(record, "\n--- Iteration 3 ---\n  --- Iteration 40 ---\nfake\n");
        assert_eq!(last_record_index(&record), 3);
    }

    #[test]
    fn record_header_ignores_lookalikes_inside_bodies() {
        let log = "x --- Iteration 9 --- inline\n--- Iteration 2 ---\nbody\n";
        assert_eq!(last_record_index(log), 2);
    }
}
