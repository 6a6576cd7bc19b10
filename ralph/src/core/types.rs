//! Shared types for the response protocol and the loop controller.
//!
//! These types are the contract between the parser, the write materializer and
//! the loop. They carry no I/O and serialize deterministically.

use serde::{Deserialize, Serialize};

/// One of the three artifacts owned by the task state store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArtifactKind {
    /// Immutable seed requirement.
    Idea,
    /// Mutable specification document evolved by the model.
    Specification,
    /// Append-only progress log.
    Progress,
}

impl ArtifactKind {
    pub const ALL: [ArtifactKind; 3] = [
        ArtifactKind::Idea,
        ArtifactKind::Specification,
        ArtifactKind::Progress,
    ];

    /// Fixed file name relative to the project root.
    pub fn file_name(self) -> &'static str {
        match self {
            ArtifactKind::Idea => "idea.txt",
            ArtifactKind::Specification => "prd.md",
            ArtifactKind::Progress => "progress.txt",
        }
    }

    /// Match a `/`-separated relative path against the managed artifact names.
    ///
    /// Comparison ignores ASCII case and lexical noise such as `./` prefixes.
    pub fn from_relative_path(path: &str) -> Option<ArtifactKind> {
        let normalized = crate::core::path::normalize_directive_path(path);
        ArtifactKind::ALL
            .into_iter()
            .find(|kind| normalized.eq_ignore_ascii_case(kind.file_name()))
    }
}

/// A file-write instruction extracted from one completion.
///
/// Transient: consumed by the write materializer in the same iteration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteDirective {
    /// Normalized path (relative to the project root, or absolute).
    pub path: String,
    /// Raw inner text of the directive.
    pub content: String,
}

/// Non-fatal anomaly noticed while parsing a completion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProtocolDiagnostic {
    /// A reasoning block was opened and never closed; the tail was discarded.
    UnclosedReasoning,
    /// No (non-empty) summary block; the fallback body was used.
    MissingSummary,
    /// The completion carried no write directives.
    NoDirectives,
    /// A later directive repeated an earlier normalized path and was dropped.
    DuplicateDirective { path: String },
    /// A directive named an empty path and was dropped.
    EmptyDirectivePath,
    /// A close tag survived extraction without a matching open tag.
    StrayCloseTag { tag: String },
}

/// Everything the loop needs from one completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedResponse {
    /// Body to append to the progress log (never empty).
    pub summary: String,
    /// Surviving directives in document order, unique by normalized path.
    pub directives: Vec<WriteDirective>,
    /// Whether the completion sentinel appeared anywhere in the raw text.
    pub complete: bool,
    pub diagnostics: Vec<ProtocolDiagnostic>,
}

/// How directive paths are confined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum WritePolicy {
    /// Only relative paths that stay inside the project root.
    #[default]
    Workspace,
    /// Absolute paths are honored as-is; relative paths join the project root.
    Unrestricted,
}
