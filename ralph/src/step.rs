//! Orchestration for a single iteration of the loop.
//!
//! assemble context -> invoke backend -> parse -> append progress -> apply writes.
//! Backend and context failures are fatal and propagate. Progress, write and
//! run-log failures are logged and the iteration still completes.

use std::time::Instant;

use anyhow::{Context, Result};
use tracing::{debug, error, info, instrument, warn};

use crate::core::protocol::parse_response;
use crate::core::types::ProtocolDiagnostic;
use crate::io::completion::{CompletionClient, CompletionRequest};
use crate::io::config::RalphConfig;
use crate::io::context::{ContextLimits, assemble_context};
use crate::io::iteration_log::{IterationMeta, write_iteration};
use crate::io::materialize::{Materializer, WriteOutcome};
use crate::io::task_store::TaskStore;

/// Everything an iteration reads but does not own.
#[derive(Debug, Clone, Copy)]
pub struct StepEnv<'a> {
    pub config: &'a RalphConfig,
    pub store: &'a TaskStore,
    pub materializer: &'a Materializer,
    pub system_prompt: &'a str,
}

/// Result of a single iteration.
#[derive(Debug, Clone)]
pub struct IterationOutcome {
    /// Iteration number within this run (1-indexed).
    pub iteration: u32,
    /// Index of the progress record appended, if the append succeeded.
    pub record_index: Option<u32>,
    /// Body persisted to the progress log.
    pub summary: String,
    /// The completion carried the sentinel.
    pub complete: bool,
    pub writes: Vec<WriteOutcome>,
    pub diagnostics: Vec<ProtocolDiagnostic>,
}

impl IterationOutcome {
    pub fn files_written(&self) -> usize {
        self.writes.iter().filter(|w| w.is_written()).count()
    }

    pub fn write_failures(&self) -> usize {
        self.writes.len() - self.files_written()
    }
}

/// Execute one iteration.
#[instrument(skip(env, client))]
pub fn run_iteration<C: CompletionClient>(
    env: &StepEnv<'_>,
    client: &C,
    iteration: u32,
) -> Result<IterationOutcome> {
    let start = Instant::now();
    let limits = ContextLimits {
        progress_budget_chars: env.config.progress_budget_chars,
        max_listed_files: env.config.max_listed_files,
    };
    let context = assemble_context(env.store, &limits).context("assemble context")?;

    let request = CompletionRequest::system_user(
        &env.config.backend,
        env.system_prompt.to_string(),
        context.user_turn,
    );
    let raw = client.complete(&request).context("completion backend")?;

    let parsed = parse_response(&raw);
    report_diagnostics(&parsed.diagnostics);

    let record_index = match env.store.append_progress(&parsed.summary) {
        Ok(index) => Some(index),
        Err(err) => {
            error!(err = %format!("{err:#}"), "failed to append progress record");
            None
        }
    };

    let writes = env.materializer.apply_all(&parsed.directives);

    let outcome = IterationOutcome {
        iteration,
        record_index,
        summary: parsed.summary,
        complete: parsed.complete,
        writes,
        diagnostics: parsed.diagnostics,
    };
    write_run_log(env, &raw, &outcome, elapsed_ms(start));

    info!(
        record = ?outcome.record_index,
        files_written = outcome.files_written(),
        write_failures = outcome.write_failures(),
        complete = outcome.complete,
        "iteration finished"
    );
    Ok(outcome)
}

fn elapsed_ms(start: Instant) -> u64 {
    u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX)
}

fn report_diagnostics(diagnostics: &[ProtocolDiagnostic]) {
    for diagnostic in diagnostics {
        match diagnostic {
            ProtocolDiagnostic::NoDirectives => debug!("completion carried no write directives"),
            ProtocolDiagnostic::MissingSummary => {
                warn!("completion carried no summary block, using fallback");
            }
            ProtocolDiagnostic::UnclosedReasoning => {
                warn!("unclosed reasoning block, discarded the rest of the completion");
            }
            ProtocolDiagnostic::DuplicateDirective { path } => {
                warn!(path = %path, "dropped duplicate write directive");
            }
            ProtocolDiagnostic::EmptyDirectivePath => {
                warn!("dropped write directive with an empty path");
            }
            ProtocolDiagnostic::StrayCloseTag { tag } => {
                warn!(tag = %tag, "stray close tag in completion");
            }
        }
    }
}

fn write_run_log(env: &StepEnv<'_>, raw: &str, outcome: &IterationOutcome, duration_ms: u64) {
    let key = match outcome.record_index {
        Some(index) => index,
        None => env.store.last_record_index().unwrap_or(0) + 1,
    };
    let meta = IterationMeta {
        index: outcome.record_index,
        iteration: outcome.iteration,
        summary: outcome.summary.clone(),
        complete: outcome.complete,
        writes: outcome.writes.clone(),
        diagnostics: outcome.diagnostics.clone(),
        duration_ms,
    };
    if let Err(err) = write_iteration(&env.config.log_dir, key, raw, &meta) {
        warn!(err = %format!("{err:#}"), "failed to write iteration run log");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::protocol::SUMMARY_FALLBACK;
    use crate::core::types::ArtifactKind;
    use crate::test_support::{ScriptedClient, TestProject};
    use std::fs;

    #[test]
    fn elapsed_ms_measures_from_start() {
        let start = Instant::now() - std::time::Duration::from_millis(1500);
        let elapsed = elapsed_ms(start);
        assert!((1500..60_000).contains(&elapsed), "{elapsed}");
    }

    #[test]
    fn iteration_appends_summary_and_writes_files() {
        let project = TestProject::new("a tiny web server").expect("project");
        let client = ScriptedClient::new(vec![
            "<think>plan</think><summary>wrote prd</summary>\
             <write_file path=\"prd.md\"># PRD</write_file>"
                .into(),
        ]);

        let outcome = project
            .with_env(|env| run_iteration(env, &client, 1))
            .expect("iteration");

        assert_eq!(outcome.record_index, Some(1));
        assert_eq!(outcome.summary, "wrote prd");
        assert_eq!(outcome.files_written(), 1);
        assert!(!outcome.complete);
        assert_eq!(
            project.store.read_artifact(ArtifactKind::Specification).expect("prd"),
            "# PRD\n"
        );

        let requests = client.requests();
        assert_eq!(requests.len(), 1);
        assert!(requests[0].turns[1].content.contains("a tiny web server"));
    }

    #[test]
    fn backend_failure_is_fatal_and_leaves_state_untouched() {
        let project = TestProject::new("idea").expect("project");
        let before = project
            .store
            .read_artifact(ArtifactKind::Progress)
            .expect("progress");
        let client = ScriptedClient::failing("connection refused");

        let err = project
            .with_env(|env| run_iteration(env, &client, 1))
            .unwrap_err();
        assert!(format!("{err:#}").contains("connection refused"));
        assert_eq!(
            project.store.read_artifact(ArtifactKind::Progress).expect("progress"),
            before
        );
    }

    #[test]
    fn write_failures_do_not_fail_the_iteration() {
        let project = TestProject::new("idea").expect("project");
        let client = ScriptedClient::new(vec![
            "<write_file path=\"../escape.txt\">x</write_file>\
             <write_file path=\"idea.txt\">rewrite</write_file>\
             <write_file path=\"ok.txt\">ok</write_file>"
                .into(),
        ]);

        let outcome = project
            .with_env(|env| run_iteration(env, &client, 1))
            .expect("iteration");
        assert_eq!(outcome.summary, SUMMARY_FALLBACK);
        assert_eq!(outcome.files_written(), 1);
        assert_eq!(outcome.write_failures(), 2);
        assert_eq!(
            project.store.read_artifact(ArtifactKind::Idea).expect("idea"),
            "idea\n"
        );
    }

    #[test]
    fn run_log_keeps_raw_response() {
        let project = TestProject::new("idea").expect("project");
        let raw = "<summary>s</summary> trailing prose";
        let client = ScriptedClient::new(vec![raw.into()]);

        project
            .with_env(|env| run_iteration(env, &client, 1))
            .expect("iteration");

        let response = fs::read_to_string(project.config.log_dir.join("1/response.md"))
            .expect("response log");
        assert_eq!(response, raw);
        assert!(project.config.log_dir.join("1/meta.json").is_file());
    }
}
