//! Loop-level tests for full `ralph run` scenarios.
//!
//! These drive `run_loop` against a scripted backend and check the files left
//! behind: progress records, materialized writes and the run log.

use std::fs;

use ralph::core::transition::LoopState;
use ralph::core::types::ArtifactKind;
use ralph::io::iteration_log::IterationPaths;
use ralph::io::task_store::PROGRESS_HEADER;
use ralph::looping::run_loop;
use ralph::test_support::{ScriptedClient, TestProject};

fn progress(project: &TestProject) -> String {
    project
        .store
        .read_artifact(ArtifactKind::Progress)
        .expect("progress")
}

/// A completion that only reports completion ends the run after one call.
#[test]
fn sentinel_on_first_iteration_stops_immediately() {
    let project = TestProject::new("tiny CLI").expect("project");
    let client = ScriptedClient::new(vec![
        "<summary>done</summary><<<ALL_TASKS_COMPLETE>>>".into(),
    ]);

    let outcome =
        run_loop(&project.config, &project.store, &client, "system", |_| {}).expect("run");

    assert_eq!(outcome.iterations_executed, 1);
    assert_eq!(outcome.state, LoopState::CompletedBySentinel { iteration: 1 });
    assert_eq!(client.requests().len(), 1);
    assert_eq!(
        progress(&project),
        format!("{PROGRESS_HEADER}\n--- Iteration 1 ---\ndone\n")
    );

    let mut entries: Vec<String> = fs::read_dir(project.project_dir())
        .expect("read project")
        .map(|entry| entry.expect("entry").file_name().to_string_lossy().into_owned())
        .collect();
    entries.sort();
    assert_eq!(entries, vec!["idea.txt", "progress.txt"]);
}

/// Two directives for the same path: the first one wins.
#[test]
fn duplicate_directives_keep_first_content() {
    let project = TestProject::new("tiny CLI")
        .expect("project")
        .with_max_iterations(1);
    let client = ScriptedClient::new(vec![concat!(
        "<summary>wrote a</summary>",
        "<write_file path=\"a.txt\">1</write_file>",
        "<write_file path=\"a.txt\">2</write_file>",
    )
    .into()]);

    let mut written = Vec::new();
    let outcome = run_loop(&project.config, &project.store, &client, "system", |o| {
        written.push(o.files_written());
    })
    .expect("run");

    assert_eq!(outcome.state, LoopState::CompletedByBudgetExhaustion { iterations: 1 });
    assert_eq!(written, vec![1]);
    assert_eq!(
        fs::read_to_string(project.project_dir().join("a.txt")).expect("a.txt"),
        "1\n"
    );
}

/// Spelling the same path with `..` does not let a later directive win.
#[test]
fn parent_segment_alias_does_not_overwrite_first_directive() {
    let project = TestProject::new("tiny CLI")
        .expect("project")
        .with_max_iterations(1);
    let client = ScriptedClient::new(vec![concat!(
        "<summary>wrote a</summary>",
        "<write_file path=\"a.txt\">1</write_file>",
        "<write_file path=\"src/../a.txt\">2</write_file>",
    )
    .into()]);

    let mut written = Vec::new();
    run_loop(&project.config, &project.store, &client, "system", |o| {
        written.push(o.files_written());
    })
    .expect("run");

    assert_eq!(written, vec![1]);
    assert_eq!(
        fs::read_to_string(project.project_dir().join("a.txt")).expect("a.txt"),
        "1\n"
    );
}

/// Without the sentinel the loop runs exactly its budget.
#[test]
fn budget_exhaustion_runs_every_iteration() {
    let project = TestProject::new("tiny CLI")
        .expect("project")
        .with_max_iterations(3);
    let client = ScriptedClient::repeating("<summary>still working</summary>");

    let outcome =
        run_loop(&project.config, &project.store, &client, "system", |_| {}).expect("run");

    assert_eq!(outcome.iterations_executed, 3);
    assert_eq!(outcome.state, LoopState::CompletedByBudgetExhaustion { iterations: 3 });
    assert_eq!(client.requests().len(), 3);

    let log = progress(&project);
    for index in 1..=3 {
        assert!(log.contains(&format!("--- Iteration {index} ---\nstill working\n")));
    }
    assert!(!log.contains("--- Iteration 4 ---"));

    for index in 1..=3 {
        let paths = IterationPaths::new(&project.config.log_dir, index);
        assert_eq!(
            fs::read_to_string(&paths.response_path).expect("response"),
            "<summary>still working</summary>"
        );
        assert!(paths.meta_path.exists());
    }
}

/// A second run continues record numbering and sees earlier state.
#[test]
fn restart_continues_from_existing_state() {
    let project = TestProject::new("tiny CLI")
        .expect("project")
        .with_max_iterations(2);
    let first = ScriptedClient::repeating(concat!(
        "<summary>drafted prd</summary>",
        "<write_file path=\"prd.md\"># PRD\n- [ ] parser</write_file>",
    ));
    run_loop(&project.config, &project.store, &first, "system", |_| {}).expect("first run");

    let second = ScriptedClient::new(vec![
        "<summary>finished</summary><<<ALL_TASKS_COMPLETE>>>".into(),
    ]);
    let outcome =
        run_loop(&project.config, &project.store, &second, "system", |_| {}).expect("second run");

    assert_eq!(outcome.state, LoopState::CompletedBySentinel { iteration: 1 });
    let log = progress(&project);
    assert!(log.ends_with("--- Iteration 3 ---\nfinished\n"));

    let user_turn = &second.requests()[0].turns[1].content;
    assert!(user_turn.contains("# PRD\n- [ ] parser"));
    assert!(user_turn.contains("drafted prd"));
}

/// The sentinel counts even when it sits inside a reasoning block.
#[test]
fn sentinel_inside_reasoning_still_completes() {
    let project = TestProject::new("tiny CLI").expect("project");
    let client = ScriptedClient::new(vec![
        "<think>maybe <<<ALL_TASKS_COMPLETE>>></think><summary>checked</summary>".into(),
    ]);

    let outcome =
        run_loop(&project.config, &project.store, &client, "system", |_| {}).expect("run");

    assert_eq!(outcome.state, LoopState::CompletedBySentinel { iteration: 1 });
    assert!(progress(&project).ends_with("--- Iteration 1 ---\nchecked\n"));
}

/// A rejected directive does not stop the others or the loop.
#[test]
fn escaping_directive_fails_without_aborting_iteration() {
    let project = TestProject::new("tiny CLI")
        .expect("project")
        .with_max_iterations(1);
    let client = ScriptedClient::new(vec![concat!(
        "<summary>mixed</summary>",
        "<write_file path=\"../outside.txt\">nope</write_file>",
        "<write_file path=\"src/main.rs\">fn main() {}</write_file>",
    )
    .into()]);

    let mut failures = 0;
    run_loop(&project.config, &project.store, &client, "system", |o| {
        failures += o.write_failures();
    })
    .expect("run");

    assert_eq!(failures, 1);
    assert!(!project.temp.path().join("outside.txt").exists());
    assert_eq!(
        fs::read_to_string(project.project_dir().join("src/main.rs")).expect("main.rs"),
        "fn main() {}\n"
    );
}
