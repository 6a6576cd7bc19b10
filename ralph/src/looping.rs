//! Loop controller for `ralph run`.

use std::thread;

use anyhow::Result;
use tracing::{debug, info};

use crate::core::transition::LoopState;
use crate::io::completion::CompletionClient;
use crate::io::config::RalphConfig;
use crate::io::materialize::Materializer;
use crate::io::task_store::TaskStore;
use crate::step::{IterationOutcome, StepEnv, run_iteration};

/// Summary of a loop invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopOutcome {
    pub iterations_executed: u32,
    /// Always a terminal state.
    pub state: LoopState,
}

/// Run iterations until the sentinel is seen or `max_iterations` is reached.
///
/// Exactly one iteration is in flight at a time; `config.pacing_ms` is slept
/// between iterations, not after the last one. Any error from an iteration
/// (context assembly, backend call) stops the loop and is returned.
pub fn run_loop<C: CompletionClient, F: FnMut(&IterationOutcome)>(
    config: &RalphConfig,
    store: &TaskStore,
    client: &C,
    system_prompt: &str,
    mut on_iteration: F,
) -> Result<LoopOutcome> {
    let materializer = Materializer::new(store.root(), config.write_policy);
    let env = StepEnv {
        config,
        store,
        materializer: &materializer,
        system_prompt,
    };

    let mut state = LoopState::start(config.max_iterations);
    let mut iterations_executed = 0u32;
    while let LoopState::Running(iteration) = state {
        info!(iteration, max_iterations = config.max_iterations, "iteration starting");
        let outcome = run_iteration(&env, client, iteration)?;
        iterations_executed += 1;
        on_iteration(&outcome);

        state = state.advance(outcome.complete, config.max_iterations);
        if !state.is_terminal() && config.pacing_ms > 0 {
            debug!(pacing_ms = config.pacing_ms, "pacing before next iteration");
            thread::sleep(config.pacing());
        }
    }

    info!(?state, iterations_executed, "loop finished");
    Ok(LoopOutcome {
        iterations_executed,
        state,
    })
}
