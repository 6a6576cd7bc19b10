//! Bootstrap for `ralph init` and `ralph run`.
//!
//! Seeds the project on first use and hands a ready store and system prompt to
//! the loop controller.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{debug, info};

use crate::io::completion::CompletionClient;
use crate::io::config::{RalphConfig, write_config};
use crate::io::prompt::{default_system_prompt, load_system_prompt};
use crate::io::task_store::{InitOutcome, TaskStore};
use crate::looping::{LoopOutcome, run_loop};
use crate::step::IterationOutcome;

/// Options for `init_project`.
#[derive(Debug, Clone, Default)]
pub struct InitOptions {
    /// Overwrite an existing config file with the effective config.
    pub force_config: bool,
}

/// What `init_project` created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitReport {
    pub project_dir: PathBuf,
    pub artifacts: InitOutcome,
    pub wrote_config: bool,
    pub wrote_system_prompt: bool,
}

/// Create the project, the config file and an editable system prompt.
///
/// Existing artifacts and an existing system prompt are never overwritten.
pub fn init_project<F>(
    config: &RalphConfig,
    config_path: &Path,
    options: &InitOptions,
    idea_source: F,
) -> Result<InitReport>
where
    F: FnOnce() -> Result<String>,
{
    let store = TaskStore::new(&config.project_dir);
    let artifacts = store.initialize_if_absent(idea_source)?;

    let wrote_config = options.force_config || !config_path.exists();
    if wrote_config {
        write_config(config_path, config)
            .with_context(|| format!("write config {}", config_path.display()))?;
        info!(path = %config_path.display(), "wrote config");
    }

    let wrote_system_prompt = !config.system_prompt_path.exists();
    if wrote_system_prompt {
        write_system_prompt(&config.system_prompt_path)?;
        info!(path = %config.system_prompt_path.display(), "wrote system prompt");
    }

    Ok(InitReport {
        project_dir: config.project_dir.clone(),
        artifacts,
        wrote_config,
        wrote_system_prompt,
    })
}

/// Seed the project if needed, load the system prompt, and run the loop.
pub fn start_run<C, F, G>(
    config: &RalphConfig,
    client: &C,
    idea_source: F,
    on_iteration: G,
) -> Result<LoopOutcome>
where
    C: CompletionClient,
    F: FnOnce() -> Result<String>,
    G: FnMut(&IterationOutcome),
{
    config.validate()?;
    let store = TaskStore::new(&config.project_dir);
    let seeded = store.initialize_if_absent(idea_source)?;
    debug!(?seeded, project_dir = %config.project_dir.display(), "project ready");

    let system_prompt = load_system_prompt(&config.system_prompt_path, &today())?;
    run_loop(config, &store, client, &system_prompt, on_iteration)
}

/// Today's local date as `YYYY-MM-DD`.
pub fn today() -> String {
    chrono::Local::now().format("%Y-%m-%d").to_string()
}

fn write_system_prompt(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
    }
    fs::write(path, default_system_prompt())
        .with_context(|| format!("write system prompt {}", path.display()))
}
