//! `ralph`: drive a completion backend through an unattended build loop.
//!
//! State lives in three files inside the project directory (`idea.txt`,
//! `prd.md`, `progress.txt`); every iteration is rebuilt from them, so a run
//! can be stopped and resumed at any point.

use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};

use ralph::core::transition::LoopState;
use ralph::exit_codes;
use ralph::io::completion::OpenAiCompatClient;
use ralph::io::config::{DEFAULT_CONFIG_FILE, RalphConfig, load_config};
use ralph::start::{InitOptions, init_project, start_run};
use ralph::step::IterationOutcome;

#[derive(Parser)]
#[command(
    name = "ralph",
    version,
    about = "Unattended multi-turn agent loop over a local project directory"
)]
struct Cli {
    /// Config file (missing file means defaults).
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create the project directory, `ralph.toml` and the system prompt if missing.
    Init {
        /// Seed `idea.txt` without prompting.
        #[arg(long)]
        idea: Option<String>,
        /// Overwrite an existing config file.
        #[arg(long)]
        force_config: bool,
    },
    /// Run iterations until the completion sentinel or the iteration budget.
    Run {
        #[arg(long)]
        max_iterations: Option<u32>,
        #[arg(long)]
        model: Option<String>,
        #[arg(long)]
        base_url: Option<String>,
        #[arg(long)]
        project_dir: Option<PathBuf>,
        /// Seed `idea.txt` without prompting when it does not exist yet.
        #[arg(long)]
        idea: Option<String>,
    },
}

fn main() {
    ralph::logging::init();
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("{:#}", err);
            std::process::exit(exit_codes::FATAL);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    let mut config = load_config(&cli.config)?;
    match cli.command {
        Command::Init { idea, force_config } => {
            cmd_init(&config, &cli.config, idea, force_config)
        }
        Command::Run {
            max_iterations,
            model,
            base_url,
            project_dir,
            idea,
        } => {
            apply_run_overrides(&mut config, max_iterations, model, base_url, project_dir);
            config.validate().context("invalid run options")?;
            cmd_run(&config, idea)
        }
    }
}

fn cmd_init(
    config: &RalphConfig,
    config_path: &Path,
    idea: Option<String>,
    force_config: bool,
) -> Result<i32> {
    let report = init_project(config, config_path, &InitOptions { force_config }, || {
        idea_or_prompt(idea)
    })?;
    println!("project: {}", report.project_dir.display());
    if report.artifacts.created_idea {
        println!("created idea.txt");
    }
    if report.wrote_config {
        println!("wrote {}", config_path.display());
    }
    if report.wrote_system_prompt {
        println!("wrote {}", config.system_prompt_path.display());
    }
    Ok(exit_codes::OK)
}

fn cmd_run(config: &RalphConfig, idea: Option<String>) -> Result<i32> {
    let client = OpenAiCompatClient::new(&config.backend)?;
    let outcome = start_run(config, &client, || idea_or_prompt(idea), print_iteration)?;
    match outcome.state {
        LoopState::CompletedBySentinel { iteration } => {
            println!("all tasks complete after iteration {iteration}");
        }
        LoopState::CompletedByBudgetExhaustion { iterations } => {
            println!("iteration budget exhausted after {iterations} iterations");
        }
        LoopState::Running(_) => {}
    }
    exit_code_for(outcome.state)
}

/// Map a finished loop to the process exit code.
fn exit_code_for(state: LoopState) -> Result<i32> {
    match state {
        LoopState::CompletedBySentinel { .. } => Ok(exit_codes::OK),
        LoopState::CompletedByBudgetExhaustion { .. } => Ok(exit_codes::BUDGET_EXHAUSTED),
        LoopState::Running(iteration) => {
            bail!("loop stopped while iteration {iteration} was still running")
        }
    }
}

fn print_iteration(outcome: &IterationOutcome) {
    println!(
        "[{}] {} ({} written, {} failed)",
        outcome.iteration,
        outcome.summary,
        outcome.files_written(),
        outcome.write_failures()
    );
}

fn apply_run_overrides(
    config: &mut RalphConfig,
    max_iterations: Option<u32>,
    model: Option<String>,
    base_url: Option<String>,
    project_dir: Option<PathBuf>,
) {
    if let Some(max_iterations) = max_iterations {
        config.max_iterations = max_iterations;
    }
    if let Some(model) = model {
        config.backend.model = model;
    }
    if let Some(base_url) = base_url {
        config.backend.base_url = base_url;
    }
    if let Some(project_dir) = project_dir {
        config.project_dir = project_dir;
    }
}

/// Use the `--idea` value, else ask once on stdin.
fn idea_or_prompt(idea: Option<String>) -> Result<String> {
    if let Some(idea) = idea {
        return Ok(idea);
    }
    print!("Enter your IDEA (one sentence or paragraph): ");
    io::stdout().flush().context("flush stdout")?;
    let mut line = String::new();
    io::stdin()
        .lock()
        .read_line(&mut line)
        .context("read idea from stdin")?;
    Ok(line)
}
