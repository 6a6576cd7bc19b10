//! Prompt rendering for the system and user turns.

use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use anyhow::{Context, Result};
use minijinja::{Environment, context};
use tracing::warn;

const SYSTEM_TEMPLATE: &str = include_str!("../prompts/system.md");
const CONTEXT_TEMPLATE: &str = include_str!("../prompts/context.md");

/// Placeholder replaced by today's date in system prompts.
pub const DATE_PLACEHOLDER: &str = "{current_date}";

/// Inputs for the user turn, already truncated and filtered.
#[derive(Debug, Clone)]
pub struct UserTurnInputs<'a> {
    pub idea: &'a str,
    pub spec: &'a str,
    pub progress: &'a str,
    pub files: &'a [String],
    /// Files left out of `files` by the listing cap.
    pub hidden_files: usize,
}

/// Template engine wrapper around minijinja.
struct PromptEngine {
    env: Environment<'static>,
}

impl PromptEngine {
    fn new() -> Result<Self> {
        let mut env = Environment::new();
        env.add_template("context", CONTEXT_TEMPLATE)
            .context("load context template")?;
        Ok(Self { env })
    }

    fn render_user_turn(&self, input: &UserTurnInputs<'_>) -> Result<String> {
        let template = self.env.get_template("context")?;
        let rendered = template.render(context! {
            idea => input.idea,
            spec => input.spec,
            progress => input.progress,
            files => input.files,
            hidden_files => input.hidden_files,
        })?;
        Ok(rendered)
    }
}

/// Render the single user turn sent each iteration.
pub fn render_user_turn(input: &UserTurnInputs<'_>) -> Result<String> {
    PromptEngine::new()?.render_user_turn(input)
}

/// Load the system prompt, falling back to the embedded protocol prompt.
///
/// `{current_date}` is replaced with `today` in either case.
pub fn load_system_prompt(path: &Path, today: &str) -> Result<String> {
    let template = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(err) if err.kind() == ErrorKind::NotFound => {
            warn!(path = %path.display(), "system prompt not found, using built-in prompt");
            SYSTEM_TEMPLATE.to_string()
        }
        Err(err) => {
            return Err(err).with_context(|| format!("read system prompt {}", path.display()));
        }
    };
    Ok(template.replace(DATE_PLACEHOLDER, today))
}

/// The embedded protocol prompt, as written by `ralph init`.
pub fn default_system_prompt() -> &'static str {
    SYSTEM_TEMPLATE
}
