//! Loop configuration stored in `ralph.toml`.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::core::types::WritePolicy;

/// Default config file name, resolved against the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "ralph.toml";

/// Loop configuration (TOML).
///
/// Built once at startup and passed by reference; nothing reads settings from
/// ambient globals. Missing fields default to values suited to a locally hosted
/// OpenAI-compatible server.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RalphConfig {
    /// Directory holding the managed artifacts and every file the model writes.
    pub project_dir: PathBuf,

    /// Hard ceiling on iterations per run.
    pub max_iterations: u32,

    /// System prompt file; `{current_date}` is substituted on load.
    pub system_prompt_path: PathBuf,

    /// Characters of progress log kept in context (trailing window).
    pub progress_budget_chars: usize,

    /// Cap on entries in the "other files" listing.
    pub max_listed_files: usize,

    /// Pause between iterations in milliseconds.
    pub pacing_ms: u64,

    /// Per-iteration raw responses and metadata.
    pub log_dir: PathBuf,

    pub write_policy: WritePolicy,

    pub backend: BackendConfig,
}

/// Completion backend settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BackendConfig {
    /// Base URL of an OpenAI-compatible API (`/chat/completions` is appended).
    pub base_url: String,
    pub api_key: String,
    /// Environment variable that overrides `api_key` when set and non-empty.
    pub api_key_env: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub request_timeout_secs: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:1234/v1".to_string(),
            api_key: "sk-no-key-required".to_string(),
            api_key_env: "RALPH_API_KEY".to_string(),
            model: "local-model".to_string(),
            temperature: 0.7,
            max_tokens: 4000,
            request_timeout_secs: 600,
        }
    }
}

impl Default for RalphConfig {
    fn default() -> Self {
        Self {
            project_dir: PathBuf::from("project"),
            max_iterations: 100,
            system_prompt_path: PathBuf::from("system_prompt.md"),
            progress_budget_chars: 24_000,
            max_listed_files: 200,
            pacing_ms: 1000,
            log_dir: PathBuf::from(".ralph/iterations"),
            write_policy: WritePolicy::Workspace,
            backend: BackendConfig::default(),
        }
    }
}

impl RalphConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_iterations == 0 {
            return Err(anyhow!("max_iterations must be > 0"));
        }
        if self.max_listed_files == 0 {
            return Err(anyhow!("max_listed_files must be > 0"));
        }
        if self.project_dir.as_os_str().is_empty() {
            return Err(anyhow!("project_dir must not be empty"));
        }
        self.backend.validate()
    }

    pub fn pacing(&self) -> Duration {
        Duration::from_millis(self.pacing_ms)
    }
}

impl BackendConfig {
    pub fn validate(&self) -> Result<()> {
        if self.base_url.trim().is_empty() {
            return Err(anyhow!("backend.base_url must not be empty"));
        }
        if self.model.trim().is_empty() {
            return Err(anyhow!("backend.model must not be empty"));
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(anyhow!(
                "backend.temperature must be within [0, 2] (got {})",
                self.temperature
            ));
        }
        if self.max_tokens == 0 {
            return Err(anyhow!("backend.max_tokens must be > 0"));
        }
        if self.request_timeout_secs == 0 {
            return Err(anyhow!("backend.request_timeout_secs must be > 0"));
        }
        Ok(())
    }

    /// API key from `api_key_env` when set, else the configured key.
    pub fn resolve_api_key(&self) -> Option<String> {
        std::env::var(&self.api_key_env)
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .or_else(|| {
                Some(self.api_key.trim().to_string()).filter(|value| !value.is_empty())
            })
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `RalphConfig::default()`.
pub fn load_config(path: &Path) -> Result<RalphConfig> {
    if !path.exists() {
        let cfg = RalphConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: RalphConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("invalid config {}", path.display()))?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &RalphConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("create directory {}", parent.display()))?;
    }
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}
