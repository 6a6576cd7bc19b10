//! Test-only helpers: a scripted completion backend and scratch projects.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::path::Path;

use anyhow::{Result, anyhow};
use tempfile::TempDir;

use crate::io::completion::{CompletionClient, CompletionRequest};
use crate::io::config::RalphConfig;
use crate::io::materialize::Materializer;
use crate::io::task_store::TaskStore;
use crate::step::StepEnv;

/// Completion client that replays canned replies in order.
///
/// Every request is recorded for later inspection.
#[derive(Debug, Default)]
pub struct ScriptedClient {
    replies: RefCell<VecDeque<Result<String, String>>>,
    repeat: Option<String>,
    requests: RefCell<Vec<CompletionRequest>>,
}

impl ScriptedClient {
    /// Reply with each text once, then fail.
    pub fn new(replies: Vec<String>) -> Self {
        Self {
            replies: RefCell::new(replies.into_iter().map(Ok).collect()),
            ..Self::default()
        }
    }

    /// Reply with the same text forever.
    pub fn repeating(reply: impl Into<String>) -> Self {
        Self {
            repeat: Some(reply.into()),
            ..Self::default()
        }
    }

    /// Fail every request with `message`.
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            replies: RefCell::new(VecDeque::from([Err(message.into())])),
            ..Self::default()
        }
    }

    /// Queue a failure after the replies already scripted.
    pub fn then_fail(self, message: impl Into<String>) -> Self {
        self.replies.borrow_mut().push_back(Err(message.into()));
        self
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.borrow().clone()
    }
}

impl CompletionClient for ScriptedClient {
    fn complete(&self, request: &CompletionRequest) -> Result<String> {
        self.requests.borrow_mut().push(request.clone());
        match self.replies.borrow_mut().pop_front() {
            Some(Ok(reply)) => Ok(reply),
            Some(Err(message)) => Err(anyhow!(message)),
            None => self
                .repeat
                .clone()
                .ok_or_else(|| anyhow!("scripted client has no replies left")),
        }
    }
}

/// Scratch project in a temp dir with a fast, fully local config.
pub struct TestProject {
    pub temp: TempDir,
    pub config: RalphConfig,
    pub store: TaskStore,
}

impl TestProject {
    /// Create a project whose idea and progress log are already seeded.
    pub fn new(idea: &str) -> Result<Self> {
        let project = Self::uninitialized()?;
        let idea = idea.to_string();
        project.store.initialize_if_absent(move || Ok(idea))?;
        Ok(project)
    }

    /// Create the temp dir and config without touching the project directory.
    pub fn uninitialized() -> Result<Self> {
        let temp = tempfile::tempdir()?;
        let config = RalphConfig {
            project_dir: temp.path().join("project"),
            system_prompt_path: temp.path().join("system_prompt.md"),
            log_dir: temp.path().join(".ralph").join("iterations"),
            pacing_ms: 0,
            max_iterations: 10,
            ..RalphConfig::default()
        };
        let store = TaskStore::new(&config.project_dir);
        Ok(Self {
            temp,
            config,
            store,
        })
    }

    pub fn with_max_iterations(mut self, max_iterations: u32) -> Self {
        self.config.max_iterations = max_iterations;
        self
    }

    pub fn project_dir(&self) -> &Path {
        self.store.root()
    }

    /// Run `f` with a [`StepEnv`] built from this project.
    pub fn with_env<T>(&self, f: impl FnOnce(&StepEnv<'_>) -> T) -> T {
        let materializer = Materializer::new(self.store.root(), self.config.write_policy);
        let env = StepEnv {
            config: &self.config,
            store: &self.store,
            materializer: &materializer,
            system_prompt: "test system prompt",
        };
        f(&env)
    }
}
