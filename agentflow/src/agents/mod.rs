//! Decision interfaces consulted by the workflow stages.
//!
//! The engine only sees the three narrow traits below. The `Command*`
//! implementations render a prompt, hand it to a [`Backend`], and parse the
//! JSON reply; tests substitute scripted implementations.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Result, anyhow};
use tracing::debug;

use crate::core::dependencies::ExecutionContext;
use crate::core::types::{Task, TaskSpec, Verdict};
use crate::io::backend::{Backend, BackendRequest, BackendRole, CommandBackend};
use crate::io::config::AgentsConfig;
use crate::io::prompt::{PromptBuilder, ToolInfo};

pub mod planner;
pub mod scorer;
pub mod selector;

pub use planner::CommandPlanner;
pub use scorer::CommandScorer;
pub use selector::CommandSelector;

/// Turns a goal into a dependency-ordered list of tasks.
pub trait PlanProducer: Send + Sync {
    /// Fails with [`crate::core::error::WorkflowError::Planning`] when no usable plan can be produced.
    fn produce_plan(&self, goal: &str) -> Result<Vec<TaskSpec>>;
}

/// What the selector decided to do for one task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    /// Invoke the named tool with `input`.
    Tool { name: String, input: String },
    /// Answer without a tool.
    Direct(String),
}

/// Everything the selector sees for one task.
#[derive(Debug, Clone)]
pub struct SelectionRequest {
    pub goal: String,
    pub context: ExecutionContext,
    pub tools: Vec<ToolInfo>,
}

/// Chooses a tool (or a direct answer) for one task.
pub trait ToolSelector: Send + Sync {
    fn select(&self, request: &SelectionRequest) -> Result<Selection>;
}

/// Judges whether executed tasks achieve the goal.
pub trait QualityScorer: Send + Sync {
    fn score(&self, goal: &str, completed: &[&Task], failed: &[&Task]) -> Result<Verdict>;
}

/// Backend handle plus per-role prompt and invocation limits.
#[derive(Clone)]
pub struct AgentSettings {
    pub backend: Arc<dyn Backend>,
    pub timeout: Duration,
    pub output_limit_bytes: usize,
    pub prompt_budget_bytes: usize,
    pub system_prompt: Option<String>,
}

impl AgentSettings {
    /// Settings for `role` backed by the configured command.
    pub fn from_config(config: &AgentsConfig, role: BackendRole) -> Result<Self> {
        let backend = CommandBackend::new(config.command_for(role).to_vec())?;
        Ok(Self {
            backend: Arc::new(backend),
            timeout: config.timeout(),
            output_limit_bytes: config.output_limit_bytes,
            prompt_budget_bytes: config.prompt_budget_bytes,
            system_prompt: config.role(role).system_prompt.clone(),
        })
    }

    /// Settings around an explicit backend with default limits.
    pub fn with_backend(backend: Arc<dyn Backend>) -> Self {
        let defaults = AgentsConfig::default();
        Self {
            backend,
            timeout: defaults.timeout(),
            output_limit_bytes: defaults.output_limit_bytes,
            prompt_budget_bytes: defaults.prompt_budget_bytes,
            system_prompt: None,
        }
    }

    fn prompt_builder(&self) -> PromptBuilder {
        PromptBuilder::new(self.prompt_budget_bytes).with_system_prompt(self.system_prompt.as_deref())
    }

    fn ask(&self, role: BackendRole, prompt: String) -> Result<String> {
        debug!(%role, prompt_bytes = prompt.len(), "asking backend");
        let request = BackendRequest {
            role,
            prompt,
            timeout: self.timeout,
            output_limit_bytes: self.output_limit_bytes,
        };
        let reply = self.backend.complete(&request)?;
        if reply.trim().is_empty() {
            return Err(anyhow!("{role} backend returned an empty reply"));
        }
        Ok(reply)
    }
}
