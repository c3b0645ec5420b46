//! The workflow state machine and the `run(goal)` entry point.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use chrono::Utc;
use rand::{Rng, distributions::Alphanumeric};
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::agents::{
    AgentSettings, CommandPlanner, CommandScorer, CommandSelector, PlanProducer, QualityScorer,
    ToolSelector,
};
use crate::core::budget::{remaining_budget, transition_limit};
use crate::core::error::WorkflowError;
use crate::core::state::WorkflowState;
use crate::core::types::Stage;
use crate::io::backend::BackendRole;
use crate::io::config::EngineConfig;
use crate::io::memory::{FileMemoryStore, MemorySink};
use crate::stages::{QualityPolicy, run_execute_step, run_persist, run_plan, run_validate};
use crate::tools::ToolRegistry;

/// External collaborators, shared read-mostly across concurrent runs.
#[derive(Clone)]
pub struct Collaborators {
    pub planner: Arc<dyn PlanProducer>,
    pub selector: Arc<dyn ToolSelector>,
    pub scorer: Arc<dyn QualityScorer>,
    pub tools: Arc<ToolRegistry>,
    pub memory: Option<Arc<dyn MemorySink>>,
}

/// Per-run policy knobs.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkflowPolicy {
    pub quality: QualityPolicy,
    /// Wall-clock budget, checked between stage transitions.
    pub run_timeout: Duration,
    /// Past entries retrieved into the state during Persist.
    pub retrieve_k: usize,
    /// Fixed stage-transition cap; `None` derives it from the plan size.
    pub transition_limit: Option<usize>,
}

impl Default for WorkflowPolicy {
    fn default() -> Self {
        Self {
            quality: QualityPolicy::default(),
            run_timeout: Duration::from_secs(15 * 60),
            retrieve_k: 3,
            transition_limit: None,
        }
    }
}

impl WorkflowPolicy {
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            quality: QualityPolicy {
                threshold: config.workflow.quality_threshold,
                auto_validate_tool: config.workflow.fast_path_tool().map(str::to_string),
            },
            run_timeout: config.workflow.run_timeout(),
            retrieve_k: config.memory.retrieve_k,
            transition_limit: None,
        }
    }
}

/// Cooperative cancellation, observed between stage transitions.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Structured result of one run; the only surface the CLI consumes.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunOutcome {
    pub session_id: String,
    /// True iff a final output was compiled.
    pub success: bool,
    pub output: String,
    pub validation_passed: bool,
    pub iterations: u32,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

/// Outcome plus the final state and the number of stage transitions taken.
#[derive(Debug, Clone)]
pub struct WorkflowRun {
    pub outcome: RunOutcome,
    pub state: WorkflowState,
    pub transitions: usize,
}

pub struct Orchestrator {
    collaborators: Collaborators,
    policy: WorkflowPolicy,
}

impl Orchestrator {
    pub fn new(collaborators: Collaborators, policy: WorkflowPolicy) -> Self {
        Self {
            collaborators,
            policy,
        }
    }

    /// Wire command-backed agents, the built-in tools, and file memory from `config`.
    pub fn from_config(config: &EngineConfig) -> Result<Self> {
        let memory: Option<Arc<dyn MemorySink>> = if config.memory.enabled {
            let store = FileMemoryStore::open(config.memory.path.clone(), config.memory.min_score)
                .with_context(|| format!("open memory {}", config.memory.path.display()))?;
            Some(Arc::new(store))
        } else {
            None
        };
        let tools = Arc::new(ToolRegistry::builtin(&config.tools, memory.clone()));
        let planner = CommandPlanner::new(
            AgentSettings::from_config(&config.agents, BackendRole::Planner)?,
            tools.catalog(),
        );
        let selector =
            CommandSelector::new(AgentSettings::from_config(&config.agents, BackendRole::Selector)?);
        let scorer =
            CommandScorer::new(AgentSettings::from_config(&config.agents, BackendRole::Scorer)?);

        Ok(Self::new(
            Collaborators {
                planner: Arc::new(planner),
                selector: Arc::new(selector),
                scorer: Arc::new(scorer),
                tools,
                memory,
            },
            WorkflowPolicy::from_config(config),
        ))
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.collaborators.tools
    }

    pub fn policy(&self) -> &WorkflowPolicy {
        &self.policy
    }

    /// Run `goal` to completion with a fresh session.
    pub fn run(&self, goal: &str) -> RunOutcome {
        self.run_with_cancel(goal, &CancelFlag::new()).outcome
    }

    /// Run `goal`, stopping early if `cancel` is raised between stages.
    pub fn run_with_cancel(&self, goal: &str, cancel: &CancelFlag) -> WorkflowRun {
        self.run_session(new_session_id(), goal, cancel)
    }

    /// Drive the state machine from `Plan` until `Done`.
    #[instrument(skip_all, fields(session_id = %session_id))]
    pub fn run_session(&self, session_id: String, goal: &str, cancel: &CancelFlag) -> WorkflowRun {
        let started_at = Utc::now().to_rfc3339();
        let deadline = Instant::now() + self.policy.run_timeout;
        let mut state = WorkflowState::new(session_id, goal);
        let mut transitions = 0usize;
        let mut failure = None;
        info!(goal, "run started");

        while state.next_stage != Stage::Done {
            let stage = state.next_stage;
            if cancel.is_cancelled() {
                failure = Some(abort(
                    &mut state,
                    WorkflowError::Cancelled {
                        stage: stage.as_str().to_string(),
                    },
                ));
                break;
            }
            if remaining_budget(deadline).is_err() {
                failure = Some(abort(
                    &mut state,
                    WorkflowError::TimedOut {
                        stage: stage.as_str().to_string(),
                    },
                ));
                break;
            }
            let limit = self
                .policy
                .transition_limit
                .unwrap_or_else(|| transition_limit(state.plan.len()));
            if transitions >= limit {
                failure = Some(abort(&mut state, WorkflowError::TransitionLimit { limit }));
                break;
            }
            transitions += 1;
            debug!(stage = stage.as_str(), transitions, "dispatching stage");

            match stage {
                Stage::Plan => {
                    if let Err(error) = run_plan(&mut state, self.collaborators.planner.as_ref()) {
                        failure = Some(error);
                    }
                }
                Stage::Execute => run_execute_step(
                    &mut state,
                    self.collaborators.selector.as_ref(),
                    &self.collaborators.tools,
                ),
                Stage::Validate => run_validate(
                    &mut state,
                    self.collaborators.scorer.as_ref(),
                    &self.policy.quality,
                ),
                Stage::Persist => run_persist(
                    &mut state,
                    self.collaborators.memory.as_deref(),
                    self.policy.retrieve_k,
                    &started_at,
                ),
                Stage::Done => {}
            }
        }

        let outcome = build_outcome(&state, failure.as_ref());
        info!(
            success = outcome.success,
            validation_passed = outcome.validation_passed,
            iterations = outcome.iterations,
            transitions,
            "run finished"
        );
        WorkflowRun {
            outcome,
            state,
            transitions,
        }
    }
}

fn abort(state: &mut WorkflowState, error: WorkflowError) -> WorkflowError {
    warn!(%error, "run stopped");
    state.record_error(error.to_string());
    state.finish(Stage::Done);
    error
}

fn build_outcome(state: &WorkflowState, failure: Option<&WorkflowError>) -> RunOutcome {
    let (success, output) = match (failure, &state.final_output) {
        (Some(error @ WorkflowError::Cancelled { .. }), _) => {
            (false, format!("Workflow cancelled: {error}"))
        }
        (Some(error), _) => (false, format!("Workflow failed: {error}")),
        (None, Some(output)) => (true, output.clone()),
        (None, None) => {
            let reason = state
                .quality_verdict
                .as_ref()
                .map_or("no output was compiled", |verdict| verdict.feedback.as_str());
            (false, format!("Workflow failed: {reason}"))
        }
    };
    RunOutcome {
        session_id: state.session_id.clone(),
        success,
        output,
        validation_passed: state.validation_passed,
        iterations: state.iteration_count,
        errors: state.errors.to_vec(),
        warnings: state.warnings.to_vec(),
    }
}

/// `session-<UTC timestamp>-<6 random alphanumerics>`.
pub fn new_session_id() -> String {
    let mut rng = rand::thread_rng();
    let suffix = std::iter::repeat_with(|| rng.sample(Alphanumeric))
        .map(char::from)
        .take(6)
        .collect::<String>()
        .to_lowercase();
    format!("session-{}-{suffix}", Utc::now().format("%Y%m%d_%H%M%S"))
}
