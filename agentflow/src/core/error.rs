//! Error taxonomy for workflow failures.
//!
//! Stages convert these into `errors`/`warnings` entries. Only `Planning` and
//! the orchestrator's own guards (`TransitionLimit`, `Cancelled`, `TimedOut`)
//! end a run as a failure.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WorkflowError {
    /// The producer failed or returned an unusable plan.
    #[error("Planning error: {0}")]
    Planning(String),

    /// A task referenced a dependency that is missing or not completed.
    #[error("Dependencies not met for {task_id}: {detail}")]
    Dependency { task_id: String, detail: String },

    /// A tool reported failure for a task.
    #[error("Tool {tool} failed for {task_id}: {message}")]
    Tool {
        task_id: String,
        tool: String,
        message: String,
    },

    /// The quality scorer failed or replied with something unusable.
    #[error("Scoring error: {0}")]
    Scoring(String),

    #[error("Validation failed after {retries} retries: {feedback}")]
    RetryBudgetExceeded { retries: u32, feedback: String },

    #[error("Workflow exceeded {limit} stage transitions")]
    TransitionLimit { limit: usize },

    #[error("Run cancelled before {stage} stage")]
    Cancelled { stage: String },

    #[error("Run timed out before {stage} stage")]
    TimedOut { stage: String },
}

impl WorkflowError {
    pub fn planning(message: impl Into<String>) -> Self {
        WorkflowError::Planning(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dependency_error_names_task() {
        let err = WorkflowError::Dependency {
            task_id: "task_2".to_string(),
            detail: "task_1 is failed".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Dependencies not met for task_2: task_1 is failed"
        );
    }

    #[test]
    fn planning_error_survives_anyhow_downcast() {
        let err: anyhow::Error = WorkflowError::planning("empty plan").into();
        let planning = err.downcast_ref::<WorkflowError>().expect("downcast");
        assert_eq!(planning, &WorkflowError::Planning("empty plan".to_string()));
    }
}
