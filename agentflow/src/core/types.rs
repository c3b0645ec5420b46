//! Shared deterministic types for the workflow core.
//!
//! These types define stable contracts between stages. They hold no I/O
//! handles and serialize to a stable JSON shape for session logs.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle of a single task.
///
/// `Pending -> InProgress -> Completed | Failed`, and `Failed -> Pending` only
/// when the quality gate schedules a retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Task as emitted by a plan producer, before the engine owns it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskSpec {
    pub id: String,
    pub description: String,
    #[serde(default)]
    pub dependencies: Vec<String>,
}

impl TaskSpec {
    pub fn new(id: &str, description: &str, dependencies: &[&str]) -> Self {
        Self {
            id: id.to_string(),
            description: description.to_string(),
            dependencies: dependencies.iter().map(|dep| dep.to_string()).collect(),
        }
    }
}

/// Atomic unit of work inside a plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub description: String,
    pub status: TaskStatus,
    pub dependencies: Vec<String>,
    pub result: Option<String>,
    pub error: Option<String>,
}

impl From<TaskSpec> for Task {
    fn from(spec: TaskSpec) -> Self {
        Self {
            id: spec.id,
            description: spec.description,
            status: TaskStatus::Pending,
            dependencies: spec.dependencies,
            result: None,
            error: None,
        }
    }
}

/// One entry of the append-only tool log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCall {
    pub task_id: String,
    pub description: String,
    /// Registered tool that produced the result, `None` for direct answers.
    pub tool: Option<String>,
    pub success: bool,
    pub result: String,
}

/// Quality gate judgment for a completed or partially completed plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    pub passed: bool,
    /// Always within `[0, 1]`.
    pub score: f64,
    pub feedback: String,
}

impl Verdict {
    pub fn new(passed: bool, score: f64, feedback: impl Into<String>) -> Self {
        let score = if score.is_finite() {
            score.clamp(0.0, 1.0)
        } else {
            0.0
        };
        Self {
            passed,
            score,
            feedback: feedback.into(),
        }
    }

    /// Verdict used when the scorer reply cannot be interpreted.
    pub fn unparseable() -> Self {
        Self::new(false, 0.0, "unparseable")
    }

    pub fn auto_validated() -> Self {
        Self::new(true, 1.0, "auto-validated")
    }
}

/// Workflow stage that the orchestrator dispatches next.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Plan,
    Execute,
    Validate,
    Persist,
    Done,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Plan => "plan",
            Stage::Execute => "execute",
            Stage::Validate => "validate",
            Stage::Persist => "persist",
            Stage::Done => "done",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Speaker of a conversation history entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verdict_clamps_score_into_unit_range() {
        assert_eq!(Verdict::new(true, 1.7, "ok").score, 1.0);
        assert_eq!(Verdict::new(false, -0.3, "bad").score, 0.0);
        assert_eq!(Verdict::new(false, f64::NAN, "nan").score, 0.0);
    }

    #[test]
    fn task_from_spec_starts_pending_without_outcome() {
        let task = Task::from(TaskSpec::new("task_2", "use result", &["task_1"]));
        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.dependencies, vec!["task_1".to_string()]);
        assert!(task.result.is_none());
        assert!(task.error.is_none());
    }

    #[test]
    fn status_serializes_snake_case() {
        let json = serde_json::to_string(&TaskStatus::InProgress).expect("serialize");
        assert_eq!(json, "\"in_progress\"");
    }
}
