//! The single mutable record threaded through every workflow stage.

use std::collections::BTreeMap;
use std::ops::Deref;

use serde::{Deserialize, Serialize};

use crate::core::types::{Message, Role, Stage, Task, TaskStatus, ToolCall, Verdict};

/// Ordered sequence that only supports appending.
///
/// Exposes read access through `Deref<Target = [T]>`; there is no removal or
/// in-place mutation API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AppendLog<T>(Vec<T>);

impl<T> AppendLog<T> {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn push(&mut self, item: T) {
        self.0.push(item);
    }
}

impl<T> Default for AppendLog<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Deref for AppendLog<T> {
    type Target = [T];

    fn deref(&self) -> &[T] {
        &self.0
    }
}

impl<'a, T> IntoIterator for &'a AppendLog<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Workflow state for one `run()` call.
///
/// Owned by the orchestrator and lent to one stage at a time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowState {
    pub session_id: String,
    pub goal: String,
    pub plan: Vec<Task>,
    /// Index of the next task to execute. Only moves backwards on a retry reset.
    pub cursor: usize,
    pub tool_log: AppendLog<ToolCall>,
    pub results_by_id: BTreeMap<String, String>,
    pub quality_verdict: Option<Verdict>,
    pub validation_passed: bool,
    pub retry_count: u32,
    pub next_stage: Stage,
    pub iteration_count: u32,
    pub done: bool,
    pub final_output: Option<String>,
    pub errors: AppendLog<String>,
    pub warnings: AppendLog<String>,
    pub history: AppendLog<Message>,
    pub retrieved_context: Option<String>,
}

impl WorkflowState {
    pub fn new(session_id: impl Into<String>, goal: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            goal: goal.into(),
            plan: Vec::new(),
            cursor: 0,
            tool_log: AppendLog::new(),
            results_by_id: BTreeMap::new(),
            quality_verdict: None,
            validation_passed: false,
            retry_count: 0,
            next_stage: Stage::Plan,
            iteration_count: 0,
            done: false,
            final_output: None,
            errors: AppendLog::new(),
            warnings: AppendLog::new(),
            history: AppendLog::new(),
            retrieved_context: None,
        }
    }

    pub fn task(&self, id: &str) -> Option<&Task> {
        self.plan.iter().find(|task| task.id == id)
    }

    pub fn tasks_with_status(&self, status: TaskStatus) -> Vec<&Task> {
        self.plan
            .iter()
            .filter(|task| task.status == status)
            .collect()
    }

    pub fn all_completed(&self) -> bool {
        !self.plan.is_empty()
            && self
                .plan
                .iter()
                .all(|task| task.status == TaskStatus::Completed)
    }

    pub fn record_error(&mut self, message: impl Into<String>) {
        self.errors.push(message.into());
    }

    pub fn record_warning(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }

    pub fn record_message(&mut self, role: Role, content: impl Into<String>) {
        self.history.push(Message {
            role,
            content: content.into(),
        });
    }

    /// Mark the run terminal and route to `stage` (either `Persist` or `Done`).
    pub fn finish(&mut self, stage: Stage) {
        self.done = true;
        self.next_stage = stage;
    }
}
