//! Dependency gating and context assembly for the execution engine.

use std::collections::BTreeMap;

use crate::core::types::{Task, TaskStatus};

/// Why a single dependency blocks execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnmetDependency {
    /// The id does not exist in the plan.
    Missing(String),
    /// The id exists but has not completed.
    NotCompleted { id: String, status: TaskStatus },
}

impl UnmetDependency {
    pub fn describe(&self) -> String {
        match self {
            UnmetDependency::Missing(id) => format!("{id} does not exist in the plan"),
            UnmetDependency::NotCompleted { id, status } => format!("{id} is {status}"),
        }
    }
}

/// Check that every dependency of `task` is a completed task in `plan`.
///
/// Returns the unmet dependencies in dependency-list order; empty means runnable.
pub fn unmet_dependencies(task: &Task, plan: &[Task]) -> Vec<UnmetDependency> {
    task.dependencies
        .iter()
        .filter_map(|dep_id| match plan.iter().find(|t| &t.id == dep_id) {
            None => Some(UnmetDependency::Missing(dep_id.clone())),
            Some(dep) if dep.status != TaskStatus::Completed => {
                Some(UnmetDependency::NotCompleted {
                    id: dep_id.clone(),
                    status: dep.status,
                })
            }
            Some(_) => None,
        })
        .collect()
}

/// Execution instruction for one task: its description plus upstream results.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionContext {
    pub task_id: String,
    pub description: String,
    /// `(dependency id, result)` pairs in dependency-list order.
    pub dependency_results: Vec<(String, String)>,
}

impl ExecutionContext {
    pub fn build(task: &Task, results_by_id: &BTreeMap<String, String>) -> Self {
        let dependency_results = task
            .dependencies
            .iter()
            .filter_map(|dep_id| {
                results_by_id
                    .get(dep_id)
                    .map(|result| (dep_id.clone(), result.clone()))
            })
            .collect();
        Self {
            task_id: task.id.clone(),
            description: task.description.clone(),
            dependency_results,
        }
    }

    /// Render upstream results, one `Result from <id>: <text>` line each.
    pub fn render_previous_results(&self) -> String {
        if self.dependency_results.is_empty() {
            return "No previous results".to_string();
        }
        self.dependency_results
            .iter()
            .map(|(id, result)| format!("Result from {id}: {result}"))
            .collect::<Vec<_>>()
            .join("\n")
    }
}
