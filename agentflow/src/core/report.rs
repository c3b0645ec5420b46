//! Final-output compilation.

use crate::core::state::WorkflowState;
use crate::core::types::TaskStatus;

/// Compile the textual report for a run.
///
/// Lists the goal, then every task in plan order with its result or error,
/// then the verdict feedback. Output is a pure function of the state.
pub fn compile_final_output(state: &WorkflowState) -> String {
    let mut lines = vec![format!("Goal: {}", state.goal), String::new()];

    for task in &state.plan {
        match task.status {
            TaskStatus::Completed => {
                lines.push(format!("[completed] {}: {}", task.id, task.description));
                lines.push(format!(
                    "  Result: {}",
                    task.result.as_deref().unwrap_or("(no result)")
                ));
            }
            TaskStatus::Failed => {
                lines.push(format!("[failed] {}: {}", task.id, task.description));
                lines.push(format!(
                    "  Error: {}",
                    task.error.as_deref().unwrap_or("(no error recorded)")
                ));
            }
            status => {
                lines.push(format!("[{status}] {}: {}", task.id, task.description));
            }
        }
    }

    if let Some(verdict) = &state.quality_verdict {
        lines.push(String::new());
        lines.push(format!(
            "Validation: {} (score {:.2})",
            verdict.feedback, verdict.score
        ));
    }

    lines.join("\n")
}
