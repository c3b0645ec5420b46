//! Execute stage: run one task per step, gated on its dependencies.

use anyhow::Result;
use tracing::{debug, info, instrument, warn};

use crate::agents::{Selection, SelectionRequest, ToolSelector};
use crate::core::dependencies::{ExecutionContext, unmet_dependencies};
use crate::core::error::WorkflowError;
use crate::core::state::WorkflowState;
use crate::core::types::{Stage, TaskStatus, ToolCall};
use crate::tools::{ToolOutput, ToolRegistry};

/// What running a single task produced.
#[derive(Debug)]
enum TaskRun {
    Tool { name: String, output: ToolOutput },
    Direct(String),
}

/// Execute the task at the cursor and decide the next stage.
///
/// Completed tasks at the cursor (left over from an earlier attempt) are
/// skipped without re-running them. A dependency failure or an unexpected
/// error fails the current task and routes straight to `Validate`; a tool
/// failure fails the task but lets execution continue.
#[instrument(skip_all, fields(session_id = %state.session_id, cursor = state.cursor))]
pub fn run_execute_step(
    state: &mut WorkflowState,
    selector: &dyn ToolSelector,
    registry: &ToolRegistry,
) {
    while state
        .plan
        .get(state.cursor)
        .is_some_and(|task| task.status == TaskStatus::Completed)
    {
        state.cursor += 1;
    }
    let index = state.cursor;
    if index >= state.plan.len() {
        debug!("plan exhausted");
        state.next_stage = Stage::Validate;
        return;
    }

    let unmet = unmet_dependencies(&state.plan[index], &state.plan);
    if !unmet.is_empty() {
        let detail = unmet
            .iter()
            .map(|dep| dep.describe())
            .collect::<Vec<_>>()
            .join(", ");
        let error = WorkflowError::Dependency {
            task_id: state.plan[index].id.clone(),
            detail,
        };
        warn!(%error, "dependency check failed");
        fail_task(state, index, error.to_string());
        state.next_stage = Stage::Validate;
        return;
    }

    state.plan[index].status = TaskStatus::InProgress;
    let request = SelectionRequest {
        goal: state.goal.clone(),
        context: ExecutionContext::build(&state.plan[index], &state.results_by_id),
        tools: registry.catalog(),
    };

    let run = match run_task(&request, selector, registry) {
        Ok(run) => run,
        Err(err) => {
            let message = format!("Execution error: {err:#}");
            warn!(error = %message, "task execution failed unexpectedly");
            fail_task(state, index, message);
            state.next_stage = Stage::Validate;
            return;
        }
    };

    let task_id = state.plan[index].id.clone();
    let description = state.plan[index].description.clone();
    let call = match run {
        TaskRun::Tool { name, output } if output.success => {
            let value = output.value.unwrap_or_default();
            complete_task(state, index, &value);
            ToolCall {
                task_id,
                description,
                tool: Some(name),
                success: true,
                result: value,
            }
        }
        TaskRun::Tool { name, output } => {
            let message = output.describe_error();
            let error = WorkflowError::Tool {
                task_id: task_id.clone(),
                tool: name.clone(),
                message: message.clone(),
            };
            warn!(%error, "tool reported failure");
            state.plan[index].status = TaskStatus::Failed;
            state.plan[index].error = Some(format!("Tool {name} failed: {message}"));
            state.record_error(error.to_string());
            ToolCall {
                task_id,
                description,
                tool: Some(name),
                success: false,
                result: message,
            }
        }
        TaskRun::Direct(text) => {
            complete_task(state, index, &text);
            ToolCall {
                task_id,
                description,
                tool: None,
                success: true,
                result: text,
            }
        }
    };
    info!(task_id = %call.task_id, tool = ?call.tool, success = call.success, "task executed");
    state.tool_log.push(call);

    state.cursor += 1;
    state.iteration_count += 1;
    state.next_stage = if state.cursor < state.plan.len() {
        Stage::Execute
    } else {
        Stage::Validate
    };
}

fn run_task(
    request: &SelectionRequest,
    selector: &dyn ToolSelector,
    registry: &ToolRegistry,
) -> Result<TaskRun> {
    match selector.select(request)? {
        Selection::Tool { name, input } => match registry.dispatch(&name, &input) {
            Some(output) => Ok(TaskRun::Tool { name, output }),
            None => {
                warn!(tool = %name, "unknown tool selected, using input as a direct answer");
                Ok(TaskRun::Direct(input))
            }
        },
        Selection::Direct(text) => Ok(TaskRun::Direct(text)),
    }
}

fn complete_task(state: &mut WorkflowState, index: usize, value: &str) {
    let task = &mut state.plan[index];
    task.status = TaskStatus::Completed;
    task.result = Some(value.to_string());
    task.error = None;
    state
        .results_by_id
        .insert(task.id.clone(), value.to_string());
}

fn fail_task(state: &mut WorkflowState, index: usize, message: String) {
    let task = &mut state.plan[index];
    task.status = TaskStatus::Failed;
    task.error = Some(message.clone());
    state.record_error(message);
}
