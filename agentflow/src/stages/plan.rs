//! Plan stage: obtain the task list for the goal.

use tracing::{info, instrument, warn};

use crate::agents::PlanProducer;
use crate::core::error::WorkflowError;
use crate::core::invariants::validate_plan;
use crate::core::state::WorkflowState;
use crate::core::types::{Stage, Task};

/// Ask the producer for a plan and install it in `state`.
///
/// On success routes to `Execute`. A producer failure, an empty plan, or a
/// plan with structural errors records the error, ends the run (`Done`), and
/// returns it.
#[instrument(skip_all, fields(session_id = %state.session_id))]
pub fn run_plan(state: &mut WorkflowState, producer: &dyn PlanProducer) -> Result<(), WorkflowError> {
    let specs = match producer.produce_plan(&state.goal) {
        Ok(specs) => specs,
        Err(err) => {
            let error = match err.downcast::<WorkflowError>() {
                Ok(error @ WorkflowError::Planning(_)) => error,
                Ok(other) => WorkflowError::planning(other.to_string()),
                Err(err) => WorkflowError::planning(format!("{err:#}")),
            };
            return Err(fail(state, error));
        }
    };

    if specs.is_empty() {
        return Err(fail(state, WorkflowError::planning("producer returned no tasks")));
    }

    let report = validate_plan(&specs);
    if !report.errors.is_empty() {
        return Err(fail(
            state,
            WorkflowError::planning(format!("unusable plan: {}", report.errors.join("; "))),
        ));
    }
    for warning in report.warnings {
        warn!(%warning, "plan defect");
        state.record_warning(format!("Plan warning: {warning}"));
    }

    info!(tasks = specs.len(), "plan accepted");
    state.plan = specs.into_iter().map(Task::from).collect();
    state.cursor = 0;
    state.next_stage = Stage::Execute;
    Ok(())
}

fn fail(state: &mut WorkflowState, error: WorkflowError) -> WorkflowError {
    warn!(%error, "planning failed");
    state.record_error(error.to_string());
    state.finish(Stage::Done);
    error
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{TaskSpec, TaskStatus};
    use crate::test_support::ScriptedPlanner;

    #[test]
    fn accepted_plan_routes_to_execute() {
        let producer = ScriptedPlanner::returning(vec![
            TaskSpec::new("task_1", "compute 5 + 3", &[]),
            TaskSpec::new("task_2", "double it", &["task_1"]),
        ]);
        let mut state = WorkflowState::new("s", "goal");

        run_plan(&mut state, &producer).expect("plan");

        assert_eq!(state.next_stage, Stage::Execute);
        assert!(!state.done);
        assert_eq!(state.plan.len(), 2);
        assert!(state.plan.iter().all(|t| t.status == TaskStatus::Pending));
        assert_eq!(state.iteration_count, 0);
    }

    #[test]
    fn empty_plan_ends_run() {
        let producer = ScriptedPlanner::returning(Vec::new());
        let mut state = WorkflowState::new("s", "goal");

        let err = run_plan(&mut state, &producer).unwrap_err();

        assert!(matches!(err, WorkflowError::Planning(_)));
        assert!(state.done);
        assert_eq!(state.next_stage, Stage::Done);
        assert_eq!(state.errors.len(), 1);
        assert!(state.errors[0].starts_with("Planning error:"));
    }

    #[test]
    fn producer_failure_ends_run() {
        let producer = ScriptedPlanner::failing("backend unreachable");
        let mut state = WorkflowState::new("s", "goal");

        let err = run_plan(&mut state, &producer).unwrap_err();

        assert_eq!(err, WorkflowError::planning("backend unreachable"));
        assert_eq!(state.next_stage, Stage::Done);
        assert!(state.plan.is_empty());
    }

    #[test]
    fn duplicate_ids_are_unusable() {
        let producer = ScriptedPlanner::returning(vec![
            TaskSpec::new("a", "one", &[]),
            TaskSpec::new("a", "two", &[]),
        ]);
        let mut state = WorkflowState::new("s", "goal");

        let err = run_plan(&mut state, &producer).unwrap_err();
        assert!(err.to_string().contains("duplicate task id 'a'"));
    }

    #[test]
    fn dangling_and_cyclic_dependencies_only_warn() {
        let producer = ScriptedPlanner::returning(vec![
            TaskSpec::new("a", "one", &["b"]),
            TaskSpec::new("b", "two", &["a"]),
            TaskSpec::new("c", "three", &["ghost"]),
        ]);
        let mut state = WorkflowState::new("s", "goal");

        run_plan(&mut state, &producer).expect("plan");

        assert_eq!(state.next_stage, Stage::Execute);
        assert_eq!(state.warnings.len(), 2);
        assert!(state.warnings.iter().any(|w| w.contains("unknown task 'ghost'")));
        assert!(state.warnings.iter().any(|w| w.contains("dependency cycle")));
    }
}
