//! Persist stage: hand the session to memory and pull related context.

use chrono::Utc;
use tracing::{debug, instrument, warn};

use crate::core::state::WorkflowState;
use crate::core::types::{Role, Stage};
use crate::io::memory::{MemorySink, SessionSummary, TaskRecord};

/// Build the summary the memory sink stores for `state`.
pub fn session_summary(state: &WorkflowState, started_at: &str) -> SessionSummary {
    SessionSummary {
        session_id: state.session_id.clone(),
        goal: state.goal.clone(),
        started_at: started_at.to_string(),
        finished_at: Utc::now().to_rfc3339(),
        final_output: state.final_output.clone(),
        validation_passed: state.validation_passed,
        tasks: state
            .plan
            .iter()
            .map(|task| TaskRecord {
                id: task.id.clone(),
                description: task.description.clone(),
                status: task.status,
                result: task.result.clone(),
                error: task.error.clone(),
            })
            .collect(),
    }
}

/// Retrieve related past context, store this session, and record the exchange.
///
/// Memory failures become warnings; the stage always routes to `Done`.
#[instrument(skip_all, fields(session_id = %state.session_id))]
pub fn run_persist(
    state: &mut WorkflowState,
    memory: Option<&dyn MemorySink>,
    retrieve_k: usize,
    started_at: &str,
) {
    if let Some(memory) = memory {
        // Retrieval runs first so the current session never matches itself.
        match memory.retrieve(&state.goal, retrieve_k) {
            Ok(hits) if !hits.is_empty() => {
                debug!(hits = hits.len(), "retrieved related context");
                let context = hits
                    .iter()
                    .map(|hit| hit.text.as_str())
                    .collect::<Vec<_>>()
                    .join("\n");
                state.retrieved_context = Some(context);
            }
            Ok(_) => {}
            Err(err) => {
                warn!(error = %format!("{err:#}"), "memory retrieval failed");
                state.record_warning(format!("Memory error: {err:#}"));
            }
        }

        let summary = session_summary(state, started_at);
        if let Err(err) = memory.store(&summary) {
            warn!(error = %format!("{err:#}"), "memory store failed");
            state.record_warning(format!("Memory error: {err:#}"));
        }
    }

    let goal = state.goal.clone();
    state.record_message(Role::User, goal);
    if let Some(output) = state.final_output.clone() {
        state.record_message(Role::Assistant, output);
    }
    state.next_stage = Stage::Done;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::TaskStatus;
    use crate::io::memory::MemoryHit;
    use crate::test_support::{RecordingMemory, completed, failed, state_with_plan};

    fn finished_state() -> WorkflowState {
        let mut state = state_with_plan(
            "add numbers",
            vec![completed("task_1", &[], "8"), failed("task_2", &[], "boom")],
        );
        state.final_output = Some("report".to_string());
        state.validation_passed = true;
        state.finish(Stage::Persist);
        state
    }

    #[test]
    fn stores_summary_and_records_history() {
        let memory = RecordingMemory::new();
        let mut state = finished_state();

        run_persist(&mut state, Some(&memory), 3, "2026-01-01T00:00:00+00:00");

        let stored = memory.stored();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].goal, "add numbers");
        assert_eq!(stored[0].started_at, "2026-01-01T00:00:00+00:00");
        assert_eq!(stored[0].tasks.len(), 2);
        assert_eq!(stored[0].tasks[1].status, TaskStatus::Failed);
        assert_eq!(state.next_stage, Stage::Done);
        assert_eq!(state.history.len(), 2);
        assert_eq!(state.history[0].role, Role::User);
        assert_eq!(state.history[1].content, "report");
        assert!(state.retrieved_context.is_none());
    }

    #[test]
    fn retrieved_hits_become_context() {
        let memory = RecordingMemory::with_hits(vec![
            MemoryHit {
                text: "Goal: add more numbers (validated)".to_string(),
                score: 0.6,
            },
            MemoryHit {
                text: "Task: add -> 3".to_string(),
                score: 0.2,
            },
        ]);
        let mut state = finished_state();

        run_persist(&mut state, Some(&memory), 1, "t");

        assert_eq!(
            state.retrieved_context.as_deref(),
            Some("Goal: add more numbers (validated)")
        );
    }

    #[test]
    fn memory_failures_are_warnings() {
        let memory = RecordingMemory::broken();
        let mut state = finished_state();

        run_persist(&mut state, Some(&memory), 3, "t");

        assert_eq!(state.warnings.len(), 2);
        assert!(state.warnings.iter().all(|w| w.starts_with("Memory error:")));
        assert!(state.errors.is_empty());
        assert_eq!(state.next_stage, Stage::Done);
    }

    #[test]
    fn without_memory_only_history_is_recorded() {
        let mut state = finished_state();

        run_persist(&mut state, None, 3, "t");

        assert_eq!(state.history.len(), 2);
        assert_eq!(state.next_stage, Stage::Done);
    }
}
