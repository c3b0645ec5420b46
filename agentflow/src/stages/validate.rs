//! Validate stage: the quality gate and the retry decision.

use tracing::{info, instrument, warn};

use crate::agents::QualityScorer;
use crate::core::budget::MAX_RETRIES;
use crate::core::error::WorkflowError;
use crate::core::report::compile_final_output;
use crate::core::state::WorkflowState;
use crate::core::types::{Stage, TaskStatus, Verdict};

/// Pass threshold and fast-path rule for the quality gate.
#[derive(Debug, Clone, PartialEq)]
pub struct QualityPolicy {
    pub threshold: f64,
    /// Tool whose exclusive, error-free use skips scoring. `None` disables the fast path.
    pub auto_validate_tool: Option<String>,
}

impl Default for QualityPolicy {
    fn default() -> Self {
        Self {
            threshold: 0.8,
            auto_validate_tool: Some("calculator".to_string()),
        }
    }
}

impl QualityPolicy {
    /// True when the run qualifies for auto-validation.
    pub fn fast_path_applies(&self, state: &WorkflowState) -> bool {
        let Some(tool) = self.auto_validate_tool.as_deref() else {
            return false;
        };
        !state.tool_log.is_empty()
            && state
                .tool_log
                .iter()
                .all(|call| call.tool.as_deref() == Some(tool))
            && state.errors.is_empty()
            && state.all_completed()
    }
}

/// Evaluate the executed plan and route to `Persist`, `Execute` (retry), or `Done`.
#[instrument(skip_all, fields(session_id = %state.session_id, retry_count = state.retry_count))]
pub fn run_validate(state: &mut WorkflowState, scorer: &dyn QualityScorer, policy: &QualityPolicy) {
    if policy.fast_path_applies(state) {
        info!("auto-validated");
        accept(state, Verdict::auto_validated());
        return;
    }

    let completed = state.tasks_with_status(TaskStatus::Completed);
    let failed = state.tasks_with_status(TaskStatus::Failed);
    if completed.is_empty() && failed.is_empty() {
        warn!("nothing to validate");
        state.quality_verdict = Some(Verdict::new(
            false,
            0.0,
            "no completed or failed tasks to validate",
        ));
        state.validation_passed = false;
        state.finish(Stage::Done);
        return;
    }

    let verdict = match scorer.score(&state.goal, &completed, &failed) {
        Ok(verdict) => verdict,
        Err(err) => {
            let error = WorkflowError::Scoring(format!("{err:#}"));
            warn!(%error, "scorer failed");
            state.record_warning(error.to_string());
            Verdict::unparseable()
        }
    };
    info!(passed = verdict.passed, score = verdict.score, "verdict");

    if verdict.passed && verdict.score >= policy.threshold {
        accept(state, verdict);
        return;
    }

    state.validation_passed = false;
    if state.retry_count < MAX_RETRIES {
        state.retry_count += 1;
        state.record_warning(format!(
            "Validation failed (retry {}/{MAX_RETRIES}): {}",
            state.retry_count, verdict.feedback
        ));
        state.quality_verdict = Some(verdict);
        reset_failed_tasks(state);
        state.cursor = 0;
        state.next_stage = Stage::Execute;
        return;
    }

    let error = WorkflowError::RetryBudgetExceeded {
        retries: state.retry_count,
        feedback: verdict.feedback.clone(),
    };
    warn!(%error, "retry budget exhausted");
    state.record_error(error.to_string());
    state.quality_verdict = Some(verdict);
    state.final_output = Some(compile_final_output(state));
    state.finish(Stage::Persist);
}

fn accept(state: &mut WorkflowState, verdict: Verdict) {
    state.quality_verdict = Some(verdict);
    state.validation_passed = true;
    state.final_output = Some(compile_final_output(state));
    state.finish(Stage::Persist);
}

/// Failed tasks go back to pending; completed tasks keep their results.
fn reset_failed_tasks(state: &mut WorkflowState) {
    for task in state
        .plan
        .iter_mut()
        .filter(|task| task.status == TaskStatus::Failed)
    {
        task.status = TaskStatus::Pending;
        task.error = None;
    }
}
