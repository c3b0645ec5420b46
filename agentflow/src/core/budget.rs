//! Retry, transition, and wall-clock budgets for one workflow run.

use std::time::{Duration, Instant};

use anyhow::{Result, anyhow};

/// Maximum number of Validate -> Execute retry cycles per run.
pub const MAX_RETRIES: u32 = 2;

/// Transitions allowed on top of the per-task allowance (plan, validate, persist).
pub const TRANSITION_SLACK: usize = 8;

/// Upper bound on stage transitions for a plan with `tasks` tasks.
///
/// Each task executes at most once per attempt and there are `MAX_RETRIES + 1`
/// attempts.
pub fn transition_limit(tasks: usize) -> usize {
    tasks
        .saturating_mul(MAX_RETRIES as usize + 1)
        .saturating_add(TRANSITION_SLACK)
}

/// Return the remaining time budget until the provided deadline.
pub fn remaining_budget(deadline: Instant) -> Result<Duration> {
    let remaining = deadline
        .checked_duration_since(Instant::now())
        .unwrap_or(Duration::from_secs(0));
    if remaining.is_zero() {
        return Err(anyhow!("run timed out"));
    }
    Ok(remaining)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transition_limit_covers_every_attempt() {
        assert_eq!(transition_limit(0), TRANSITION_SLACK);
        assert_eq!(transition_limit(4), 4 * 3 + TRANSITION_SLACK);
    }

    #[test]
    fn transition_limit_saturates() {
        assert_eq!(transition_limit(usize::MAX), usize::MAX);
    }

    #[test]
    fn expired_deadline_is_an_error() {
        let err = remaining_budget(Instant::now()).unwrap_err();
        assert!(err.to_string().contains("timed out"));
    }

    #[test]
    fn future_deadline_has_budget() {
        let budget = remaining_budget(Instant::now() + Duration::from_secs(60)).expect("budget");
        assert!(budget > Duration::from_secs(30));
    }
}
