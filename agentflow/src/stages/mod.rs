//! Stage handlers for the workflow state machine.
//!
//! Each handler borrows the run's [`WorkflowState`](crate::core::state::WorkflowState)
//! exclusively, converts its own failures into state mutations, and sets
//! `next_stage` before returning. Only planning can fail the run outright.

pub mod execute;
pub mod persist;
pub mod plan;
pub mod validate;

pub use execute::run_execute_step;
pub use persist::{run_persist, session_summary};
pub use plan::run_plan;
pub use validate::{QualityPolicy, run_validate};
