//! Stable exit codes for agentflow CLI commands.

/// Command succeeded; for `run`, the output passed validation.
pub const OK: i32 = 0;
/// Invalid config, bad arguments, or another internal error.
pub const INVALID: i32 = 1;
/// `run` compiled an output but validation did not pass.
pub const VALIDATION_FAILED: i32 = 2;
/// `run` could not plan, was cancelled, or hit a run guard.
pub const PLAN_FAILED: i32 = 3;
