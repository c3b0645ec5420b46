//! Goal-driven plan, execute, validate, retry workflow engine.
//!
//! A goal is decomposed into dependency-ordered tasks, each task is run
//! against one tool, and a quality gate scores the result with a bounded
//! retry budget. The crate keeps a strict split:
//!
//! - **[`core`]**: Pure, deterministic logic (task model, workflow state,
//!   dependency checks, plan validation, report compilation). No I/O.
//! - **[`io`]**: Side-effecting adapters (config, child processes, decision
//!   backend, prompts, memory store, session logs).
//!
//! [`stages`] holds one handler per workflow stage and [`orchestrator`]
//! sequences them behind the single [`orchestrator::Orchestrator::run`] entry point.

pub mod agents;
pub mod core;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod orchestrator;
pub mod stages;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
pub mod tools;
