//! Side-effecting adapters: config, child processes, decision backends,
//! prompts, memory, and session artifacts.

pub mod backend;
pub mod config;
pub mod memory;
pub mod process;
pub mod prompt;
pub mod session_log;
