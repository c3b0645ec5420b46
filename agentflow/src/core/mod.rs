//! Deterministic, pure logic shared by the workflow engine.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data structures and return deterministic outputs suitable for tests.

pub mod budget;
pub mod dependencies;
pub mod error;
pub mod invariants;
pub mod reply;
pub mod report;
pub mod state;
pub mod types;
