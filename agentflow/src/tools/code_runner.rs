//! Runs a code snippet through an interpreter command.
//!
//! The keyword screen is a coarse filter, not a sandbox.

use std::time::Duration;

use tracing::{info, warn};

use super::{Tool, ToolOutput};
use crate::io::process::{ProcessLimits, command_from_argv, run_with_limits};

const BLOCKED_KEYWORDS: &[&str] = &[
    "import os",
    "import subprocess",
    "__import__",
    "open(",
    "eval(",
    "exec(",
];

#[derive(Debug, Clone)]
pub struct CodeRunner {
    command: Vec<String>,
    limits: ProcessLimits,
}

impl CodeRunner {
    pub fn new(command: Vec<String>, timeout: Duration, output_limit_bytes: usize) -> Self {
        Self {
            command,
            limits: ProcessLimits {
                timeout,
                output_limit_bytes,
            },
        }
    }
}

impl Tool for CodeRunner {
    fn name(&self) -> &str {
        "code_runner"
    }

    fn description(&self) -> &str {
        "Run a short Python snippet and return what it prints. File, OS, and dynamic-evaluation calls are rejected."
    }

    fn execute(&self, input: &str) -> ToolOutput {
        let code = input.trim();
        let lowered = code.to_lowercase();
        if let Some(keyword) = BLOCKED_KEYWORDS.iter().copied().find(|k| lowered.contains(k)) {
            warn!(keyword, "rejected snippet");
            return ToolOutput::failure(
                "SecurityError",
                format!("Operation not allowed: {keyword}"),
            );
        }

        info!(code_bytes = code.len(), "running snippet");
        let cmd = match command_from_argv(&self.command) {
            Ok(cmd) => cmd,
            Err(e) => return ToolOutput::failure("SpawnError", format!("{e:#}")),
        };
        let output = match run_with_limits(cmd, Some(code.as_bytes().to_vec()), self.limits) {
            Ok(output) => output,
            Err(e) => return ToolOutput::failure("SpawnError", format!("{e:#}")),
        };

        if output.timed_out {
            return ToolOutput::failure(
                "Timeout",
                format!(
                    "Code execution timed out after {}s",
                    self.limits.timeout.as_secs_f64()
                ),
            );
        }
        if !output.status.success() {
            return ToolOutput::failure(
                "RuntimeError",
                format!("Execution error: {}", output.failure_summary()),
            );
        }
        let stdout = output.stdout_text();
        let stdout = stdout.trim_end();
        if stdout.is_empty() {
            ToolOutput::ok("Code executed successfully (no output)")
        } else {
            ToolOutput::ok(stdout)
        }
    }
}
