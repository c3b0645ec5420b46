//! Decision backend abstraction for the planner, selector, and scorer roles.
//!
//! The [`Backend`] trait decouples the agents from the process that actually
//! produces decisions (by default an external CLI reading the prompt on
//! stdin). Tests use scripted backends that return canned replies.

use std::fmt;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use jsonschema::validator_for;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use crate::core::reply::extract_json_object;
use crate::io::process::{ProcessLimits, command_from_argv, run_with_limits};

/// Which decision the backend is being asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendRole {
    Planner,
    Selector,
    Scorer,
}

impl BackendRole {
    pub fn as_str(self) -> &'static str {
        match self {
            BackendRole::Planner => "planner",
            BackendRole::Selector => "selector",
            BackendRole::Scorer => "scorer",
        }
    }
}

impl fmt::Display for BackendRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parameters for one backend invocation.
#[derive(Debug, Clone)]
pub struct BackendRequest {
    pub role: BackendRole,
    /// Prompt text fed to the backend.
    pub prompt: String,
    /// Maximum time to wait for a reply.
    pub timeout: Duration,
    /// Reply bytes kept beyond which output is discarded.
    pub output_limit_bytes: usize,
}

/// Abstraction over decision backends.
pub trait Backend: Send + Sync {
    /// Return the raw reply text for `request`.
    fn complete(&self, request: &BackendRequest) -> Result<String>;
}

/// Backend that spawns a command, writes the prompt to its stdin, and reads the reply from stdout.
#[derive(Debug, Clone)]
pub struct CommandBackend {
    command: Vec<String>,
}

impl CommandBackend {
    pub fn new(command: Vec<String>) -> Result<Self> {
        if command.is_empty() {
            return Err(anyhow!("backend command must not be empty"));
        }
        Ok(Self { command })
    }

    pub fn command(&self) -> &[String] {
        &self.command
    }
}

impl Backend for CommandBackend {
    #[instrument(skip_all, fields(role = %request.role, timeout_secs = request.timeout.as_secs()))]
    fn complete(&self, request: &BackendRequest) -> Result<String> {
        info!(program = %self.command[0], "invoking decision backend");
        let cmd = command_from_argv(&self.command)?;
        let output = run_with_limits(
            cmd,
            Some(request.prompt.clone().into_bytes()),
            ProcessLimits {
                timeout: request.timeout,
                output_limit_bytes: request.output_limit_bytes,
            },
        )
        .with_context(|| format!("run {} backend", request.role))?;

        if output.timed_out {
            warn!(timeout_secs = request.timeout.as_secs(), "backend timed out");
            return Err(anyhow!(
                "{} backend timed out after {:?}",
                request.role,
                request.timeout
            ));
        }
        if !output.status.success() {
            warn!(exit_code = ?output.status.code(), "backend failed");
            return Err(anyhow!(
                "{} backend failed: {}",
                request.role,
                output.failure_summary()
            ));
        }

        let reply = output.stdout_text();
        debug!(reply_bytes = reply.len(), "backend replied");
        Ok(reply)
    }
}

/// Extract the JSON object from `reply`, check it against `schema`, and deserialize it.
pub fn parse_reply<T: DeserializeOwned>(schema: &str, reply: &str) -> Result<T> {
    let raw = extract_json_object(reply).ok_or_else(|| anyhow!("reply contains no JSON object"))?;
    let value: Value = serde_json::from_str(raw).context("parse reply JSON")?;
    validate_schema(schema, &value)?;
    serde_json::from_value(value).context("deserialize reply")
}

fn validate_schema(schema: &str, value: &Value) -> Result<()> {
    let schema_value: Value = serde_json::from_str(schema).context("parse reply schema")?;
    let compiled = validator_for(&schema_value).map_err(|err| anyhow!("invalid schema: {}", err))?;
    if !compiled.is_valid(value) {
        let messages = compiled
            .iter_errors(value)
            .map(|err| err.to_string())
            .collect::<Vec<_>>();
        return Err(anyhow!(
            "reply schema validation failed: {}",
            messages.join("; ")
        ));
    }
    Ok(())
}
