//! Capability contract, registry, and the built-in tools.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::debug;

use crate::io::config::ToolsConfig;
use crate::io::memory::MemorySink;
use crate::io::prompt::ToolInfo;

pub mod calculator;
pub mod code_runner;
pub mod file_reader;
pub mod memory_search;

pub use calculator::Calculator;
pub use code_runner::CodeRunner;
pub use file_reader::FileReader;
pub use memory_search::MemorySearch;

/// Uniform result of a tool invocation. Failures are data, never panics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToolOutput {
    pub success: bool,
    pub value: Option<String>,
    pub error: Option<String>,
    /// Machine-readable failure category, e.g. `SyntaxError`.
    pub error_kind: Option<String>,
}

impl ToolOutput {
    pub fn ok(value: impl Into<String>) -> Self {
        Self {
            success: true,
            value: Some(value.into()),
            error: None,
            error_kind: None,
        }
    }

    pub fn failure(kind: &str, message: impl Into<String>) -> Self {
        Self {
            success: false,
            value: None,
            error: Some(message.into()),
            error_kind: Some(kind.to_string()),
        }
    }

    /// Error text prefixed with its kind, e.g. `MathError: Division by zero`.
    pub fn describe_error(&self) -> String {
        let message = self.error.as_deref().unwrap_or("unknown error");
        match &self.error_kind {
            Some(kind) => format!("{kind}: {message}"),
            None => message.to_string(),
        }
    }
}

/// A named capability the execution stage can invoke.
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    fn execute(&self, input: &str) -> ToolOutput;
}

/// Name-keyed tool lookup shared read-only across sessions.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: BTreeMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The four built-in tools wired to `config` and, when given, the memory sink.
    pub fn builtin(config: &ToolsConfig, memory: Option<Arc<dyn MemorySink>>) -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(Calculator));
        registry.register(Arc::new(FileReader::new(
            config.file_reader.max_bytes,
            config.file_reader.allowed_extensions.clone(),
        )));
        registry.register(Arc::new(CodeRunner::new(
            config.code_runner.command.clone(),
            Duration::from_secs(config.code_runner.timeout_secs),
            config.code_runner.output_limit_bytes,
        )));
        if let Some(memory) = memory {
            registry.register(Arc::new(MemorySearch::new(memory)));
        }
        registry
    }

    /// Add `tool`, replacing any tool already registered under its name.
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.name().to_string();
        if self.tools.insert(name.clone(), tool).is_some() {
            debug!(tool = %name, "replaced registered tool");
        }
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Run the tool registered under exactly `name`; `None` if there is none.
    pub fn dispatch(&self, name: &str, input: &str) -> Option<ToolOutput> {
        let tool = self.tools.get(name)?;
        Some(tool.execute(input))
    }

    /// Names and descriptions in name order.
    pub fn catalog(&self) -> Vec<ToolInfo> {
        self.tools
            .values()
            .map(|tool| ToolInfo {
                name: tool.name().to_string(),
                description: tool.description().to_string(),
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}
