//! Engine configuration stored under `.agentflow/config.toml`.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::io::backend::BackendRole;

/// Config location used when `--config` is not given.
pub const DEFAULT_CONFIG_PATH: &str = ".agentflow/config.toml";

/// Engine configuration (TOML).
///
/// Every table is optional; missing fields fall back to the defaults below.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    pub workflow: WorkflowConfig,
    pub agents: AgentsConfig,
    pub tools: ToolsConfig,
    pub memory: MemoryConfig,
    pub session: SessionConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct WorkflowConfig {
    /// Verdict score needed to pass validation, in `[0, 1]`.
    pub quality_threshold: f64,
    /// Single low-risk tool whose exclusive use skips scoring. Empty disables the fast path.
    pub auto_validate_tool: String,
    /// Wall-clock budget for one run, checked between stage transitions.
    pub run_timeout_secs: u64,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            quality_threshold: 0.8,
            auto_validate_tool: "calculator".to_string(),
            run_timeout_secs: 15 * 60,
        }
    }
}

impl WorkflowConfig {
    pub fn fast_path_tool(&self) -> Option<&str> {
        let tool = self.auto_validate_tool.trim();
        (!tool.is_empty()).then_some(tool)
    }

    pub fn run_timeout(&self) -> Duration {
        Duration::from_secs(self.run_timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AgentsConfig {
    /// Backend command; receives the prompt on stdin and replies on stdout.
    pub command: Vec<String>,
    pub timeout_secs: u64,
    pub output_limit_bytes: usize,
    pub prompt_budget_bytes: usize,
    pub planner: RoleConfig,
    pub selector: RoleConfig,
    pub scorer: RoleConfig,
}

impl Default for AgentsConfig {
    fn default() -> Self {
        Self {
            command: ["codex", "exec", "--skip-git-repo-check", "-"]
                .map(str::to_string)
                .to_vec(),
            timeout_secs: 300,
            output_limit_bytes: 200_000,
            prompt_budget_bytes: 40_000,
            planner: RoleConfig::default(),
            selector: RoleConfig::default(),
            scorer: RoleConfig::default(),
        }
    }
}

impl AgentsConfig {
    pub fn role(&self, role: BackendRole) -> &RoleConfig {
        match role {
            BackendRole::Planner => &self.planner,
            BackendRole::Selector => &self.selector,
            BackendRole::Scorer => &self.scorer,
        }
    }

    /// Command for `role`, falling back to the shared command.
    pub fn command_for(&self, role: BackendRole) -> &[String] {
        self.role(role)
            .command
            .as_deref()
            .unwrap_or(self.command.as_slice())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Per-role overrides.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RoleConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ToolsConfig {
    pub file_reader: FileReaderConfig,
    pub code_runner: CodeRunnerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct FileReaderConfig {
    pub max_bytes: u64,
    /// Lowercase extensions without the leading dot.
    pub allowed_extensions: Vec<String>,
}

impl Default for FileReaderConfig {
    fn default() -> Self {
        Self {
            max_bytes: 10 * 1024 * 1024,
            allowed_extensions: ["txt", "md", "csv", "json", "toml", "log"]
                .map(str::to_string)
                .to_vec(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CodeRunnerConfig {
    /// Interpreter command; the snippet is written to its stdin.
    pub command: Vec<String>,
    pub timeout_secs: u64,
    pub output_limit_bytes: usize,
}

impl Default for CodeRunnerConfig {
    fn default() -> Self {
        Self {
            command: vec!["python3".to_string(), "-".to_string()],
            timeout_secs: 30,
            output_limit_bytes: 100_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MemoryConfig {
    pub enabled: bool,
    pub path: PathBuf,
    /// Related entries pulled into the state after a run.
    pub retrieve_k: usize,
    /// Hits scoring below this are dropped.
    pub min_score: f64,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: PathBuf::from(".agentflow/memory.json"),
            retrieve_k: 3,
            min_score: 0.05,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SessionConfig {
    /// Directory for per-session artifacts. Unset skips writing them.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_dir: Option<PathBuf>,
}

impl EngineConfig {
    pub fn validate(&self) -> Result<()> {
        let threshold = self.workflow.quality_threshold;
        if !(0.0..=1.0).contains(&threshold) {
            return Err(anyhow!(
                "workflow.quality_threshold must be within [0, 1], got {threshold}"
            ));
        }
        if self.workflow.run_timeout_secs == 0 {
            return Err(anyhow!("workflow.run_timeout_secs must be > 0"));
        }
        validate_command("agents.command", &self.agents.command)?;
        for role in [BackendRole::Planner, BackendRole::Selector, BackendRole::Scorer] {
            if let Some(command) = &self.agents.role(role).command {
                validate_command(&format!("agents.{role}.command"), command)?;
            }
        }
        if self.agents.timeout_secs == 0 {
            return Err(anyhow!("agents.timeout_secs must be > 0"));
        }
        if self.agents.output_limit_bytes == 0 {
            return Err(anyhow!("agents.output_limit_bytes must be > 0"));
        }
        if self.agents.prompt_budget_bytes == 0 {
            return Err(anyhow!("agents.prompt_budget_bytes must be > 0"));
        }
        if self.tools.file_reader.max_bytes == 0 {
            return Err(anyhow!("tools.file_reader.max_bytes must be > 0"));
        }
        validate_command("tools.code_runner.command", &self.tools.code_runner.command)?;
        if self.tools.code_runner.timeout_secs == 0 {
            return Err(anyhow!("tools.code_runner.timeout_secs must be > 0"));
        }
        if self.tools.code_runner.output_limit_bytes == 0 {
            return Err(anyhow!("tools.code_runner.output_limit_bytes must be > 0"));
        }
        if self.memory.enabled && self.memory.path.as_os_str().is_empty() {
            return Err(anyhow!("memory.path must be set when memory is enabled"));
        }
        if !(0.0..=1.0).contains(&self.memory.min_score) {
            return Err(anyhow!("memory.min_score must be within [0, 1]"));
        }
        Ok(())
    }
}

fn validate_command(field: &str, command: &[String]) -> Result<()> {
    match command.first() {
        Some(program) if !program.trim().is_empty() => Ok(()),
        _ => Err(anyhow!("{field} must be a non-empty array")),
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `EngineConfig::default()`.
pub fn load_config(path: &Path) -> Result<EngineConfig> {
    if !path.exists() {
        let cfg = EngineConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: EngineConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("invalid config {}", path.display()))?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &EngineConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, buf.as_bytes())
}

/// Write `contents` next to `path` and rename it into place.
pub fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let parent = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let mut tmp_name = path
        .file_name()
        .with_context(|| format!("path missing file name {}", path.display()))?
        .to_os_string();
    tmp_name.push(".tmp");
    let tmp_path = parent.join(tmp_name);
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp file {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace {}", path.display()))?;
    Ok(())
}
