//! Session artifacts under `<log_dir>/<session_id>/`.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;

use crate::core::state::WorkflowState;

#[derive(Debug, Clone)]
pub struct SessionPaths {
    pub dir: PathBuf,
    pub state_path: PathBuf,
    pub outcome_path: PathBuf,
    pub report_path: PathBuf,
}

impl SessionPaths {
    pub fn new(log_dir: &Path, session_id: &str) -> Self {
        let dir = log_dir.join(session_id);
        Self {
            state_path: dir.join("state.json"),
            outcome_path: dir.join("outcome.json"),
            report_path: dir.join("report.md"),
            dir,
        }
    }
}

/// Write the final state, the outcome envelope, and the report for one run.
pub fn write_session<O: Serialize>(
    log_dir: &Path,
    state: &WorkflowState,
    outcome: &O,
    report: &str,
) -> Result<SessionPaths> {
    let paths = SessionPaths::new(log_dir, &state.session_id);
    fs::create_dir_all(&paths.dir)
        .with_context(|| format!("create session dir {}", paths.dir.display()))?;

    write_json(&paths.state_path, state)?;
    write_json(&paths.outcome_path, outcome)?;
    let mut buf = report.to_string();
    if !buf.ends_with('\n') {
        buf.push('\n');
    }
    write_text(&paths.report_path, &buf)?;

    Ok(paths)
}

fn write_text(path: &Path, contents: &str) -> Result<()> {
    fs::write(path, contents).with_context(|| format!("write {}", path.display()))
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let mut buf = serde_json::to_string_pretty(value)?;
    buf.push('\n');
    write_text(path, &buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};

    #[test]
    fn writes_all_artifacts_under_session_dir() {
        let temp = tempfile::tempdir().expect("tempdir");
        let mut state = WorkflowState::new("session-1", "5 + 3");
        state.record_warning("retrying");

        let paths = write_session(temp.path(), &state, &json!({"success": true}), "Goal: 5 + 3")
            .expect("write");

        assert_eq!(paths.dir, temp.path().join("session-1"));
        let saved: Value =
            serde_json::from_str(&fs::read_to_string(&paths.state_path).expect("read"))
                .expect("parse");
        assert_eq!(saved["goal"], "5 + 3");
        assert_eq!(saved["warnings"], json!(["retrying"]));
        assert_eq!(
            fs::read_to_string(&paths.report_path).expect("read"),
            "Goal: 5 + 3\n"
        );
        assert!(paths.outcome_path.exists());
    }
}
