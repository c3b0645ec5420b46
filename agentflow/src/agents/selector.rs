//! Selector agent: picks a tool and its input for one task.

use anyhow::{Result, anyhow};
use serde::Deserialize;
use tracing::{debug, instrument};

use crate::core::reply::extract_json_object;
use crate::io::backend::{BackendRole, parse_reply};

use super::{AgentSettings, Selection, SelectionRequest, ToolSelector};

const SELECTION_SCHEMA: &str = include_str!("../../schemas/selection.schema.json");

#[derive(Debug, Deserialize)]
struct RawSelection {
    tool: Option<String>,
    input: Option<String>,
    answer: Option<String>,
}

/// Tool selector backed by a decision backend.
#[derive(Clone)]
pub struct CommandSelector {
    settings: AgentSettings,
}

impl CommandSelector {
    pub fn new(settings: AgentSettings) -> Self {
        Self { settings }
    }
}

impl ToolSelector for CommandSelector {
    #[instrument(skip_all, fields(task_id = %request.context.task_id))]
    fn select(&self, request: &SelectionRequest) -> Result<Selection> {
        let prompt = self.settings.prompt_builder().build_selector(
            &request.goal,
            &request.context,
            &request.tools,
        )?;
        let reply = self.settings.ask(BackendRole::Selector, prompt)?;
        let selection = parse_selection(&reply)?;
        debug!(?selection, "selector decided");
        Ok(selection)
    }
}

/// Parse `{"tool": ..., "input": ...}` or `{"answer": ...}`.
///
/// A reply with no JSON object at all is taken as a direct answer.
pub fn parse_selection(reply: &str) -> Result<Selection> {
    if extract_json_object(reply).is_none() {
        let text = reply.trim();
        if text.is_empty() {
            return Err(anyhow!("selector reply is empty"));
        }
        return Ok(Selection::Direct(text.to_string()));
    }
    let raw: RawSelection = parse_reply(SELECTION_SCHEMA, reply)?;
    match (raw.tool, raw.input, raw.answer) {
        (Some(name), Some(input), _) => Ok(Selection::Tool {
            name: name.trim().to_string(),
            input,
        }),
        (None, _, Some(answer)) => Ok(Selection::Direct(answer)),
        _ => Err(anyhow!("selector reply names neither a tool nor an answer")),
    }
}
