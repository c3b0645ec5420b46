//! Scorer agent: judges executed tasks against the goal.

use anyhow::Result;
use serde_json::Value;
use tracing::{instrument, warn};

use crate::core::reply::parse_verdict;
use crate::core::types::{Task, Verdict};
use crate::io::backend::{BackendRole, parse_reply};

use super::{AgentSettings, QualityScorer};

const VERDICT_SCHEMA: &str = include_str!("../../schemas/verdict.schema.json");

/// Quality scorer backed by a decision backend.
#[derive(Clone)]
pub struct CommandScorer {
    settings: AgentSettings,
}

impl CommandScorer {
    pub fn new(settings: AgentSettings) -> Self {
        Self { settings }
    }
}

impl QualityScorer for CommandScorer {
    #[instrument(skip_all, fields(completed = completed.len(), failed = failed.len()))]
    fn score(&self, goal: &str, completed: &[&Task], failed: &[&Task]) -> Result<Verdict> {
        let prompt = self
            .settings
            .prompt_builder()
            .build_scorer(goal, completed, failed)?;
        let reply = self.settings.ask(BackendRole::Scorer, prompt)?;
        Ok(verdict_from_reply(&reply))
    }
}

/// Verdict for a scorer reply; anything that fails the schema is unparseable.
pub fn verdict_from_reply(reply: &str) -> Verdict {
    if let Err(err) = parse_reply::<Value>(VERDICT_SCHEMA, reply) {
        warn!(err = %err, "scorer reply rejected");
        return Verdict::unparseable();
    }
    parse_verdict(reply).unwrap_or_else(Verdict::unparseable)
}
