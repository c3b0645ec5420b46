//! Planner agent: goal in, task list out.

use anyhow::Result;
use serde::Deserialize;
use tracing::{info, instrument};

use crate::core::error::WorkflowError;
use crate::core::types::TaskSpec;
use crate::io::backend::{BackendRole, parse_reply};
use crate::io::prompt::ToolInfo;

use super::{AgentSettings, PlanProducer};

const PLAN_OUTPUT_SCHEMA: &str = include_str!("../../schemas/plan_output.schema.json");

#[derive(Debug, Deserialize)]
struct PlanOutput {
    tasks: Vec<TaskSpec>,
}

/// Plan producer backed by a decision backend.
#[derive(Clone)]
pub struct CommandPlanner {
    settings: AgentSettings,
    tools: Vec<ToolInfo>,
}

impl CommandPlanner {
    /// `tools` is the catalog advertised in the planning prompt.
    pub fn new(settings: AgentSettings, tools: Vec<ToolInfo>) -> Self {
        Self { settings, tools }
    }
}

impl PlanProducer for CommandPlanner {
    #[instrument(skip_all)]
    fn produce_plan(&self, goal: &str) -> Result<Vec<TaskSpec>> {
        let prompt = self
            .settings
            .prompt_builder()
            .build_planner(goal, &self.tools)
            .map_err(planning_error)?;
        let reply = self
            .settings
            .ask(BackendRole::Planner, prompt)
            .map_err(planning_error)?;
        let tasks = parse_plan(&reply).map_err(planning_error)?;
        info!(tasks = tasks.len(), "planner produced tasks");
        Ok(tasks)
    }
}

/// Parse a planner reply of the shape `{"tasks": [{"id", "description", "dependencies"}]}`.
pub fn parse_plan(reply: &str) -> Result<Vec<TaskSpec>> {
    let output: PlanOutput = parse_reply(PLAN_OUTPUT_SCHEMA, reply)?;
    Ok(output.tasks)
}

fn planning_error(err: anyhow::Error) -> anyhow::Error {
    WorkflowError::planning(format!("{err:#}")).into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::testing::CapturingBackend;

    fn catalog() -> Vec<ToolInfo> {
        vec![ToolInfo {
            name: "calculator".to_string(),
            description: "Evaluate arithmetic".to_string(),
        }]
    }

    #[test]
    fn planner_sends_goal_and_catalog() {
        let backend = CapturingBackend::replying(
            r#"{"tasks": [{"id": "task_1", "description": "compute 5 + 3", "dependencies": []}]}"#,
        );
        let planner = CommandPlanner::new(AgentSettings::with_backend(backend.clone()), catalog());

        let tasks = planner.produce_plan("5 + 3").expect("plan");

        assert_eq!(tasks, vec![TaskSpec::new("task_1", "compute 5 + 3", &[])]);
        let prompt = backend.last_prompt();
        assert!(prompt.contains("### Planner Contract"));
        assert!(prompt.contains("5 + 3"));
        assert!(prompt.contains("- calculator: Evaluate arithmetic"));
        let requests = backend.requests.lock().expect("lock");
        assert_eq!(requests[0].role, BackendRole::Planner);
    }

    #[test]
    fn missing_dependencies_default_to_empty() {
        let tasks = parse_plan(
            "```json\n{\"tasks\": [{\"id\": \"a\", \"description\": \"x\"}, {\"id\": \"b\", \"description\": \"y\", \"dependencies\": [\"a\"]}]}\n```",
        )
        .expect("plan");
        assert!(tasks[0].dependencies.is_empty());
        assert_eq!(tasks[1].dependencies, vec!["a".to_string()]);
    }

    #[test]
    fn malformed_reply_is_a_planning_error() {
        let backend = CapturingBackend::replying("I could not think of a plan.");
        let planner = CommandPlanner::new(AgentSettings::with_backend(backend), catalog());

        let err = planner.produce_plan("goal").unwrap_err();
        assert!(matches!(
            err.downcast_ref::<WorkflowError>(),
            Some(WorkflowError::Planning(_))
        ));
    }

    #[test]
    fn backend_failure_is_a_planning_error() {
        let backend = CapturingBackend::failing("connection refused");
        let planner = CommandPlanner::new(AgentSettings::with_backend(backend), catalog());

        let err = planner.produce_plan("goal").unwrap_err();
        assert!(err.to_string().contains("connection refused"));
        assert!(err.downcast_ref::<WorkflowError>().is_some());
    }
}
