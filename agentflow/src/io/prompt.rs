//! Prompt builder for the planner, selector, and scorer roles.

use std::sync::LazyLock;

use anyhow::{Context, Result};
use minijinja::{Environment, context};
use regex::Regex;
use serde::Serialize;
use tracing::debug;

use crate::core::dependencies::ExecutionContext;
use crate::core::types::Task;

const PLANNER_TEMPLATE: &str = include_str!("prompts/planner.md");
const SELECTOR_TEMPLATE: &str = include_str!("prompts/selector.md");
const SCORER_TEMPLATE: &str = include_str!("prompts/scorer.md");

/// Per-task text longer than this is cut before it reaches the scorer prompt.
const SCORER_DETAIL_LIMIT: usize = 500;

/// Tool name and description as advertised to the decision backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToolInfo {
    pub name: String,
    pub description: String,
}

#[derive(Debug, Clone, Serialize)]
struct TaskView {
    id: String,
    description: String,
    detail: String,
}

impl TaskView {
    fn completed(task: &Task) -> Self {
        Self {
            id: task.id.clone(),
            description: task.description.clone(),
            detail: truncate_chars(task.result.as_deref().unwrap_or(""), SCORER_DETAIL_LIMIT),
        }
    }

    fn failed(task: &Task) -> Self {
        Self {
            id: task.id.clone(),
            description: task.description.clone(),
            detail: truncate_chars(task.error.as_deref().unwrap_or(""), SCORER_DETAIL_LIMIT),
        }
    }
}

/// Template engine wrapper around minijinja.
struct PromptEngine {
    env: Environment<'static>,
}

impl PromptEngine {
    fn new() -> Result<Self> {
        let mut env = Environment::new();
        env.add_template("planner", PLANNER_TEMPLATE)
            .context("load planner template")?;
        env.add_template("selector", SELECTOR_TEMPLATE)
            .context("load selector template")?;
        env.add_template("scorer", SCORER_TEMPLATE)
            .context("load scorer template")?;
        Ok(Self { env })
    }

    fn render(&self, name: &str, ctx: minijinja::Value) -> Result<String> {
        let template = self.env.get_template(name)?;
        template
            .render(ctx)
            .with_context(|| format!("render {name} template"))
    }
}

/// A parsed section from rendered template output.
#[derive(Debug, Clone)]
struct ParsedSection {
    key: String,
    required: bool,
    content: String,
}

/// Parse sections from rendered template output using HTML comment markers.
///
/// Markers follow format: `<!-- section:KEY required|droppable -->`
fn parse_sections(rendered: &str) -> Vec<ParsedSection> {
    static SECTION_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"<!--\s*section:(\w+)\s+(required|droppable)\s*-->")
            .expect("section marker regex is valid")
    });

    let markers: Vec<(usize, usize, String, bool)> = SECTION_RE
        .captures_iter(rendered)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let key = caps.get(1)?.as_str().to_string();
            let required = caps.get(2)?.as_str() == "required";
            Some((whole.start(), whole.end(), key, required))
        })
        .collect();

    let mut sections = Vec::new();
    for (i, (_, content_start, key, required)) in markers.iter().enumerate() {
        let end = markers
            .get(i + 1)
            .map(|next| next.0)
            .unwrap_or(rendered.len());
        let content = rendered[*content_start..end].trim().to_string();
        if !content.is_empty() || *required {
            sections.push(ParsedSection {
                key: key.clone(),
                required: *required,
                content,
            });
        }
    }
    sections
}

/// Apply budget to parsed sections, dropping droppable sections as needed.
///
/// Drop order: system -> overall. If still over budget, the last section is
/// truncated.
fn apply_budget_to_sections(sections: &mut Vec<ParsedSection>, budget: usize) {
    let total_len =
        |secs: &[ParsedSection]| -> usize { secs.iter().map(|s| s.content.len()).sum() };

    for key in ["system", "overall"] {
        if total_len(sections) <= budget {
            return;
        }
        if let Some(idx) = sections.iter().position(|s| s.key == key && !s.required) {
            debug!(
                section = key,
                bytes_dropped = sections[idx].content.len(),
                "dropped section for budget"
            );
            sections.remove(idx);
        }
    }

    if total_len(sections) <= budget {
        return;
    }
    let other_len: usize = sections
        .iter()
        .take(sections.len().saturating_sub(1))
        .map(|s| s.content.len())
        .sum();
    let allowed = budget.saturating_sub(other_len);
    if let Some(last) = sections.last_mut() {
        let before_len = last.content.len();
        if allowed > 12 {
            last.content = truncate_bytes(&last.content, allowed - 12);
            last.content.push_str("\n[truncated]");
        } else {
            last.content = truncate_bytes(&last.content, allowed);
        }
        debug!(
            section = %last.key,
            before_len,
            after_len = last.content.len(),
            "truncated section for budget"
        );
    }
}

fn render_sections(sections: &[ParsedSection]) -> String {
    sections
        .iter()
        .map(|s| s.content.as_str())
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Cut `text` to at most `max_bytes`, backing off to a char boundary.
fn truncate_bytes(text: &str, max_bytes: usize) -> String {
    if text.len() <= max_bytes {
        return text.to_string();
    }
    let mut end = max_bytes;
    while end > 0 && !text.is_char_boundary(end) {
        end -= 1;
    }
    text[..end].to_string()
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

/// Builds role prompts within a byte budget, dropping less critical sections first.
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    budget_bytes: usize,
    system_prompt: Option<String>,
}

impl PromptBuilder {
    pub fn new(budget_bytes: usize) -> Self {
        Self {
            budget_bytes,
            system_prompt: None,
        }
    }

    /// Attach role instructions rendered as a droppable section.
    pub fn with_system_prompt(mut self, system_prompt: Option<&str>) -> Self {
        self.system_prompt = system_prompt
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string);
        self
    }

    pub fn build_planner(&self, goal: &str, tools: &[ToolInfo]) -> Result<String> {
        let rendered = PromptEngine::new()?.render(
            "planner",
            context! {
                system_prompt => self.system_prompt,
                goal => goal.trim(),
                tools => tools,
            },
        )?;
        Ok(self.finish(&rendered))
    }

    pub fn build_selector(
        &self,
        goal: &str,
        task: &ExecutionContext,
        tools: &[ToolInfo],
    ) -> Result<String> {
        let rendered = PromptEngine::new()?.render(
            "selector",
            context! {
                system_prompt => self.system_prompt,
                goal => goal.trim(),
                task_id => task.task_id,
                description => task.description.trim(),
                tools => tools,
                previous_results => task.render_previous_results(),
            },
        )?;
        Ok(self.finish(&rendered))
    }

    pub fn build_scorer(&self, goal: &str, completed: &[&Task], failed: &[&Task]) -> Result<String> {
        let completed: Vec<TaskView> = completed.iter().map(|t| TaskView::completed(t)).collect();
        let failed: Vec<TaskView> = failed.iter().map(|t| TaskView::failed(t)).collect();
        let rendered = PromptEngine::new()?.render(
            "scorer",
            context! {
                system_prompt => self.system_prompt,
                goal => goal.trim(),
                completed => completed,
                failed => failed,
            },
        )?;
        Ok(self.finish(&rendered))
    }

    fn finish(&self, rendered: &str) -> String {
        let mut sections = parse_sections(rendered);
        apply_budget_to_sections(&mut sections, self.budget_bytes);
        render_sections(&sections)
    }
}
