//! Scripted collaborators and fixtures for workflow tests.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::{Result, anyhow};

use crate::agents::{PlanProducer, QualityScorer, Selection, SelectionRequest, ToolSelector};
use crate::core::error::WorkflowError;
use crate::core::state::WorkflowState;
use crate::core::types::{Task, TaskSpec, TaskStatus, Verdict};
use crate::io::memory::{MemoryHit, MemorySink, SessionSummary};
use crate::tools::{Tool, ToolOutput};

/// Create a task with an explicit status and a `<id> description` text.
pub fn task(id: &str, deps: &[&str], status: TaskStatus) -> Task {
    let mut task = Task::from(TaskSpec::new(id, &format!("{id} description"), deps));
    task.status = status;
    task
}

/// Create a completed task carrying `result`.
pub fn completed(id: &str, deps: &[&str], result: &str) -> Task {
    let mut task = task(id, deps, TaskStatus::Completed);
    task.result = Some(result.to_string());
    task
}

/// Create a failed task carrying `error`.
pub fn failed(id: &str, deps: &[&str], error: &str) -> Task {
    let mut task = task(id, deps, TaskStatus::Failed);
    task.error = Some(error.to_string());
    task
}

/// State positioned at the start of execution for `plan`.
pub fn state_with_plan(goal: &str, plan: Vec<Task>) -> WorkflowState {
    let mut state = WorkflowState::new("session-test", goal);
    state.plan = plan;
    state.next_stage = crate::core::types::Stage::Execute;
    state
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Plan producer returning a fixed plan or a planning error.
pub struct ScriptedPlanner {
    reply: Result<Vec<TaskSpec>, String>,
    calls: AtomicUsize,
}

impl ScriptedPlanner {
    pub fn returning(specs: Vec<TaskSpec>) -> Self {
        Self {
            reply: Ok(specs),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            reply: Err(message.to_string()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl PlanProducer for ScriptedPlanner {
    fn produce_plan(&self, _goal: &str) -> Result<Vec<TaskSpec>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.reply {
            Ok(specs) => Ok(specs.clone()),
            Err(message) => Err(WorkflowError::planning(message.clone()).into()),
        }
    }
}

/// Selector answering from a per-task script and capturing every request.
#[derive(Default)]
pub struct ScriptedSelector {
    script: HashMap<String, Result<Selection, String>>,
    requests: Mutex<Vec<SelectionRequest>>,
}

impl ScriptedSelector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Select `tool` with `input` for `task_id`.
    pub fn tool(mut self, task_id: &str, tool: &str, input: &str) -> Self {
        self.script.insert(
            task_id.to_string(),
            Ok(Selection::Tool {
                name: tool.to_string(),
                input: input.to_string(),
            }),
        );
        self
    }

    /// Answer `task_id` directly with `text`.
    pub fn direct(mut self, task_id: &str, text: &str) -> Self {
        self.script
            .insert(task_id.to_string(), Ok(Selection::Direct(text.to_string())));
        self
    }

    /// Fail selection for `task_id` with `message`.
    pub fn error(mut self, task_id: &str, message: &str) -> Self {
        self.script
            .insert(task_id.to_string(), Err(message.to_string()));
        self
    }

    pub fn requests(&self) -> Vec<SelectionRequest> {
        lock(&self.requests).clone()
    }

    /// Task ids in the order they were presented.
    pub fn selected_ids(&self) -> Vec<String> {
        lock(&self.requests)
            .iter()
            .map(|r| r.context.task_id.clone())
            .collect()
    }
}

impl ToolSelector for ScriptedSelector {
    fn select(&self, request: &SelectionRequest) -> Result<Selection> {
        lock(&self.requests).push(request.clone());
        match self.script.get(&request.context.task_id) {
            Some(Ok(selection)) => Ok(selection.clone()),
            Some(Err(message)) => Err(anyhow!(message.clone())),
            None => Err(anyhow!(
                "no scripted selection for {}",
                request.context.task_id
            )),
        }
    }
}

/// Scorer replaying queued verdicts, then repeating a fallback.
pub struct ScriptedScorer {
    queue: Mutex<VecDeque<Result<Verdict, String>>>,
    fallback: Result<Verdict, String>,
    calls: AtomicUsize,
}

impl ScriptedScorer {
    pub fn always(verdict: Verdict) -> Self {
        Self::sequence(Vec::new(), Ok(verdict))
    }

    pub fn failing(message: &str) -> Self {
        Self::sequence(Vec::new(), Err(message.to_string()))
    }

    pub fn sequence(queue: Vec<Result<Verdict, String>>, fallback: Result<Verdict, String>) -> Self {
        Self {
            queue: Mutex::new(queue.into()),
            fallback,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl QualityScorer for ScriptedScorer {
    fn score(&self, _goal: &str, _completed: &[&Task], _failed: &[&Task]) -> Result<Verdict> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let next = lock(&self.queue)
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone());
        next.map_err(|message| anyhow!(message))
    }
}

/// Tool with a fixed name that records its inputs.
pub struct ScriptedTool {
    name: String,
    output: Option<ToolOutput>,
    inputs: Mutex<Vec<String>>,
}

impl ScriptedTool {
    /// Succeeds with its input as the value.
    pub fn echo(name: &str) -> Self {
        Self {
            name: name.to_string(),
            output: None,
            inputs: Mutex::new(Vec::new()),
        }
    }

    /// Always fails with `kind` and `message`.
    pub fn failing(name: &str, kind: &str, message: &str) -> Self {
        Self {
            name: name.to_string(),
            output: Some(ToolOutput::failure(kind, message)),
            inputs: Mutex::new(Vec::new()),
        }
    }

    pub fn inputs(&self) -> Vec<String> {
        lock(&self.inputs).clone()
    }
}

impl Tool for ScriptedTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        "scripted test tool"
    }

    fn execute(&self, input: &str) -> ToolOutput {
        lock(&self.inputs).push(input.to_string());
        self.output
            .clone()
            .unwrap_or_else(|| ToolOutput::ok(input))
    }
}

/// Memory sink that keeps summaries in memory and returns fixed hits.
#[derive(Default)]
pub struct RecordingMemory {
    stored: Mutex<Vec<SessionSummary>>,
    hits: Vec<MemoryHit>,
    fail: bool,
}

impl RecordingMemory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_hits(hits: Vec<MemoryHit>) -> Self {
        Self {
            hits,
            ..Self::default()
        }
    }

    /// Every call fails.
    pub fn broken() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn stored(&self) -> Vec<SessionSummary> {
        lock(&self.stored).clone()
    }
}

impl MemorySink for RecordingMemory {
    fn store(&self, summary: &SessionSummary) -> Result<()> {
        if self.fail {
            return Err(anyhow!("memory unavailable"));
        }
        lock(&self.stored).push(summary.clone());
        Ok(())
    }

    fn retrieve(&self, _query: &str, k: usize) -> Result<Vec<MemoryHit>> {
        if self.fail {
            return Err(anyhow!("memory unavailable"));
        }
        Ok(self.hits.iter().take(k).cloned().collect())
    }
}
