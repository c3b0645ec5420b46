//! End-to-end workflow scenarios through `Orchestrator`.
//!
//! Uses scripted planners, selectors, and scorers with the real calculator
//! and memory store, so runs are deterministic and need no backend.

use std::sync::Arc;

use agentflow::core::types::{TaskSpec, TaskStatus, Verdict};
use agentflow::io::memory::{FileMemoryStore, MemorySink};
use agentflow::orchestrator::{CancelFlag, Collaborators, Orchestrator, WorkflowPolicy, WorkflowRun};
use agentflow::test_support::{
    RecordingMemory, ScriptedPlanner, ScriptedScorer, ScriptedSelector, ScriptedTool,
};
use agentflow::tools::{Calculator, ToolRegistry};

struct Harness {
    planner: Arc<ScriptedPlanner>,
    selector: Arc<ScriptedSelector>,
    scorer: Arc<ScriptedScorer>,
    memory: Arc<dyn MemorySink>,
    extra_tools: Vec<Arc<ScriptedTool>>,
}

impl Harness {
    fn new(plan: Vec<TaskSpec>, selector: ScriptedSelector, scorer: ScriptedScorer) -> Self {
        Self {
            planner: Arc::new(ScriptedPlanner::returning(plan)),
            selector: Arc::new(selector),
            scorer: Arc::new(scorer),
            memory: Arc::new(RecordingMemory::new()),
            extra_tools: Vec::new(),
        }
    }

    fn with_tool(mut self, tool: ScriptedTool) -> Self {
        self.extra_tools.push(Arc::new(tool));
        self
    }

    fn with_memory(mut self, memory: Arc<dyn MemorySink>) -> Self {
        self.memory = memory;
        self
    }

    fn orchestrator(&self) -> Orchestrator {
        let mut tools = ToolRegistry::new();
        tools.register(Arc::new(Calculator));
        for tool in &self.extra_tools {
            tools.register(tool.clone());
        }
        Orchestrator::new(
            Collaborators {
                planner: self.planner.clone(),
                selector: self.selector.clone(),
                scorer: self.scorer.clone(),
                tools: Arc::new(tools),
                memory: Some(self.memory.clone()),
            },
            WorkflowPolicy::default(),
        )
    }

    fn run(&self, goal: &str) -> WorkflowRun {
        self.orchestrator().run_with_cancel(goal, &CancelFlag::new())
    }
}

fn failing_scorer() -> ScriptedScorer {
    ScriptedScorer::always(Verdict::new(false, 0.3, "goal not met"))
}

#[test]
fn scenario_a_single_arithmetic_task() {
    let harness = Harness::new(
        vec![TaskSpec::new("task_1", "Calculate 5 + 3", &[])],
        ScriptedSelector::new().tool("task_1", "calculator", "5 + 3"),
        ScriptedScorer::failing("scorer must not be consulted"),
    );

    let run = harness.run("5 + 3");

    assert!(run.outcome.success);
    assert!(run.outcome.output.contains("8"));
    assert!(run.outcome.validation_passed);
    assert_eq!(run.outcome.iterations, 1);
    assert!(run.outcome.errors.is_empty());
    assert_eq!(harness.scorer.calls(), 0);
}

#[test]
fn scenario_b_dependent_tasks_compose() {
    let harness = Harness::new(
        vec![
            TaskSpec::new("task_1", "Calculate 5 + 3", &[]),
            TaskSpec::new("task_2", "Multiply the previous result by 2", &["task_1"]),
        ],
        ScriptedSelector::new()
            .tool("task_1", "calculator", "5 + 3")
            .tool("task_2", "calculator", "8 * 2"),
        ScriptedScorer::failing("unused"),
    );

    let run = harness.run("double 5 + 3");

    assert!(run.outcome.success);
    assert!(run.outcome.output.contains("16"));
    assert_eq!(harness.selector.selected_ids(), vec!["task_1", "task_2"]);
    let requests = harness.selector.requests();
    assert!(requests[0].context.dependency_results.is_empty());
    assert_eq!(
        requests[1].context.dependency_results,
        vec![("task_1".to_string(), "8".to_string())]
    );
    assert_eq!(run.state.results_by_id.get("task_2").map(String::as_str), Some("16"));
}

#[test]
fn scenario_c_failing_tool_exhausts_retries() {
    let harness = Harness::new(
        vec![TaskSpec::new("task_1", "Fetch data", &[])],
        ScriptedSelector::new().tool("task_1", "flaky", "query"),
        failing_scorer(),
    )
    .with_tool(ScriptedTool::failing("flaky", "RuntimeError", "boom"));

    let run = harness.run("fetch data");

    assert!(run.outcome.success);
    assert!(!run.outcome.validation_passed);
    assert!(!run.outcome.errors.is_empty());
    assert_eq!(
        run.outcome.errors.last().map(String::as_str),
        Some("Validation failed after 2 retries: goal not met")
    );
    assert_eq!(run.state.retry_count, 2);
    assert_eq!(harness.scorer.calls(), 3);
    assert_eq!(harness.extra_tools[0].inputs().len(), 3);
    assert!(run.state.done);
}

#[test]
fn scenario_d_empty_plan_never_executes() {
    let harness = Harness::new(Vec::new(), ScriptedSelector::new(), failing_scorer());

    let run = harness.run("anything");

    assert!(!run.outcome.success);
    assert!(run.state.done);
    assert!(run.outcome.output.starts_with("Workflow failed: Planning error"));
    assert!(harness.selector.requests().is_empty());
    assert_eq!(harness.scorer.calls(), 0);
    assert_eq!(run.outcome.iterations, 0);
}

#[test]
fn independent_tasks_complete_in_plan_order() {
    let ids = ["t3", "t1", "t2", "t0"];
    let mut selector = ScriptedSelector::new();
    for id in ids {
        selector = selector.direct(id, &format!("answer {id}"));
    }
    let harness = Harness::new(
        ids.iter().map(|id| TaskSpec::new(id, "independent", &[])).collect(),
        selector,
        ScriptedScorer::always(Verdict::new(true, 0.9, "fine")),
    );

    let run = harness.run("four things");

    assert_eq!(harness.selector.selected_ids(), ids);
    assert!(run.state.plan.iter().all(|t| t.status == TaskStatus::Completed));
    let logged: Vec<&str> = run.state.tool_log.iter().map(|c| c.task_id.as_str()).collect();
    assert_eq!(logged, ids);
}

#[test]
fn dependency_results_follow_dependency_list_order() {
    let harness = Harness::new(
        vec![
            TaskSpec::new("a", "first", &[]),
            TaskSpec::new("b", "second", &[]),
            TaskSpec::new("c", "combine", &["b", "a"]),
        ],
        ScriptedSelector::new()
            .direct("a", "A")
            .direct("b", "B")
            .direct("c", "C"),
        ScriptedScorer::always(Verdict::new(true, 1.0, "ok")),
    );

    harness.run("combine");

    let requests = harness.selector.requests();
    assert_eq!(
        requests[2].context.dependency_results,
        vec![
            ("b".to_string(), "B".to_string()),
            ("a".to_string(), "A".to_string())
        ]
    );
}

#[test]
fn failed_dependency_fails_dependent_without_tool() {
    let harness = Harness::new(
        vec![
            TaskSpec::new("a", "fetch", &[]),
            TaskSpec::new("b", "use fetched", &["a"]),
        ],
        ScriptedSelector::new()
            .tool("a", "flaky", "x")
            .direct("b", "never"),
        ScriptedScorer::always(Verdict::new(true, 0.9, "acceptable")),
    )
    .with_tool(ScriptedTool::failing("flaky", "RuntimeError", "boom"));

    let run = harness.run("fetch and use");

    assert_eq!(run.state.plan[1].status, TaskStatus::Failed);
    assert!(!harness.selector.selected_ids().contains(&"b".to_string()));
    assert!(
        run.outcome
            .errors
            .iter()
            .any(|e| e == "Dependencies not met for b: a is failed")
    );
}

#[test]
fn missing_dependency_fails_at_any_position() {
    for position in 0..3 {
        let mut plan: Vec<TaskSpec> = (0..3)
            .map(|i| TaskSpec::new(&format!("t{i}"), "step", &[]))
            .collect();
        plan[position].dependencies = vec!["ghost".to_string()];
        let mut selector = ScriptedSelector::new();
        for i in 0..3 {
            selector = selector.direct(&format!("t{i}"), "ok");
        }
        let harness = Harness::new(
            plan,
            selector,
            ScriptedScorer::always(Verdict::new(true, 1.0, "ok")),
        );

        let run = harness.run("ghost dependency");

        let ghost = &run.state.plan[position];
        assert_eq!(ghost.status, TaskStatus::Failed, "position {position}");
        assert!(!harness.selector.selected_ids().contains(&ghost.id));
        assert!(
            run.outcome
                .warnings
                .iter()
                .any(|w| w.contains("unknown task 'ghost'"))
        );
    }
}

#[test]
fn retry_never_resets_completed_results() {
    let harness = Harness::new(
        vec![
            TaskSpec::new("a", "compute", &[]),
            TaskSpec::new("b", "fetch", &[]),
        ],
        ScriptedSelector::new()
            .tool("a", "calculator", "6 * 7")
            .tool("b", "flaky", "x"),
        failing_scorer(),
    )
    .with_tool(ScriptedTool::failing("flaky", "RuntimeError", "boom"));

    let run = harness.run("compute and fetch");

    assert_eq!(run.state.plan[0].status, TaskStatus::Completed);
    assert_eq!(run.state.plan[0].result.as_deref(), Some("42"));
    let selected = harness.selector.selected_ids();
    assert_eq!(selected.iter().filter(|id| id.as_str() == "a").count(), 1);
    assert_eq!(selected.iter().filter(|id| id.as_str() == "b").count(), 3);
    assert_eq!(run.outcome.iterations, 4);
}

#[test]
fn retry_budget_ends_run_regardless_of_feedback() {
    for feedback in ["", "almost there, one more try", "unparseable"] {
        let harness = Harness::new(
            vec![TaskSpec::new("a", "answer", &[])],
            ScriptedSelector::new().direct("a", "42"),
            ScriptedScorer::always(Verdict::new(false, 0.99, feedback)),
        );

        let run = harness.run("answer");

        assert!(run.state.done);
        assert!(!run.outcome.validation_passed);
        assert_eq!(run.state.retry_count, 2);
        assert_eq!(harness.scorer.calls(), 3);
    }
}

#[test]
fn fast_path_needs_only_the_designated_tool() {
    let harness = Harness::new(
        vec![
            TaskSpec::new("a", "compute", &[]),
            TaskSpec::new("b", "explain", &["a"]),
        ],
        ScriptedSelector::new()
            .tool("a", "calculator", "2 + 2")
            .direct("b", "it is four"),
        ScriptedScorer::always(Verdict::new(true, 0.95, "clear")),
    );

    let run = harness.run("compute and explain");

    assert_eq!(harness.scorer.calls(), 1);
    assert!(run.outcome.validation_passed);
    assert!(run.outcome.output.contains("clear"));
}

#[test]
fn scorer_recovers_after_a_retry() {
    let harness = Harness::new(
        vec![TaskSpec::new("a", "answer", &[])],
        ScriptedSelector::new().direct("a", "42"),
        ScriptedScorer::sequence(
            vec![Err("scorer offline".to_string())],
            Ok(Verdict::new(true, 0.9, "good")),
        ),
    );

    let run = harness.run("answer");

    assert!(run.outcome.validation_passed);
    assert_eq!(run.state.retry_count, 1);
    assert_eq!(run.outcome.warnings[0], "Scoring error: scorer offline");
}

#[test]
fn file_memory_feeds_later_sessions() {
    let temp = tempfile::tempdir().expect("tempdir");
    let store: Arc<dyn MemorySink> = Arc::new(
        FileMemoryStore::open(temp.path().join("memory.json"), 0.05).expect("open memory"),
    );
    let plan = vec![TaskSpec::new("task_1", "Calculate 5 + 3", &[])];
    let first = Harness::new(
        plan.clone(),
        ScriptedSelector::new().tool("task_1", "calculator", "5 + 3"),
        failing_scorer(),
    )
    .with_memory(store.clone());
    let first_run = first.run("add 5 and 3");
    assert!(first_run.state.retrieved_context.is_none());

    let second = Harness::new(
        plan,
        ScriptedSelector::new().tool("task_1", "calculator", "5 + 3"),
        failing_scorer(),
    )
    .with_memory(store);
    let second_run = second.run("add 5 and 3 again");

    let context = second_run.state.retrieved_context.expect("context");
    assert!(context.contains("Goal: add 5 and 3 (validated)"));
    assert_eq!(second_run.state.history.len(), 2);
}

#[test]
fn concurrent_sessions_share_collaborators() {
    let harness = Harness::new(
        vec![TaskSpec::new("task_1", "Calculate 5 + 3", &[])],
        ScriptedSelector::new().tool("task_1", "calculator", "5 + 3"),
        failing_scorer(),
    );
    let orchestrator = harness.orchestrator();

    let outcomes: Vec<_> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..4)
            .map(|_| scope.spawn(|| orchestrator.run("5 + 3")))
            .collect();
        handles
            .into_iter()
            .map(|handle| handle.join().expect("join"))
            .collect()
    });

    assert!(outcomes.iter().all(|o| o.success && o.validation_passed));
    let mut sessions: Vec<&str> = outcomes.iter().map(|o| o.session_id.as_str()).collect();
    sessions.sort_unstable();
    sessions.dedup();
    assert_eq!(sessions.len(), 4);
}
