//! Plan invariants checked when a producer hands over its task list.

use std::collections::{HashMap, HashSet};

use crate::core::types::TaskSpec;

/// Findings for a candidate plan.
///
/// `errors` make the plan unusable. `warnings` describe defects the engine
/// tolerates: they surface later as dependency failures at execution time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlanReport {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

/// Check plan invariants:
/// - ids and descriptions are non-empty (error)
/// - ids are unique (error)
/// - dependencies reference ids in the plan (warning)
/// - the dependency graph has no cycles (warning)
pub fn validate_plan(specs: &[TaskSpec]) -> PlanReport {
    let mut report = PlanReport::default();
    let mut seen = HashSet::new();

    for (index, spec) in specs.iter().enumerate() {
        if spec.id.trim().is_empty() {
            report
                .errors
                .push(format!("task at position {} has an empty id", index + 1));
        } else if !seen.insert(spec.id.as_str()) {
            report.errors.push(format!("duplicate task id '{}'", spec.id));
        }
        if spec.description.trim().is_empty() {
            report
                .errors
                .push(format!("task '{}' has an empty description", spec.id));
        }
    }

    for spec in specs {
        for dep in &spec.dependencies {
            if !seen.contains(dep.as_str()) {
                report.warnings.push(format!(
                    "task '{}' depends on unknown task '{}'",
                    spec.id, dep
                ));
            }
        }
    }

    if let Some(cycle) = find_cycle(specs) {
        report
            .warnings
            .push(format!("dependency cycle: {}", cycle.join(" -> ")));
    }

    report
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Visiting,
    Done,
}

/// Return the first dependency cycle found by depth-first search, in plan order.
fn find_cycle(specs: &[TaskSpec]) -> Option<Vec<String>> {
    let edges: HashMap<&str, &[String]> = specs
        .iter()
        .map(|spec| (spec.id.as_str(), spec.dependencies.as_slice()))
        .collect();
    let mut marks: HashMap<&str, Mark> = HashMap::new();
    let mut stack: Vec<&str> = Vec::new();

    for spec in specs {
        if let Some(cycle) = visit(spec.id.as_str(), &edges, &mut marks, &mut stack) {
            return Some(cycle);
        }
    }
    None
}

fn visit<'a>(
    id: &'a str,
    edges: &HashMap<&'a str, &'a [String]>,
    marks: &mut HashMap<&'a str, Mark>,
    stack: &mut Vec<&'a str>,
) -> Option<Vec<String>> {
    match marks.get(id) {
        Some(Mark::Done) => return None,
        Some(Mark::Visiting) => {
            let start = stack.iter().position(|entry| *entry == id).unwrap_or(0);
            let mut cycle: Vec<String> = stack[start..].iter().map(|s| s.to_string()).collect();
            cycle.push(id.to_string());
            return Some(cycle);
        }
        None => {}
    }

    marks.insert(id, Mark::Visiting);
    stack.push(id);
    if let Some(deps) = edges.get(id).copied() {
        for dep in deps {
            // Dangling references are reported separately.
            if !edges.contains_key(dep.as_str()) {
                continue;
            }
            if let Some(cycle) = visit(dep.as_str(), edges, marks, stack) {
                return Some(cycle);
            }
        }
    }
    stack.pop();
    marks.insert(id, Mark::Done);
    None
}
