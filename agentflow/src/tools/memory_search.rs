//! Searches the memory sink for related past sessions.

use std::sync::Arc;

use tracing::info;

use super::{Tool, ToolOutput};
use crate::io::memory::MemorySink;

const DEFAULT_RESULTS: usize = 5;

#[derive(Clone)]
pub struct MemorySearch {
    memory: Arc<dyn MemorySink>,
    max_results: usize,
}

impl MemorySearch {
    pub fn new(memory: Arc<dyn MemorySink>) -> Self {
        Self {
            memory,
            max_results: DEFAULT_RESULTS,
        }
    }
}

impl Tool for MemorySearch {
    fn name(&self) -> &str {
        "memory_search"
    }

    fn description(&self) -> &str {
        "Search memory of past sessions for context related to a query."
    }

    fn execute(&self, input: &str) -> ToolOutput {
        let query = input.trim();
        if query.is_empty() {
            return ToolOutput::failure("SearchError", "query must not be empty");
        }
        let hits = match self.memory.retrieve(query, self.max_results) {
            Ok(hits) => hits,
            Err(e) => {
                return ToolOutput::failure("SearchError", format!("Memory search failed: {e:#}"));
            }
        };
        info!(query, hits = hits.len(), "searched memory");
        if hits.is_empty() {
            return ToolOutput::ok("No relevant memories found");
        }
        let lines: Vec<String> = hits
            .iter()
            .enumerate()
            .map(|(i, hit)| format!("[{}] (score: {:.2}) {}", i + 1, hit.score, hit.text))
            .collect();
        ToolOutput::ok(lines.join("\n"))
    }
}
