//! File-backed memory of past sessions with word-overlap retrieval.

use std::collections::{BTreeSet, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info, instrument};

use crate::core::types::TaskStatus;
use crate::io::config::write_atomic;

/// Outcome of one task as remembered after a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub id: String,
    pub description: String,
    pub status: TaskStatus,
    pub result: Option<String>,
    pub error: Option<String>,
}

/// Everything the Persist stage hands to the memory sink.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub session_id: String,
    pub goal: String,
    /// RFC 3339 timestamps.
    pub started_at: String,
    pub finished_at: String,
    pub final_output: Option<String>,
    pub validation_passed: bool,
    pub tasks: Vec<TaskRecord>,
}

/// A ranked retrieval result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MemoryHit {
    pub text: String,
    pub score: f64,
}

/// Persists session outcomes and retrieves related past context.
///
/// Implementations are shared across concurrent sessions and must be
/// internally synchronized.
pub trait MemorySink: Send + Sync {
    fn store(&self, summary: &SessionSummary) -> Result<()>;
    /// Up to `k` hits, best first.
    fn retrieve(&self, query: &str, k: usize) -> Result<Vec<MemoryHit>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    Goal,
    Task,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryEntry {
    pub id: String,
    pub kind: EntryKind,
    pub text: String,
    pub session_id: String,
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MemoryStats {
    pub entries: usize,
    pub goals: usize,
    pub tasks: usize,
    pub sessions: usize,
    pub path: PathBuf,
}

/// Memory sink persisted as a JSON array of entries.
#[derive(Debug)]
pub struct FileMemoryStore {
    path: PathBuf,
    min_score: f64,
    entries: Mutex<Vec<MemoryEntry>>,
}

/// Stable id for an entry: first 8 bytes of the SHA-256 of its kind and text, hex encoded.
pub fn content_hash(kind: EntryKind, text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(format!("{kind:?}").as_bytes());
    hasher.update([0u8]);
    hasher.update(text.as_bytes());
    let result = hasher.finalize();
    hex::encode(&result[..8])
}

impl FileMemoryStore {
    /// Open the store at `path`; a missing file starts empty.
    pub fn open(path: impl Into<PathBuf>, min_score: f64) -> Result<Self> {
        let path = path.into();
        let entries = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("read memory {}", path.display()))?;
            if contents.trim().is_empty() {
                Vec::new()
            } else {
                serde_json::from_str(&contents)
                    .with_context(|| format!("parse memory {}", path.display()))?
            }
        } else {
            Vec::new()
        };
        debug!(path = %path.display(), entries = entries.len(), "opened memory store");
        Ok(Self {
            path,
            min_score,
            entries: Mutex::new(entries),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn stats(&self) -> Result<MemoryStats> {
        let entries = self.lock()?;
        let sessions: HashSet<&str> = entries.iter().map(|e| e.session_id.as_str()).collect();
        let goals = entries.iter().filter(|e| e.kind == EntryKind::Goal).count();
        Ok(MemoryStats {
            entries: entries.len(),
            goals,
            tasks: entries.len() - goals,
            sessions: sessions.len(),
            path: self.path.clone(),
        })
    }

    /// Remove every entry and persist the empty store.
    pub fn clear(&self) -> Result<()> {
        let mut entries = self.lock()?;
        entries.clear();
        persist(&self.path, &entries)?;
        info!(path = %self.path.display(), "cleared memory store");
        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Vec<MemoryEntry>>> {
        self.entries
            .lock()
            .map_err(|_| anyhow!("memory store lock poisoned"))
    }
}

impl MemorySink for FileMemoryStore {
    #[instrument(skip_all, fields(session_id = %summary.session_id))]
    fn store(&self, summary: &SessionSummary) -> Result<()> {
        let mut entries = self.lock()?;
        let mut known: HashSet<String> = entries.iter().map(|e| e.id.clone()).collect();

        let mut added = 0usize;
        for (kind, text) in entry_texts(summary) {
            let id = content_hash(kind, &text);
            if !known.insert(id.clone()) {
                continue;
            }
            entries.push(MemoryEntry {
                id,
                kind,
                text,
                session_id: summary.session_id.clone(),
                created_at: summary.finished_at.clone(),
            });
            added += 1;
        }

        if added > 0 {
            persist(&self.path, &entries)?;
        }
        debug!(added, total = entries.len(), "stored session summary");
        Ok(())
    }

    fn retrieve(&self, query: &str, k: usize) -> Result<Vec<MemoryHit>> {
        let query_words = word_set(query);
        if query_words.is_empty() || k == 0 {
            return Ok(Vec::new());
        }
        let entries = self.lock()?;
        let mut hits: Vec<MemoryHit> = entries
            .iter()
            .map(|entry| MemoryHit {
                text: entry.text.clone(),
                score: jaccard(&query_words, &word_set(&entry.text)),
            })
            .filter(|hit| hit.score > 0.0 && hit.score >= self.min_score)
            .collect();
        // Stable sort keeps insertion order among equal scores.
        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        hits.truncate(k);
        Ok(hits)
    }
}

fn entry_texts(summary: &SessionSummary) -> Vec<(EntryKind, String)> {
    let outcome = if summary.validation_passed {
        "validated"
    } else {
        "not validated"
    };
    let mut texts = vec![(
        EntryKind::Goal,
        format!("Goal: {} ({outcome})", summary.goal.trim()),
    )];
    for task in &summary.tasks {
        let text = match (&task.result, &task.error) {
            (Some(result), _) if task.status == TaskStatus::Completed => {
                format!("Task: {} -> {}", task.description.trim(), result.trim())
            }
            (_, Some(error)) => {
                format!("Task failed: {} -> {}", task.description.trim(), error.trim())
            }
            _ => continue,
        };
        texts.push((EntryKind::Task, text));
    }
    texts
}

fn persist(path: &Path, entries: &[MemoryEntry]) -> Result<()> {
    let mut buf = serde_json::to_string_pretty(entries).context("serialize memory")?;
    buf.push('\n');
    write_atomic(path, buf.as_bytes())
}

fn word_set(text: &str) -> BTreeSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .collect()
}

fn jaccard(a: &BTreeSet<String>, b: &BTreeSet<String>) -> f64 {
    let union = a.union(b).count();
    if union == 0 {
        return 0.0;
    }
    a.intersection(b).count() as f64 / union as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary(session_id: &str, goal: &str, tasks: Vec<TaskRecord>) -> SessionSummary {
        SessionSummary {
            session_id: session_id.to_string(),
            goal: goal.to_string(),
            started_at: "2024-01-01T00:00:00Z".to_string(),
            finished_at: "2024-01-01T00:00:05Z".to_string(),
            final_output: None,
            validation_passed: true,
            tasks,
        }
    }

    fn completed(id: &str, description: &str, result: &str) -> TaskRecord {
        TaskRecord {
            id: id.to_string(),
            description: description.to_string(),
            status: TaskStatus::Completed,
            result: Some(result.to_string()),
            error: None,
        }
    }

    #[test]
    fn store_persists_and_reopens() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("memory.json");
        let store = FileMemoryStore::open(&path, 0.0).expect("open");
        store
            .store(&summary(
                "s-1",
                "add 5 and 3",
                vec![completed("task_1", "compute 5 + 3", "8")],
            ))
            .expect("store");

        let reopened = FileMemoryStore::open(&path, 0.0).expect("reopen");
        let stats = reopened.stats().expect("stats");
        assert_eq!(stats.entries, 2);
        assert_eq!(stats.goals, 1);
        assert_eq!(stats.tasks, 1);
        assert_eq!(stats.sessions, 1);
    }

    #[test]
    fn identical_content_is_stored_once() {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = FileMemoryStore::open(temp.path().join("memory.json"), 0.0).expect("open");
        let first = summary("s-1", "add numbers", vec![]);
        let second = summary("s-2", "add numbers", vec![]);
        store.store(&first).expect("store");
        store.store(&second).expect("store");
        assert_eq!(store.stats().expect("stats").entries, 1);
    }

    #[test]
    fn pending_tasks_are_not_remembered() {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = FileMemoryStore::open(temp.path().join("memory.json"), 0.0).expect("open");
        let pending = TaskRecord {
            id: "task_1".to_string(),
            description: "later".to_string(),
            status: TaskStatus::Pending,
            result: None,
            error: None,
        };
        store.store(&summary("s-1", "goal", vec![pending])).expect("store");
        assert_eq!(store.stats().expect("stats").tasks, 0);
    }

    #[test]
    fn retrieve_ranks_by_overlap_and_respects_k() {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = FileMemoryStore::open(temp.path().join("memory.json"), 0.05).expect("open");
        store
            .store(&summary("s-1", "calculate the area of a circle", vec![]))
            .expect("store");
        store
            .store(&summary("s-2", "summarize the sales report", vec![]))
            .expect("store");
        store
            .store(&summary("s-3", "calculate the circle circumference", vec![]))
            .expect("store");

        let hits = store.retrieve("circle area", 2).expect("retrieve");
        assert_eq!(hits.len(), 2);
        assert!(hits[0].text.contains("area of a circle"));
        assert!(hits[0].score >= hits[1].score);

        let none = store.retrieve("quantum chromodynamics", 5).expect("retrieve");
        assert!(none.is_empty());
    }

    #[test]
    fn clear_empties_the_file() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("memory.json");
        let store = FileMemoryStore::open(&path, 0.0).expect("open");
        store.store(&summary("s-1", "goal", vec![])).expect("store");
        store.clear().expect("clear");
        assert_eq!(store.stats().expect("stats").entries, 0);
        let reopened = FileMemoryStore::open(&path, 0.0).expect("reopen");
        assert_eq!(reopened.stats().expect("stats").entries, 0);
    }

    #[test]
    fn content_hash_is_stable_and_kind_sensitive() {
        assert_eq!(content_hash(EntryKind::Goal, "x"), content_hash(EntryKind::Goal, "x"));
        assert_ne!(content_hash(EntryKind::Goal, "x"), content_hash(EntryKind::Task, "x"));
        assert_eq!(content_hash(EntryKind::Goal, "x").len(), 16);
    }
}
