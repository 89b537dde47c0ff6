use std::collections::BTreeMap;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use uuid::Uuid;

use crate::schema::{Feedback, Memory, StoredEvent, ToolStats};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("memory {0} not found")]
    MemoryNotFound(Uuid),
    #[error("outcome store backend failed: {0:#}")]
    Backend(#[from] anyhow::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Durable substrate for tool counters, scored memories and the audit trail.
///
/// Every call is atomic with respect to the one record it touches; nothing
/// spans records.
#[async_trait]
pub trait OutcomeStore: Send + Sync {
    /// Increment the success or failure counter of `tool`, creating the row if
    /// needed.  Returns the updated counters.
    async fn record_tool_outcome(&self, tool: &str, success: bool) -> StoreResult<ToolStats>;

    /// Counters for `tool`; zeroes when it has never been recorded.
    async fn tool_stats(&self, tool: &str) -> StoreResult<ToolStats>;

    /// Every counter row, sorted by tool name.
    async fn all_tool_stats(&self) -> StoreResult<Vec<ToolStats>>;

    /// Insert a new memory.  Identical texts become distinct records.
    async fn upsert_memory(
        &self,
        text: &str,
        score: f64,
        tags: BTreeMap<String, String>,
    ) -> StoreResult<Uuid>;

    /// Add `delta` to a memory's score (unclamped) and return the new score.
    async fn adjust_memory_score(&self, id: Uuid, delta: f64) -> StoreResult<f64>;

    async fn feedback(&self, id: Uuid, feedback: Feedback) -> StoreResult<f64> {
        self.adjust_memory_score(id, feedback.delta()).await
    }

    /// Memories whose text contains `query` (case-insensitive), highest score
    /// first, newest first among equal scores.
    async fn retrieve_memories(&self, query: &str, limit: usize) -> StoreResult<Vec<Memory>>;

    /// Every memory in insertion order.  Used by dataset export.
    async fn all_memories(&self) -> StoreResult<Vec<Memory>>;

    async fn append_event(&self, topic: &str, payload: Value) -> StoreResult<()>;

    /// Every audit event in append order.  Used by dataset export.
    async fn load_events(&self) -> StoreResult<Vec<StoredEvent>>;
}

/// Shared ranking rule for [`OutcomeStore::retrieve_memories`].
pub fn rank_memories(memories: Vec<Memory>, query: &str, limit: usize) -> Vec<Memory> {
    let needle = query.trim().to_lowercase();
    let mut hits: Vec<Memory> = memories
        .into_iter()
        .filter(|m| m.text.to_lowercase().contains(&needle))
        .collect();
    hits.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| b.created_at.cmp(&a.created_at))
    });
    hits.truncate(limit);
    hits
}

// ── In-memory backend ────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct Inner {
    stats: BTreeMap<String, ToolStats>,
    memories: Vec<Memory>,
    events: Vec<StoredEvent>,
}

/// Process-local store.  Used by tests and `--ephemeral` runs.
#[derive(Debug, Default)]
pub struct InMemoryOutcomeStore {
    inner: Mutex<Inner>,
}

impl InMemoryOutcomeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop everything.  Only meant for isolated test stores.
    pub fn reset(&self) {
        *self.inner.lock() = Inner::default();
    }
}

#[async_trait]
impl OutcomeStore for InMemoryOutcomeStore {
    async fn record_tool_outcome(&self, tool: &str, success: bool) -> StoreResult<ToolStats> {
        let mut inner = self.inner.lock();
        let row = inner
            .stats
            .entry(tool.to_string())
            .or_insert_with(|| ToolStats::empty(tool));
        row.record(success);
        Ok(row.clone())
    }

    async fn tool_stats(&self, tool: &str) -> StoreResult<ToolStats> {
        Ok(self
            .inner
            .lock()
            .stats
            .get(tool)
            .cloned()
            .unwrap_or_else(|| ToolStats::empty(tool)))
    }

    async fn all_tool_stats(&self) -> StoreResult<Vec<ToolStats>> {
        Ok(self.inner.lock().stats.values().cloned().collect())
    }

    async fn upsert_memory(
        &self,
        text: &str,
        score: f64,
        tags: BTreeMap<String, String>,
    ) -> StoreResult<Uuid> {
        let memory = Memory::new(text, score, tags);
        let id = memory.id;
        self.inner.lock().memories.push(memory);
        Ok(id)
    }

    async fn adjust_memory_score(&self, id: Uuid, delta: f64) -> StoreResult<f64> {
        let mut inner = self.inner.lock();
        let memory = inner
            .memories
            .iter_mut()
            .find(|m| m.id == id)
            .ok_or(StoreError::MemoryNotFound(id))?;
        memory.score += delta;
        Ok(memory.score)
    }

    async fn retrieve_memories(&self, query: &str, limit: usize) -> StoreResult<Vec<Memory>> {
        let memories = self.inner.lock().memories.clone();
        Ok(rank_memories(memories, query, limit))
    }

    async fn all_memories(&self) -> StoreResult<Vec<Memory>> {
        Ok(self.inner.lock().memories.clone())
    }

    async fn append_event(&self, topic: &str, payload: Value) -> StoreResult<()> {
        self.inner
            .lock()
            .events
            .push(StoredEvent::new(topic, payload));
        Ok(())
    }

    async fn load_events(&self) -> StoreResult<Vec<StoredEvent>> {
        Ok(self.inner.lock().events.clone())
    }
}
