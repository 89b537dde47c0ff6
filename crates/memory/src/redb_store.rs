//! Durable [`OutcomeStore`] backed by [`redb`] plus a JSONL audit log.
//!
//! # Tables
//!
//! | Name         | Key                | Value                     |
//! |--------------|--------------------|---------------------------|
//! | `tool_stats` | tool name (&str)   | JSON-serialised ToolStats |
//! | `memories`   | UUID string (36c)  | JSON-serialised Memory    |
//!
//! Every mutation is a read-modify-write inside one redb write transaction,
//! and redb serialises write transactions, so concurrent callers never lose
//! an increment.
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use redb::{Database, ReadableTable, TableDefinition};
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use crate::event_log::EventLog;
use crate::schema::{Memory, StoredEvent, ToolStats};
use crate::store::{OutcomeStore, StoreError, StoreResult, rank_memories};

const TOOL_STATS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("tool_stats");
const MEMORIES_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("memories");

pub struct RedbOutcomeStore {
    db: Database,
    path: PathBuf,
    events: EventLog,
}

impl RedbOutcomeStore {
    /// Open or create the database at `db_path`; events go to `event_log_path`.
    pub fn open(db_path: impl AsRef<Path>, event_log_path: impl Into<PathBuf>) -> Result<Self> {
        let path = db_path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let db = Database::create(&path)
            .with_context(|| format!("opening outcome store at {}", path.display()))?;

        // Ensure tables exist so read transactions never hit a missing table.
        {
            let tx = db.begin_write()?;
            tx.open_table(TOOL_STATS_TABLE)?;
            tx.open_table(MEMORIES_TABLE)?;
            tx.commit()?;
        }

        debug!(path = %path.display(), "opened outcome store");
        Ok(Self {
            db,
            path,
            events: EventLog::new(event_log_path),
        })
    }

    /// Open both files under `data_dir` using the standard file names.
    pub fn open_in(data_dir: impl AsRef<Path>) -> Result<Self> {
        let dir = data_dir.as_ref();
        Self::open(dir.join("outcomes.redb"), dir.join("events.jsonl"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn event_log(&self) -> &EventLog {
        &self.events
    }

    fn increment(&self, tool: &str, success: bool) -> Result<ToolStats> {
        let tx = self.db.begin_write()?;
        let stats = {
            let mut tbl = tx.open_table(TOOL_STATS_TABLE)?;
            let existing = tbl.get(tool)?.map(|v| v.value().to_vec());
            let mut stats = match existing {
                Some(bytes) => serde_json::from_slice::<ToolStats>(&bytes)?,
                None => ToolStats::empty(tool),
            };
            stats.record(success);
            let bytes = serde_json::to_vec(&stats)?;
            tbl.insert(tool, bytes.as_slice())?;
            stats
        };
        tx.commit()?;
        Ok(stats)
    }

    fn read_stats(&self, tool: &str) -> Result<ToolStats> {
        let tx = self.db.begin_read()?;
        let tbl = tx.open_table(TOOL_STATS_TABLE)?;
        match tbl.get(tool)? {
            None => Ok(ToolStats::empty(tool)),
            Some(v) => Ok(serde_json::from_slice(v.value())?),
        }
    }

    fn read_all_stats(&self) -> Result<Vec<ToolStats>> {
        let tx = self.db.begin_read()?;
        let tbl = tx.open_table(TOOL_STATS_TABLE)?;
        let mut rows = Vec::new();
        for entry in tbl.iter()? {
            let (_, v) = entry?;
            rows.push(serde_json::from_slice::<ToolStats>(v.value())?);
        }
        // redb iterates keys in byte order, which is name order for &str keys.
        Ok(rows)
    }

    fn insert_memory(&self, memory: &Memory) -> Result<()> {
        let id = memory.id.to_string();
        let bytes = serde_json::to_vec(memory)?;
        let tx = self.db.begin_write()?;
        {
            let mut tbl = tx.open_table(MEMORIES_TABLE)?;
            tbl.insert(id.as_str(), bytes.as_slice())?;
        }
        tx.commit()?;
        Ok(())
    }

    /// `Ok(None)` when the memory does not exist.
    fn adjust_score(&self, id: Uuid, delta: f64) -> Result<Option<f64>> {
        let key = id.to_string();
        let tx = self.db.begin_write()?;
        let score = {
            let mut tbl = tx.open_table(MEMORIES_TABLE)?;
            let existing = tbl.get(key.as_str())?.map(|v| v.value().to_vec());
            match existing {
                None => None,
                Some(bytes) => {
                    let mut memory: Memory = serde_json::from_slice(&bytes)?;
                    memory.score += delta;
                    let bytes = serde_json::to_vec(&memory)?;
                    tbl.insert(key.as_str(), bytes.as_slice())?;
                    Some(memory.score)
                }
            }
        };
        if score.is_some() {
            tx.commit()?;
        } else {
            tx.abort()?;
        }
        Ok(score)
    }

    fn read_memories(&self) -> Result<Vec<Memory>> {
        let tx = self.db.begin_read()?;
        let tbl = tx.open_table(MEMORIES_TABLE)?;
        let mut memories = Vec::new();
        for entry in tbl.iter()? {
            let (_, v) = entry?;
            memories.push(serde_json::from_slice::<Memory>(v.value())?);
        }
        memories.sort_by_key(|m| m.created_at);
        Ok(memories)
    }
}

#[async_trait]
impl OutcomeStore for RedbOutcomeStore {
    async fn record_tool_outcome(&self, tool: &str, success: bool) -> StoreResult<ToolStats> {
        Ok(self.increment(tool, success)?)
    }

    async fn tool_stats(&self, tool: &str) -> StoreResult<ToolStats> {
        Ok(self.read_stats(tool)?)
    }

    async fn all_tool_stats(&self) -> StoreResult<Vec<ToolStats>> {
        Ok(self.read_all_stats()?)
    }

    async fn upsert_memory(
        &self,
        text: &str,
        score: f64,
        tags: BTreeMap<String, String>,
    ) -> StoreResult<Uuid> {
        let memory = Memory::new(text, score, tags);
        self.insert_memory(&memory)?;
        Ok(memory.id)
    }

    async fn adjust_memory_score(&self, id: Uuid, delta: f64) -> StoreResult<f64> {
        self.adjust_score(id, delta)?
            .ok_or(StoreError::MemoryNotFound(id))
    }

    async fn retrieve_memories(&self, query: &str, limit: usize) -> StoreResult<Vec<Memory>> {
        Ok(rank_memories(self.read_memories()?, query, limit))
    }

    async fn all_memories(&self) -> StoreResult<Vec<Memory>> {
        Ok(self.read_memories()?)
    }

    async fn append_event(&self, topic: &str, payload: Value) -> StoreResult<()> {
        self.events.append(&StoredEvent::new(topic, payload)).await?;
        Ok(())
    }

    async fn load_events(&self) -> StoreResult<Vec<StoredEvent>> {
        Ok(self.events.load()?)
    }
}
