//! JSONL dataset dump for offline training: events, then memories, then tool
//! counters.  Each line carries a `kind` tag.

use std::path::Path;

use anyhow::Result;
use serde::Serialize;
use serde_json::Value;
use tokio::io::AsyncWriteExt;
use tracing::info;

use crate::store::OutcomeStore;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ExportSummary {
    pub events: usize,
    pub memories: usize,
    pub tool_stats: usize,
}

impl ExportSummary {
    pub fn total(&self) -> usize {
        self.events + self.memories + self.tool_stats
    }
}

fn tagged(kind: &str, record: &impl Serialize) -> Result<String> {
    let mut value = serde_json::to_value(record)?;
    if let Value::Object(map) = &mut value {
        map.insert("kind".to_string(), Value::String(kind.to_string()));
    }
    Ok(serde_json::to_string(&value)?)
}

/// Render the whole store as JSONL lines, in export order.
pub async fn dataset_lines(store: &dyn OutcomeStore) -> Result<(Vec<String>, ExportSummary)> {
    let events = store.load_events().await?;
    let memories = store.all_memories().await?;
    let mut stats = store.all_tool_stats().await?;
    stats.sort_by(|a, b| a.tool.cmp(&b.tool));

    let summary = ExportSummary {
        events: events.len(),
        memories: memories.len(),
        tool_stats: stats.len(),
    };

    let mut lines = Vec::with_capacity(summary.total());
    for event in &events {
        lines.push(tagged("event", event)?);
    }
    for memory in &memories {
        lines.push(tagged("memory", memory)?);
    }
    for row in &stats {
        lines.push(tagged("tool_stats", row)?);
    }
    Ok((lines, summary))
}

/// Write the dataset to `path`, replacing any previous file.
pub async fn export_dataset(store: &dyn OutcomeStore, path: impl AsRef<Path>) -> Result<ExportSummary> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let (lines, summary) = dataset_lines(store).await?;
    let mut file = tokio::fs::File::create(path).await?;
    for line in &lines {
        file.write_all(line.as_bytes()).await?;
        file.write_all(b"\n").await?;
    }
    file.flush().await?;
    file.sync_all().await?;

    info!(
        path = %path.display(),
        events = summary.events,
        memories = summary.memories,
        tool_stats = summary.tool_stats,
        "dataset exported"
    );
    Ok(summary)
}
