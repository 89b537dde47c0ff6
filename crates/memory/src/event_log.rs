use std::fs;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use anyhow::Result;
use tokio::io::AsyncWriteExt;

use crate::schema::StoredEvent;

/// Append-only JSONL audit trail, one [`StoredEvent`] per line.
#[derive(Debug, Clone)]
pub struct EventLog {
    path: PathBuf,
}

impl EventLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn append(&self, event: &StoredEvent) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut line = serde_json::to_string(event)?;
        line.push('\n');

        // One write per record so concurrent appenders never interleave
        // partial lines.
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        file.sync_all().await?;
        Ok(())
    }

    /// Read every event back.  Only export uses this.
    pub fn load(&self) -> Result<Vec<StoredEvent>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let reader = BufReader::new(fs::File::open(&self.path)?);
        let mut events = Vec::new();
        let mut corrupt_count = 0usize;

        for (line_idx, line_result) in reader.lines().enumerate() {
            let line = line_result?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<StoredEvent>(&line) {
                Ok(event) => events.push(event),
                Err(err) => {
                    corrupt_count += 1;
                    tracing::warn!(
                        line = line_idx + 1,
                        error = %err,
                        path = %self.path.display(),
                        "corrupt event record, skipping line"
                    );
                }
            }
        }

        if corrupt_count > 0 {
            tracing::warn!(
                corrupt_lines = corrupt_count,
                path = %self.path.display(),
                "event log loaded with skipped corrupt lines"
            );
        }

        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tempfile::TempDir;

    use super::EventLog;
    use crate::schema::StoredEvent;

    #[tokio::test]
    async fn append_then_load_preserves_order() {
        let dir = TempDir::new().unwrap();
        let log = EventLog::new(dir.path().join("nested/events.jsonl"));

        log.append(&StoredEvent::new("tool_call", json!({"tool": "PLAY"})))
            .await
            .unwrap();
        log.append(&StoredEvent::new("command", json!({"type": "close_module"})))
            .await
            .unwrap();

        let events = log.load().unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].topic, "tool_call");
        assert_eq!(events[1].payload["type"], "close_module");
    }

    #[test]
    fn missing_file_loads_empty() {
        let dir = TempDir::new().unwrap();
        let log = EventLog::new(dir.path().join("absent.jsonl"));
        assert!(log.load().unwrap().is_empty());
    }

    #[tokio::test]
    async fn corrupt_lines_are_skipped() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("events.jsonl");
        let log = EventLog::new(&path);
        log.append(&StoredEvent::new("ok", json!({}))).await.unwrap();
        let mut raw = std::fs::read_to_string(&path).unwrap();
        raw.push_str("{not json\n");
        std::fs::write(&path, raw).unwrap();
        log.append(&StoredEvent::new("ok", json!({}))).await.unwrap();

        assert_eq!(log.load().unwrap().len(), 2);
    }
}
