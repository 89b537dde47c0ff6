use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Per-tool invocation counters.  Only ever incremented.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolStats {
    pub tool: String,
    pub success_count: u64,
    pub fail_count: u64,
}

impl ToolStats {
    pub fn empty(tool: impl Into<String>) -> Self {
        Self {
            tool: tool.into(),
            success_count: 0,
            fail_count: 0,
        }
    }

    pub fn record(&mut self, success: bool) {
        if success {
            self.success_count += 1;
        } else {
            self.fail_count += 1;
        }
    }

    pub fn attempts(&self) -> u64 {
        self.success_count + self.fail_count
    }

    /// `success / (success + fail)`, with `0/0` read as `0.0`.
    pub fn success_rate(&self) -> f64 {
        match self.attempts() {
            0 => 0.0,
            n => self.success_count as f64 / n as f64,
        }
    }
}

/// A free-text memory with a mutable relevance score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Memory {
    pub id: Uuid,
    pub text: String,
    pub score: f64,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
    pub created_at: DateTime<Utc>,
}

impl Memory {
    pub fn new(text: impl Into<String>, score: f64, tags: BTreeMap<String, String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            text: text.into(),
            score,
            tags,
            created_at: Utc::now(),
        }
    }
}

/// Thumbs up / thumbs down on a memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Feedback {
    Up,
    Down,
}

impl Feedback {
    pub fn delta(self) -> f64 {
        match self {
            Self::Up => 1.0,
            Self::Down => -1.0,
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "up" | "+" | "+1" | "good" => Some(Self::Up),
            "down" | "-" | "-1" | "bad" => Some(Self::Down),
            _ => None,
        }
    }
}

/// One audit-trail record.  Write-once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredEvent {
    pub event_id: Uuid,
    pub topic: String,
    pub payload: Value,
    pub occurred_at: DateTime<Utc>,
}

impl StoredEvent {
    pub fn new(topic: impl Into<String>, payload: Value) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            topic: topic.into(),
            payload,
            occurred_at: Utc::now(),
        }
    }
}
