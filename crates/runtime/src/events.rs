use chrono::{DateTime, Utc};
use jarvis_core::CommandResult;
use jarvis_policy::Blocked;
use jarvis_tools::ToolCallResult;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// Envelope of every message fanned out by the hub:
/// `{"type": <string>, "ts": <RFC3339>, "data": <object>}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HubMessage {
    #[serde(rename = "type")]
    pub kind: String,
    pub ts: DateTime<Utc>,
    pub data: Value,
}

impl HubMessage {
    pub fn new(kind: impl Into<String>, data: Value) -> Self {
        Self {
            kind: kind.into(),
            ts: Utc::now(),
            data,
        }
    }

    pub fn command_result(command_type: &str, result: &CommandResult) -> Self {
        Self::new(
            "command_result",
            json!({ "command_type": command_type, "result": result }),
        )
    }

    pub fn tool_result(result: &ToolCallResult) -> Self {
        Self::new("tool_result", serde_json::to_value(result).unwrap_or(Value::Null))
    }

    pub fn blocked(blocked: &Blocked) -> Self {
        Self::new(
            "blocked",
            json!({
                "action": blocked.action,
                "risk": blocked.risk,
                "threshold": blocked.threshold,
                "message": blocked.to_string(),
            }),
        )
    }

    /// Single-line JSON, as written to stdout and sockets.
    pub fn to_line(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_has_type_ts_and_data() {
        let msg = HubMessage::new("ping", json!({"n": 1}));
        let value: Value = serde_json::from_str(&msg.to_line()).unwrap();
        assert_eq!(value["type"], "ping");
        assert!(value["ts"].is_string());
        assert_eq!(value["data"]["n"], 1);
        assert_eq!(value.as_object().unwrap().len(), 3);
    }

    #[test]
    fn blocked_message_carries_scores() {
        let blocked = Blocked {
            action: "wipe_disk".into(),
            risk: 0.95,
            threshold: 0.8,
        };
        let msg = HubMessage::blocked(&blocked);
        assert_eq!(msg.kind, "blocked");
        assert_eq!(msg.data["action"], "wipe_disk");
    }

    #[test]
    fn command_result_nests_result() {
        let msg = HubMessage::command_result("close_module", &CommandResult::failure("nope"));
        assert_eq!(msg.data["command_type"], "close_module");
        assert_eq!(msg.data["result"]["success"], false);
    }
}
