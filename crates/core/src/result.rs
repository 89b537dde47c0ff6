use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Outcome of one Command Bus dispatch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandResult {
    pub success: bool,
    #[serde(default)]
    pub data: Map<String, Value>,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl CommandResult {
    pub fn ok(data: Map<String, Value>, message: impl Into<String>) -> Self {
        Self {
            success: true,
            data,
            message: message.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: Map::new(),
            message: message.into(),
            timestamp: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn failure_has_empty_data() {
        let result = CommandResult::failure("no handler for search");
        assert!(!result.success);
        assert!(result.data.is_empty());
        assert_eq!(result.message, "no handler for search");
    }

    #[test]
    fn projects_to_plain_json_map() {
        let mut data = Map::new();
        data.insert("module".to_string(), json!("calendar"));
        let value = serde_json::to_value(CommandResult::ok(data, "opened")).unwrap();
        assert_eq!(value["success"], true);
        assert_eq!(value["data"]["module"], "calendar");
        assert_eq!(value["message"], "opened");
        assert!(value["timestamp"].is_string());
    }
}
