use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Discriminant of a [`CommandBody`].  Handler tables are keyed by this.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandKind {
    OpenModule,
    CloseModule,
    SystemStatus,
    AddTodo,
    ToggleTodo,
    SetTheme,
    ShowWeather,
    PlayMedia,
    SetVolume,
    ShowNotification,
    VoiceResponse,
    AnimateElement,
    UpdateMetrics,
    Search,
}

impl CommandKind {
    pub const ALL: [CommandKind; 14] = [
        Self::OpenModule,
        Self::CloseModule,
        Self::SystemStatus,
        Self::AddTodo,
        Self::ToggleTodo,
        Self::SetTheme,
        Self::ShowWeather,
        Self::PlayMedia,
        Self::SetVolume,
        Self::ShowNotification,
        Self::VoiceResponse,
        Self::AnimateElement,
        Self::UpdateMetrics,
        Self::Search,
    ];

    /// Wire name used in JSON payloads, logs and handler lookups.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::OpenModule => "open_module",
            Self::CloseModule => "close_module",
            Self::SystemStatus => "system_status",
            Self::AddTodo => "add_todo",
            Self::ToggleTodo => "toggle_todo",
            Self::SetTheme => "set_theme",
            Self::ShowWeather => "show_weather",
            Self::PlayMedia => "play_media",
            Self::SetVolume => "set_volume",
            Self::ShowNotification => "show_notification",
            Self::VoiceResponse => "voice_response",
            Self::AnimateElement => "animate_element",
            Self::UpdateMetrics => "update_metrics",
            Self::Search => "search",
        }
    }

    /// Parse a wire name (case-insensitive, surrounding whitespace ignored).
    pub fn parse(s: &str) -> Option<Self> {
        let wanted = s.trim().to_ascii_lowercase();
        Self::ALL.into_iter().find(|kind| kind.as_str() == wanted)
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HudModule {
    Calendar,
    Mail,
    Finance,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    Cyan,
    Red,
    Green,
    Purple,
    Blue,
    Orange,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaAction {
    Play,
    Pause,
    Next,
    Previous,
    Stop,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationLevel {
    #[default]
    Info,
    Warning,
    Error,
    Success,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchScope {
    #[default]
    General,
    Files,
    Web,
}

fn default_volume() -> u8 {
    50
}

fn default_notification_title() -> String {
    "JARVIS".to_string()
}

fn default_notification_ms() -> u32 {
    5000
}

fn default_voice() -> String {
    "sv-SE".to_string()
}

fn default_animation_ms() -> u32 {
    1000
}

/// Variant-specific fields of a HUD command.
///
/// The variant *is* the command type, so a type/field mismatch cannot be
/// constructed.  On the wire the variant is the `type` tag:
///
/// ```json
/// { "type": "add_todo", "text": "buy milk", "priority": "high" }
/// ```
///
/// Keys that collide with the tag in older payloads (`media_action`,
/// `search_type`, notification `type`) are accepted through aliases.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CommandBody {
    OpenModule {
        module: HudModule,
    },
    CloseModule,
    SystemStatus {
        #[serde(default)]
        detailed: bool,
    },
    AddTodo {
        text: String,
        #[serde(default)]
        priority: Priority,
    },
    ToggleTodo {
        todo_id: String,
    },
    SetTheme {
        theme: Theme,
    },
    ShowWeather {
        #[serde(default)]
        location: Option<String>,
    },
    PlayMedia {
        #[serde(alias = "media_action")]
        action: MediaAction,
    },
    SetVolume {
        #[serde(default = "default_volume")]
        level: u8,
    },
    ShowNotification {
        #[serde(default = "default_notification_title")]
        title: String,
        #[serde(default)]
        message: String,
        #[serde(default, alias = "notification_type")]
        level: NotificationLevel,
        #[serde(default = "default_notification_ms")]
        duration_ms: u32,
    },
    VoiceResponse {
        text: String,
        #[serde(default = "default_voice")]
        voice: String,
    },
    AnimateElement {
        element: String,
        animation: String,
        #[serde(default = "default_animation_ms")]
        duration_ms: u32,
    },
    UpdateMetrics {
        #[serde(default)]
        cpu: Option<f32>,
        #[serde(default)]
        memory: Option<f32>,
        #[serde(default)]
        network: Option<f32>,
    },
    Search {
        query: String,
        #[serde(default, alias = "search_type")]
        scope: SearchScope,
    },
}

impl CommandBody {
    pub fn kind(&self) -> CommandKind {
        match self {
            Self::OpenModule { .. } => CommandKind::OpenModule,
            Self::CloseModule => CommandKind::CloseModule,
            Self::SystemStatus { .. } => CommandKind::SystemStatus,
            Self::AddTodo { .. } => CommandKind::AddTodo,
            Self::ToggleTodo { .. } => CommandKind::ToggleTodo,
            Self::SetTheme { .. } => CommandKind::SetTheme,
            Self::ShowWeather { .. } => CommandKind::ShowWeather,
            Self::PlayMedia { .. } => CommandKind::PlayMedia,
            Self::SetVolume { .. } => CommandKind::SetVolume,
            Self::ShowNotification { .. } => CommandKind::ShowNotification,
            Self::VoiceResponse { .. } => CommandKind::VoiceResponse,
            Self::AnimateElement { .. } => CommandKind::AnimateElement,
            Self::UpdateMetrics { .. } => CommandKind::UpdateMetrics,
            Self::Search { .. } => CommandKind::Search,
        }
    }

    /// Range checks that the type system alone does not express.
    pub fn validate(&self) -> Result<(), CommandError> {
        match self {
            Self::SetVolume { level } if *level > 100 => Err(CommandError::InvalidPayload {
                kind: CommandKind::SetVolume,
                reason: format!("'level' must be an integer 0-100, got {level}"),
            }),
            Self::UpdateMetrics {
                cpu,
                memory,
                network,
            } => {
                for (name, value) in [("cpu", cpu), ("memory", memory), ("network", network)] {
                    if let Some(v) = value {
                        if !(0.0..=100.0).contains(v) {
                            return Err(CommandError::InvalidPayload {
                                kind: CommandKind::UpdateMetrics,
                                reason: format!("'{name}' must be a percentage 0-100, got {v}"),
                            });
                        }
                    }
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CommandError {
    #[error("command payload has no 'type' field")]
    MissingType,
    #[error("unknown command type: {0}")]
    UnknownCommandType(String),
    #[error("invalid {kind} payload: {reason}")]
    InvalidPayload { kind: CommandKind, reason: String },
}

/// A typed HUD command plus the moment it was constructed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Command {
    #[serde(flatten)]
    pub body: CommandBody,
    pub created_at: DateTime<Utc>,
}

impl Command {
    pub fn new(body: CommandBody) -> Self {
        Self {
            body,
            created_at: Utc::now(),
        }
    }

    pub fn kind(&self) -> CommandKind {
        self.body.kind()
    }

    /// Build a command from an untrusted JSON payload.
    ///
    /// The type is read from `type`, falling back to `action` for proposers
    /// that use the older `{"action": "open_module", ...}` shape.
    pub fn from_value(value: &Value) -> Result<Self, CommandError> {
        let Some(object) = value.as_object() else {
            return Err(CommandError::MissingType);
        };

        let mut fields = object.clone();
        let raw_type = match fields.get("type").and_then(Value::as_str) {
            Some(t) => t.to_string(),
            None => match fields.remove("action") {
                Some(Value::String(t)) => t,
                _ => return Err(CommandError::MissingType),
            },
        };
        let kind = CommandKind::parse(&raw_type)
            .ok_or_else(|| CommandError::UnknownCommandType(raw_type.clone()))?;
        fields.insert("type".to_string(), Value::String(kind.as_str().to_string()));

        let body: CommandBody = serde_json::from_value(Value::Object(fields)).map_err(|err| {
            CommandError::InvalidPayload {
                kind,
                reason: err.to_string(),
            }
        })?;
        body.validate()?;
        Ok(Self::new(body))
    }

    /// JSON projection without the timestamp, used as the log input snapshot.
    pub fn payload(&self) -> Value {
        serde_json::to_value(&self.body).unwrap_or(Value::Null)
    }
}

impl From<CommandBody> for Command {
    fn from(body: CommandBody) -> Self {
        Self::new(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn kind_round_trips_through_wire_name() {
        for kind in CommandKind::ALL {
            assert_eq!(CommandKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(CommandKind::parse("  ADD_TODO "), Some(CommandKind::AddTodo));
        assert_eq!(CommandKind::parse("show_module"), None);
    }

    #[test]
    fn from_value_fills_defaults() {
        let cmd = Command::from_value(&json!({"type": "add_todo", "text": "buy milk"})).unwrap();
        assert_eq!(cmd.kind(), CommandKind::AddTodo);
        assert_eq!(
            cmd.body,
            CommandBody::AddTodo {
                text: "buy milk".to_string(),
                priority: Priority::Normal
            }
        );

        let cmd = Command::from_value(&json!({"type": "show_notification", "message": "hej"})).unwrap();
        match cmd.body {
            CommandBody::ShowNotification { title, level, duration_ms, .. } => {
                assert_eq!(title, "JARVIS");
                assert_eq!(level, NotificationLevel::Info);
                assert_eq!(duration_ms, 5000);
            }
            other => panic!("unexpected body: {other:?}"),
        }
    }

    #[test]
    fn from_value_accepts_action_key_and_aliases() {
        let cmd =
            Command::from_value(&json!({"action": "play_media", "media_action": "pause"})).unwrap();
        assert_eq!(cmd.body, CommandBody::PlayMedia { action: MediaAction::Pause });

        let cmd = Command::from_value(&json!({"action": "search", "query": "rust", "search_type": "web"}))
            .unwrap();
        assert_eq!(
            cmd.body,
            CommandBody::Search {
                query: "rust".to_string(),
                scope: SearchScope::Web
            }
        );

        let cmd = Command::from_value(&json!({"action": "set_volume"})).unwrap();
        assert_eq!(cmd.body, CommandBody::SetVolume { level: 50 });
    }

    #[test]
    fn unknown_type_is_reported() {
        let err = Command::from_value(&json!({"type": "format_disk"})).unwrap_err();
        assert_eq!(err, CommandError::UnknownCommandType("format_disk".to_string()));
        assert_eq!(
            Command::from_value(&json!({"text": "no type"})).unwrap_err(),
            CommandError::MissingType
        );
        assert_eq!(Command::from_value(&json!("open_module")).unwrap_err(), CommandError::MissingType);
    }

    #[test]
    fn invalid_fields_are_rejected() {
        let err = Command::from_value(&json!({"type": "open_module", "module": "weather"})).unwrap_err();
        assert!(matches!(err, CommandError::InvalidPayload { kind: CommandKind::OpenModule, .. }));

        let err = Command::from_value(&json!({"type": "set_volume", "level": 150})).unwrap_err();
        assert!(matches!(err, CommandError::InvalidPayload { kind: CommandKind::SetVolume, .. }));

        let err = Command::from_value(&json!({"type": "set_volume", "level": "loud"})).unwrap_err();
        assert!(matches!(err, CommandError::InvalidPayload { .. }));
    }

    #[test]
    fn metrics_must_be_percentages() {
        let err = Command::from_value(&json!({"type": "update_metrics", "cpu": 500})).unwrap_err();
        assert!(matches!(err, CommandError::InvalidPayload { kind: CommandKind::UpdateMetrics, .. }));
        assert!(err.to_string().contains("'cpu'"));

        let err = Command::from_value(&json!({"type": "update_metrics", "network": -1})).unwrap_err();
        assert!(matches!(err, CommandError::InvalidPayload { kind: CommandKind::UpdateMetrics, .. }));

        let cmd = Command::from_value(&json!({"type": "update_metrics", "cpu": 100, "memory": 0})).unwrap();
        assert_eq!(cmd.kind(), CommandKind::UpdateMetrics);
    }

    #[test]
    fn serialized_command_carries_type_tag_and_timestamp() {
        let cmd = Command::new(CommandBody::SetTheme { theme: Theme::Purple });
        let value = serde_json::to_value(&cmd).unwrap();
        assert_eq!(value["type"], "set_theme");
        assert_eq!(value["theme"], "purple");
        assert!(value["created_at"].is_string());
        assert_eq!(cmd.payload(), json!({"type": "set_theme", "theme": "purple"}));
    }
}
