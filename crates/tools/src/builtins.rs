//! Built-in media and HUD tools.
//!
//! Executors are pure: they echo the validated request back as the result the
//! transport layer forwards to the HUD.  Actual playback happens outside this
//! workspace.

use serde_json::{Map, Value, json};

use crate::{ArgSchema, ParamType, ToolParam, ToolRegistry, ToolSpec};

fn status_tool(name: &str, description: &str, result: Value) -> ToolSpec {
    ToolSpec::new(name, description, ArgSchema::empty(), move |_| {
        let result = result.clone();
        async move { Ok(result) }
    })
}

fn set_volume() -> ToolSpec {
    let schema = ArgSchema::new(vec![
        ToolParam::optional("level", "Target level 0-100")
            .of_type(ParamType::Integer)
            .range(0.0, 100.0),
        ToolParam::optional("delta", "Relative adjustment -100..100")
            .of_type(ParamType::Integer)
            .range(-100.0, 100.0),
    ])
    .require_any(&["level", "delta"]);

    ToolSpec::new(
        "SET_VOLUME",
        "Set the volume (level 0-100) or adjust it (delta -100..100)",
        schema,
        |args| async move {
            Ok(json!({
                "level": args.get("level").cloned().unwrap_or(Value::Null),
                "delta": args.get("delta").cloned().unwrap_or(Value::Null),
            }))
        },
    )
}

fn text_tool(name: &str, description: &str, max_len: usize, key: &'static str) -> ToolSpec {
    let schema = ArgSchema::new(vec![
        ToolParam::required("text", format!("Text, 1-{max_len} characters")).length(1, max_len),
    ]);
    ToolSpec::new(name, description, schema, move |args| async move {
        let mut result = Map::new();
        result.insert(key.to_string(), args.get("text").cloned().unwrap_or(Value::Null));
        Ok(Value::Object(result))
    })
}

/// Every built-in tool, in registration order.
pub fn builtin_tools() -> Vec<ToolSpec> {
    vec![
        status_tool("PLAY", "Start or resume playback", json!({"status": "playing"})),
        status_tool("PAUSE", "Pause playback", json!({"status": "paused"})),
        status_tool("STOP", "Stop playback", json!({"status": "stopped"})),
        status_tool("NEXT", "Skip to the next track", json!({"status": "next"})),
        status_tool("PREV", "Go back to the previous track", json!({"status": "previous"})),
        status_tool("MUTE", "Mute audio output", json!({"muted": true})),
        status_tool("UNMUTE", "Unmute audio output", json!({"muted": false})),
        set_volume(),
        text_tool("SAY", "Say a short phrase (speech or text reply)", 500, "spoken"),
        text_tool("DISPLAY", "Show a short text on the HUD", 1000, "shown"),
    ]
}

/// A registry pre-loaded with [`builtin_tools`].
pub fn default_registry() -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    for spec in builtin_tools() {
        registry.register(spec);
    }
    registry
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ToolErrorKind;

    #[tokio::test]
    async fn set_volume_rejects_out_of_range_level() {
        let reg = default_registry();
        let res = reg.execute("SET_VOLUME", &json!({"level": 150})).await;
        assert!(!res.ok);
        assert_eq!(res.error, Some(ToolErrorKind::InvalidArgs));
    }

    #[tokio::test]
    async fn set_volume_echoes_level_with_null_delta() {
        let reg = default_registry();
        let res = reg.execute("SET_VOLUME", &json!({"level": 30})).await;
        assert!(res.ok);
        assert_eq!(res.result, Some(json!({"level": 30, "delta": null})));
    }

    #[tokio::test]
    async fn set_volume_needs_level_or_delta() {
        let reg = default_registry();
        let res = reg.execute("SET_VOLUME", &json!({})).await;
        assert_eq!(res.error, Some(ToolErrorKind::InvalidArgs));
        let res = reg.execute("set_volume", &json!({"delta": -100})).await;
        assert!(res.ok);
        assert_eq!(res.tool, "SET_VOLUME");
    }

    #[tokio::test]
    async fn say_and_display_enforce_length() {
        let reg = default_registry();
        let res = reg.execute("SAY", &json!({"text": "Hej"})).await;
        assert_eq!(res.result, Some(json!({"spoken": "Hej"})));

        let res = reg.execute("SAY", &json!({"text": ""})).await;
        assert_eq!(res.error, Some(ToolErrorKind::InvalidArgs));

        let long = "x".repeat(501);
        assert!(!reg.execute("SAY", &json!({"text": long})).await.ok);
        assert!(reg.execute("DISPLAY", &json!({"text": long})).await.ok);
    }

    #[tokio::test]
    async fn status_tools_ignore_args() {
        let reg = default_registry();
        let res = reg.execute("play", &json!({"volume": 3})).await;
        assert_eq!(res.result, Some(json!({"status": "playing"})));
        let res = reg.execute("MUTE", &Value::Null).await;
        assert_eq!(res.result, Some(json!({"muted": true})));
    }

    #[test]
    fn registry_holds_every_builtin() {
        let reg = default_registry();
        assert_eq!(
            reg.names(),
            vec![
                "DISPLAY", "MUTE", "NEXT", "PAUSE", "PLAY", "PREV", "SAY", "SET_VOLUME", "STOP",
                "UNMUTE"
            ]
        );
    }
}
