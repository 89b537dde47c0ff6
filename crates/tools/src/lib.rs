use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

pub mod builtins;
pub mod router;
pub mod schema;

pub use builtins::{builtin_tools, default_registry};
pub use router::{ToolRouter, extract_volume_slots, normalize};
pub use schema::{ArgSchema, ParamType, ToolParam};

// ── Tool capability record ───────────────────────────────────────────────────

/// Executor behind a tool.  It only ever receives arguments that already
/// passed the tool's [`ArgSchema`].
pub type ToolFn =
    Arc<dyn Fn(Map<String, Value>) -> BoxFuture<'static, anyhow::Result<Value>> + Send + Sync>;

/// A registered tool: name, human description, argument contract and
/// executor.  Adding a tool is a [`ToolRegistry::register`] call.
#[derive(Clone)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub schema: ArgSchema,
    pub executor: ToolFn,
}

impl ToolSpec {
    pub fn new<F, Fut>(
        name: impl Into<String>,
        description: impl Into<String>,
        schema: ArgSchema,
        executor: F,
    ) -> Self
    where
        F: Fn(Map<String, Value>) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = anyhow::Result<Value>> + Send + 'static,
    {
        Self {
            name: canonical_name(&name.into()),
            description: description.into(),
            schema,
            executor: Arc::new(move |args| executor(args).boxed()),
        }
    }

    pub fn describe(&self) -> ToolDescription {
        ToolDescription {
            name: self.name.clone(),
            description: self.description.clone(),
            schema: self.schema.to_json_schema(),
        }
    }
}

impl std::fmt::Debug for ToolSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolSpec")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("schema", &self.schema)
            .finish_non_exhaustive()
    }
}

/// The discovery view of a tool, as handed to an external proposer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDescription {
    pub name: String,
    pub description: String,
    pub schema: Value,
}

impl ToolDescription {
    /// Generate the OpenAI-compatible `tools` array element for this tool.
    ///
    /// ```json
    /// {
    ///   "type": "function",
    ///   "function": { "name": "SET_VOLUME", "description": "...", "parameters": { ... } }
    /// }
    /// ```
    pub fn to_openai_tool_schema(&self) -> Value {
        serde_json::json!({
            "type": "function",
            "function": {
                "name": self.name,
                "description": self.description,
                "parameters": self.schema,
            }
        })
    }
}

/// Convert a slice of descriptions into the `tools` JSON array accepted by
/// OpenAI-compatible chat endpoints.
pub fn specs_to_openai_tools(specs: &[ToolDescription]) -> Value {
    Value::Array(specs.iter().map(|s| s.to_openai_tool_schema()).collect())
}

fn canonical_name(name: &str) -> String {
    name.trim().to_ascii_uppercase()
}

// ── Errors and results ───────────────────────────────────────────────────────

/// Wire name of a tool failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolErrorKind {
    UnknownTool,
    InvalidArgs,
    ExecutionFailed,
    Blocked,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ToolError {
    #[error("unknown tool: {0}")]
    UnknownTool(String),
    #[error("{reason}")]
    InvalidArgs { tool: String, reason: String },
    #[error("{message}")]
    ExecutionFailed { tool: String, message: String },
    #[error("blocked by safety gate (risk {risk:.2} > {threshold:.2})")]
    Blocked {
        tool: String,
        risk: f32,
        threshold: f32,
    },
}

impl ToolError {
    pub fn kind(&self) -> ToolErrorKind {
        match self {
            Self::UnknownTool(_) => ToolErrorKind::UnknownTool,
            Self::InvalidArgs { .. } => ToolErrorKind::InvalidArgs,
            Self::ExecutionFailed { .. } => ToolErrorKind::ExecutionFailed,
            Self::Blocked { .. } => ToolErrorKind::Blocked,
        }
    }
}

/// Outcome of one tool call.  Exactly one of `result` / `error` is set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallResult {
    pub ok: bool,
    pub tool: String,
    pub result: Option<Value>,
    pub error: Option<ToolErrorKind>,
    pub message: Option<String>,
}

impl ToolCallResult {
    pub fn success(tool: impl Into<String>, result: Value) -> Self {
        Self {
            ok: true,
            tool: tool.into(),
            result: Some(result),
            error: None,
            message: None,
        }
    }

    pub fn failure(tool: impl Into<String>, err: &ToolError) -> Self {
        Self {
            ok: false,
            tool: tool.into(),
            result: None,
            error: Some(err.kind()),
            message: Some(err.to_string()),
        }
    }
}

/// An inbound tool call from a proposer.  `name` is accepted as an alias of
/// `tool`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    #[serde(alias = "name")]
    pub tool: String,
    #[serde(default)]
    pub args: Value,
}

impl ToolCall {
    pub fn new(tool: impl Into<String>, args: Value) -> Self {
        Self {
            tool: tool.into(),
            args,
        }
    }
}

// ── Registry ─────────────────────────────────────────────────────────────────

/// Single source of truth for which tools exist.  Names are matched
/// case-insensitively and stored upper-case.
#[derive(Default, Clone)]
pub struct ToolRegistry {
    tools: BTreeMap<String, ToolSpec>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a tool.  A later registration with the same name replaces the
    /// earlier one.
    pub fn register(&mut self, spec: ToolSpec) {
        let name = canonical_name(&spec.name);
        if self.tools.contains_key(&name) {
            info!(tool = %name, "replacing registered tool");
        } else {
            debug!(tool = %name, "registered tool");
        }
        let spec = ToolSpec {
            name: name.clone(),
            ..spec
        };
        self.tools.insert(name, spec);
    }

    /// Discovery view of every tool, sorted by name.
    pub fn list_specs(&self) -> Vec<ToolDescription> {
        self.tools.values().map(ToolSpec::describe).collect()
    }

    pub fn get(&self, name: &str) -> Option<&ToolSpec> {
        self.tools.get(&canonical_name(name))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn names(&self) -> Vec<String> {
        self.tools.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Validate `args` against the tool's schema only, without running it.
    pub fn validate(&self, name: &str, args: &Value) -> Result<Map<String, Value>, ToolError> {
        let spec = self
            .get(name)
            .ok_or_else(|| ToolError::UnknownTool(name.to_string()))?;
        let args = match args {
            Value::Null => Map::new(),
            Value::Object(map) => map.clone(),
            other => {
                return Err(ToolError::InvalidArgs {
                    tool: spec.name.clone(),
                    reason: format!("arguments must be an object, got {}", json_type(other)),
                });
            }
        };
        spec.schema
            .validate(&args)
            .map_err(|reason| ToolError::InvalidArgs {
                tool: spec.name.clone(),
                reason,
            })
    }

    /// Validate and run a tool, returning the executor output or a typed
    /// failure.  Executor errors and panics both become `ExecutionFailed`.
    pub async fn invoke(&self, name: &str, args: &Value) -> Result<Value, ToolError> {
        let clean = self.validate(name, args)?;
        let spec = self
            .get(name)
            .ok_or_else(|| ToolError::UnknownTool(name.to_string()))?;

        let executor = Arc::clone(&spec.executor);
        let started = std::panic::catch_unwind(AssertUnwindSafe(move || executor(clean)));
        let outcome = match started {
            Ok(future) => AssertUnwindSafe(future).catch_unwind().await,
            Err(panic) => Err(panic),
        };

        match outcome {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(err)) => Err(ToolError::ExecutionFailed {
                tool: spec.name.clone(),
                message: format!("{err:#}"),
            }),
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                warn!(tool = %spec.name, %message, "tool executor panicked");
                Err(ToolError::ExecutionFailed {
                    tool: spec.name.clone(),
                    message,
                })
            }
        }
    }

    /// Run a tool and project the outcome into a [`ToolCallResult`].  Never
    /// fails; the caller is responsible for recording the outcome.
    pub async fn execute(&self, name: &str, args: &Value) -> ToolCallResult {
        let tool = self
            .get(name)
            .map(|spec| spec.name.clone())
            .unwrap_or_else(|| name.to_string());
        match self.invoke(name, args).await {
            Ok(value) => ToolCallResult::success(tool, value),
            Err(err) => {
                debug!(tool = %tool, error = %err, "tool call failed");
                ToolCallResult::failure(tool, &err)
            }
        }
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("executor panicked: {s}")
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("executor panicked: {s}")
    } else {
        "executor panicked".to_string()
    }
}

// ── ToolRegistry tests ───────────────────────────────────────────────────────

#[cfg(test)]
mod registry_tests {
    use super::*;
    use serde_json::json;

    fn echo_tool(name: &str) -> ToolSpec {
        ToolSpec::new(
            name,
            format!("Echo tool: {name}"),
            ArgSchema::new(vec![ToolParam::required("input", "test param")]),
            |args| async move { Ok(Value::Object(args)) },
        )
    }

    #[test]
    fn empty_registry() {
        let reg = ToolRegistry::default();
        assert!(reg.list_specs().is_empty());
        assert!(reg.get("anything").is_none());
    }

    #[test]
    fn names_are_case_insensitive() {
        let mut reg = ToolRegistry::new();
        reg.register(echo_tool("echo"));
        assert!(reg.contains("ECHO"));
        assert!(reg.contains(" Echo "));
        assert_eq!(reg.names(), vec!["ECHO".to_string()]);
    }

    #[test]
    fn later_registration_wins() {
        let mut reg = ToolRegistry::new();
        reg.register(echo_tool("dup"));
        reg.register(ToolSpec::new(
            "DUP",
            "second",
            ArgSchema::empty(),
            |_| async { Ok(json!("second")) },
        ));
        assert_eq!(reg.len(), 1);
        assert_eq!(reg.get("dup").unwrap().description, "second");
    }

    #[test]
    fn list_specs_is_sorted_and_stable() {
        let mut reg = ToolRegistry::new();
        reg.register(echo_tool("two"));
        reg.register(echo_tool("one"));
        let first = reg.list_specs();
        let names: Vec<&str> = first.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["ONE", "TWO"]);
        assert_eq!(first, reg.list_specs());
        assert_eq!(first[0].schema["required"], json!(["input"]));
    }

    #[tokio::test]
    async fn execute_success_carries_output() {
        let mut reg = ToolRegistry::new();
        reg.register(echo_tool("echo"));
        let res = reg.execute("echo", &json!({"input": "hi", "extra": 1})).await;
        assert!(res.ok);
        assert_eq!(res.tool, "ECHO");
        assert_eq!(res.result, Some(json!({"input": "hi"})));
        assert!(res.error.is_none());
        assert!(res.message.is_none());
    }

    #[tokio::test]
    async fn unknown_tool_is_reported() {
        let reg = ToolRegistry::new();
        let res = reg.execute("NOPE", &json!({})).await;
        assert!(!res.ok);
        assert_eq!(res.tool, "NOPE");
        assert_eq!(res.error, Some(ToolErrorKind::UnknownTool));
        assert!(res.result.is_none());
    }

    #[tokio::test]
    async fn non_object_args_are_invalid() {
        let mut reg = ToolRegistry::new();
        reg.register(echo_tool("echo"));
        let res = reg.execute("echo", &json!([1, 2])).await;
        assert_eq!(res.error, Some(ToolErrorKind::InvalidArgs));
        assert!(res.message.unwrap().contains("array"));
    }

    #[tokio::test]
    async fn executor_error_becomes_execution_failed() {
        let mut reg = ToolRegistry::new();
        reg.register(ToolSpec::new("broken", "fails", ArgSchema::empty(), |_| async {
            anyhow::bail!("speaker unplugged")
        }));
        let res = reg.execute("broken", &Value::Null).await;
        assert_eq!(res.error, Some(ToolErrorKind::ExecutionFailed));
        assert_eq!(res.message.as_deref(), Some("speaker unplugged"));
    }

    #[tokio::test]
    async fn executor_panic_is_contained() {
        let mut reg = ToolRegistry::new();
        reg.register(ToolSpec::new("panicky", "panics", ArgSchema::empty(), |_| async {
            if true {
                panic!("boom");
            }
            Ok(Value::Null)
        }));
        let res = reg.execute("panicky", &json!({})).await;
        assert_eq!(res.error, Some(ToolErrorKind::ExecutionFailed));
        assert!(res.message.unwrap().contains("boom"));
    }

    #[test]
    fn error_kinds_serialize_snake_case() {
        let err = ToolError::InvalidArgs {
            tool: "X".into(),
            reason: "bad".into(),
        };
        let value = serde_json::to_value(ToolCallResult::failure("X", &err)).unwrap();
        assert_eq!(
            value,
            json!({"ok": false, "tool": "X", "result": null, "error": "invalid_args", "message": "bad"})
        );
    }

    #[test]
    fn tool_call_accepts_name_alias() {
        let call: ToolCall = serde_json::from_value(json!({"name": "PLAY"})).unwrap();
        assert_eq!(call.tool, "PLAY");
        assert_eq!(call.args, Value::Null);
    }

    #[test]
    fn openai_export_wraps_schema() {
        let mut reg = ToolRegistry::new();
        reg.register(echo_tool("echo"));
        let tools = specs_to_openai_tools(&reg.list_specs());
        assert_eq!(tools[0]["type"], "function");
        assert_eq!(tools[0]["function"]["name"], "ECHO");
        assert_eq!(tools[0]["function"]["parameters"]["type"], "object");
    }
}
