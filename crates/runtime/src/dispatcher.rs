//! End-to-end dispatch: gate → execute → record → fan out.

use std::sync::Arc;
use std::time::Instant;

use jarvis_config::AppConfig;
use jarvis_core::{Command, CommandResult, parse_proposal};
use jarvis_memory::OutcomeStore;
use jarvis_policy::{Blocked, EpsilonGreedy, SafetyGate, SelectorError};
use jarvis_tools::{ToolCall, ToolCallResult, ToolError, ToolErrorKind, ToolRegistry, ToolRouter};
use serde::Serialize;
use serde_json::{Value, json};
use tracing::{debug, info, warn};

use crate::bus::CommandBus;
use crate::events::HubMessage;
use crate::handlers::register_default_handlers;
use crate::hub::Hub;
use crate::metrics::Metrics;

/// What one inbound request turned into.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "result", rename_all = "snake_case")]
pub enum DispatchOutcome {
    Tool(ToolCallResult),
    Commands(Vec<CommandResult>),
}

impl DispatchOutcome {
    pub fn succeeded(&self) -> bool {
        match self {
            Self::Tool(result) => result.ok,
            Self::Commands(results) => results.iter().all(|r| r.success),
        }
    }
}

pub struct Dispatcher {
    bus: Arc<CommandBus>,
    registry: Arc<ToolRegistry>,
    router: ToolRouter,
    gate: SafetyGate,
    selector: EpsilonGreedy,
    store: Arc<dyn OutcomeStore>,
    hub: Arc<Hub>,
    metrics: Metrics,
}

impl Dispatcher {
    pub fn new(
        bus: Arc<CommandBus>,
        registry: Arc<ToolRegistry>,
        gate: SafetyGate,
        selector: EpsilonGreedy,
        store: Arc<dyn OutcomeStore>,
        hub: Arc<Hub>,
    ) -> Self {
        Self {
            bus,
            registry,
            router: ToolRouter::default(),
            gate,
            selector,
            store,
            hub,
            metrics: Metrics::new(),
        }
    }

    /// Standard wiring: HUD handlers on every command type, the built-in
    /// tools, and gate/selector/bus settings from `config`.
    pub fn from_config(config: &AppConfig, store: Arc<dyn OutcomeStore>) -> Self {
        let mut bus = CommandBus::from_config(&config.bus);
        register_default_handlers(&mut bus);
        let selector = EpsilonGreedy::new(Arc::clone(&store), config.selector.epsilon);
        Self::new(
            Arc::new(bus),
            Arc::new(jarvis_tools::default_registry()),
            SafetyGate::from_config(&config.safety),
            selector,
            store,
            Arc::new(Hub::new()),
        )
    }

    pub fn with_router(mut self, router: ToolRouter) -> Self {
        self.router = router;
        self
    }

    pub fn bus(&self) -> &CommandBus {
        &self.bus
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub fn hub(&self) -> &Arc<Hub> {
        &self.hub
    }

    pub fn store(&self) -> &Arc<dyn OutcomeStore> {
        &self.store
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    async fn audit(&self, topic: &str, payload: Value) {
        if let Err(err) = self.store.append_event(topic, payload).await {
            warn!(topic, error = %err, "failed to append audit event");
        }
    }

    async fn publish(&self, message: HubMessage) {
        let report = self.hub.broadcast(&message).await;
        debug!(kind = %message.kind, delivered = report.delivered, dropped = report.removed.len(), "published");
    }

    async fn reject(&self, blocked: &Blocked) {
        self.metrics.record_blocked();
        self.audit(
            "blocked",
            json!({ "action": blocked.action, "risk": blocked.risk, "threshold": blocked.threshold }),
        )
        .await;
        self.publish(HubMessage::blocked(blocked)).await;
    }

    // ── Commands ────────────────────────────────────────────────────────────

    /// Gate and run one command.  A blocked command never reaches the bus.
    pub async fn dispatch_command(&self, command: &Command) -> CommandResult {
        let kind = command.kind();
        if let Err(blocked) = self.gate.check(kind.as_str()) {
            self.reject(&blocked).await;
            return CommandResult::failure(blocked.to_string());
        }

        let started = Instant::now();
        let result = self.bus.execute(command).await;
        self.metrics
            .record_command_latency(started.elapsed().as_secs_f64() * 1000.0);

        self.audit(
            "command",
            json!({
                "type": kind.as_str(),
                "input": command.payload(),
                "success": result.success,
                "message": result.message,
            }),
        )
        .await;
        self.publish(HubMessage::command_result(kind.as_str(), &result))
            .await;
        result
    }

    /// Run commands in order; a failed critical command ends the batch.
    pub async fn dispatch_batch(&self, commands: &[Command]) -> Vec<CommandResult> {
        let mut results = Vec::with_capacity(commands.len());
        for command in commands {
            let result = self.dispatch_command(command).await;
            let stop = !result.success && self.bus.is_critical(command.kind());
            results.push(result);
            if stop {
                warn!(command = %command.kind(), "stopping batch after critical failure");
                break;
            }
        }
        results
    }

    /// Commands from a proposer reply: explicit JSON commands, phrase matches
    /// in the message, then the spoken message itself.
    pub async fn handle_proposal(&self, message: &str, explicit: &[Value]) -> Vec<CommandResult> {
        let commands = parse_proposal(message, explicit);
        self.dispatch_batch(&commands).await
    }

    // ── Tools ───────────────────────────────────────────────────────────────

    /// Gate, validate and run one tool.  Every attempt that reaches a
    /// registered tool is recorded in its counters; blocked calls are not.
    pub async fn call_tool(&self, name: &str, args: &Value) -> ToolCallResult {
        self.metrics.record_tool_call_attempted();
        let tool = self
            .registry
            .get(name)
            .map(|spec| spec.name.clone())
            .unwrap_or_else(|| name.to_string());

        if let Err(blocked) = self.gate.check(&tool.to_lowercase()) {
            self.reject(&blocked).await;
            let err = ToolError::Blocked {
                tool: tool.clone(),
                risk: blocked.risk,
                threshold: blocked.threshold,
            };
            return ToolCallResult::failure(tool, &err);
        }

        let started = Instant::now();
        let result = self.registry.execute(&tool, args).await;
        self.metrics
            .record_tool_call_latency(started.elapsed().as_secs_f64() * 1000.0);

        if result.error == Some(ToolErrorKind::InvalidArgs) {
            self.metrics.record_tool_validation_failed();
        }
        if result.error != Some(ToolErrorKind::UnknownTool) {
            if let Err(err) = self.store.record_tool_outcome(&tool, result.ok).await {
                warn!(tool = %tool, error = %err, "failed to record tool outcome");
            }
        }

        info!(tool = %tool, ok = result.ok, error = ?result.error, "tool call finished");
        self.audit(
            "tool_call",
            json!({
                "tool": tool,
                "args": args,
                "ok": result.ok,
                "error": result.error,
                "message": result.message,
            }),
        )
        .await;
        self.publish(HubMessage::tool_result(&result)).await;
        result
    }

    /// Let the selector choose among `candidates`, then call the winner.
    pub async fn call_best_tool(
        &self,
        candidates: &[String],
        args: &Value,
    ) -> Result<ToolCallResult, SelectorError> {
        // Counters are keyed by the registered name, so candidates must be too.
        let candidates: Vec<String> = candidates
            .iter()
            .map(|name| {
                self.registry
                    .get(name)
                    .map(|spec| spec.name.clone())
                    .unwrap_or_else(|| name.clone())
            })
            .collect();
        let tool = self.selector.pick(&candidates).await?;
        Ok(self.call_tool(&tool, args).await)
    }

    // ── Inbound ─────────────────────────────────────────────────────────────

    /// Accept either `{"tool": .., "args": {..}}` or `{"type": .., ..}`.
    pub async fn handle_inbound(&self, value: &Value) -> DispatchOutcome {
        let is_tool_call = value
            .as_object()
            .is_some_and(|o| o.contains_key("tool") || (o.contains_key("name") && !o.contains_key("type")));
        if is_tool_call {
            return match serde_json::from_value::<ToolCall>(value.clone()) {
                Ok(call) => DispatchOutcome::Tool(self.call_tool(&call.tool, &call.args).await),
                Err(err) => {
                    let err = ToolError::InvalidArgs {
                        tool: String::new(),
                        reason: format!("malformed tool call: {err}"),
                    };
                    DispatchOutcome::Tool(ToolCallResult::failure("", &err))
                }
            };
        }

        match Command::from_value(value) {
            Ok(command) => DispatchOutcome::Commands(vec![self.dispatch_command(&command).await]),
            Err(err) => {
                warn!(error = %err, "rejecting inbound command");
                self.audit("rejected", json!({ "input": value, "error": err.to_string() }))
                    .await;
                DispatchOutcome::Commands(vec![CommandResult::failure(err.to_string())])
            }
        }
    }

    /// Free text: try the rule router first, otherwise fall back to phrase
    /// commands plus a spoken reply.
    pub async fn handle_text(&self, text: &str) -> DispatchOutcome {
        if let Some(call) = self.router.route(text) {
            self.metrics.record_router_hit();
            return DispatchOutcome::Tool(self.call_tool(&call.tool, &call.args).await);
        }
        DispatchOutcome::Commands(self.handle_proposal(text, &[]).await)
    }
}
