//! Command Bus: type → handler table, middleware chain and a bounded
//! execution log.

use std::collections::{HashMap, HashSet, VecDeque};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::FutureExt;
use jarvis_config::BusConfig;
use jarvis_core::{Command, CommandKind, CommandResult};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, error, info, warn};

#[async_trait]
pub trait CommandHandler: Send + Sync {
    async fn handle(&self, command: &Command) -> anyhow::Result<Map<String, Value>>;
}

/// Runs before the handler lookup.  An `Err` rejects the command.
#[async_trait]
pub trait Middleware: Send + Sync {
    async fn before(&self, command: &Command) -> anyhow::Result<()>;
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BusError {
    #[error("no handler for {0}")]
    NoHandler(CommandKind),
    #[error("error executing command {kind}: {message}")]
    HandlerFailed { kind: CommandKind, message: String },
    #[error("command {kind} rejected: {message}")]
    Rejected { kind: CommandKind, message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogOutcome {
    Success,
    Error,
}

/// Write-once record of one bus dispatch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionLogEntry {
    pub command_type: CommandKind,
    pub timestamp: DateTime<Utc>,
    pub input: Value,
    pub outcome: LogOutcome,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

pub struct CommandBus {
    handlers: HashMap<CommandKind, Arc<dyn CommandHandler>>,
    middleware: Vec<Arc<dyn Middleware>>,
    log: Mutex<VecDeque<ExecutionLogEntry>>,
    log_capacity: usize,
    critical: HashSet<CommandKind>,
}

impl Default for CommandBus {
    fn default() -> Self {
        Self::from_config(&BusConfig::default())
    }
}

impl CommandBus {
    pub fn new(log_capacity: usize, critical: impl IntoIterator<Item = CommandKind>) -> Self {
        Self {
            handlers: HashMap::new(),
            middleware: Vec::new(),
            log: Mutex::new(VecDeque::new()),
            log_capacity: log_capacity.max(1),
            critical: critical.into_iter().collect(),
        }
    }

    pub fn from_config(config: &BusConfig) -> Self {
        let critical = config.critical_commands.iter().filter_map(|name| {
            let kind = CommandKind::parse(name);
            if kind.is_none() {
                warn!(command = %name, "ignoring unknown critical command type");
            }
            kind
        });
        Self::new(config.log_capacity, critical)
    }

    /// Bind `handler` to `kind`, replacing any earlier binding.
    pub fn register_handler(&mut self, kind: CommandKind, handler: Arc<dyn CommandHandler>) {
        self.handlers.insert(kind, handler);
        debug!(command = %kind, "registered command handler");
    }

    pub fn add_middleware(&mut self, middleware: Arc<dyn Middleware>) {
        self.middleware.push(middleware);
    }

    /// Registered command types, sorted.
    pub fn registered_commands(&self) -> Vec<CommandKind> {
        let mut kinds: Vec<CommandKind> = self.handlers.keys().copied().collect();
        kinds.sort();
        kinds
    }

    pub fn is_critical(&self, kind: CommandKind) -> bool {
        self.critical.contains(&kind)
    }

    async fn dispatch(&self, command: &Command) -> Result<Map<String, Value>, BusError> {
        let kind = command.kind();
        for middleware in &self.middleware {
            middleware
                .before(command)
                .await
                .map_err(|err| BusError::Rejected {
                    kind,
                    message: format!("{err:#}"),
                })?;
        }

        let handler = self.handlers.get(&kind).ok_or(BusError::NoHandler(kind))?;
        match AssertUnwindSafe(handler.handle(command)).catch_unwind().await {
            Ok(outcome) => outcome.map_err(|err| BusError::HandlerFailed {
                kind,
                message: format!("{err:#}"),
            }),
            Err(panic) => Err(BusError::HandlerFailed {
                kind,
                message: panic_message(panic.as_ref()),
            }),
        }
    }

    /// Run one command.  Never fails: every error becomes a
    /// `success: false` result, and every call appends one log entry.
    pub async fn execute(&self, command: &Command) -> CommandResult {
        let kind = command.kind();
        let (result, entry_error) = match self.dispatch(command).await {
            Ok(data) => {
                info!(command = %kind, "command executed");
                (
                    CommandResult::ok(data, format!("Command {kind} executed successfully")),
                    None,
                )
            }
            Err(err) => {
                error!(command = %kind, error = %err, "command failed");
                let message = err.to_string();
                (CommandResult::failure(message.clone()), Some(message))
            }
        };

        self.append_log(ExecutionLogEntry {
            command_type: kind,
            timestamp: Utc::now(),
            input: command.payload(),
            outcome: if entry_error.is_none() {
                LogOutcome::Success
            } else {
                LogOutcome::Error
            },
            error: entry_error,
        });
        result
    }

    /// Run commands in order.  A failed critical command ends the batch.
    pub async fn execute_batch(&self, commands: &[Command]) -> Vec<CommandResult> {
        let mut results = Vec::with_capacity(commands.len());
        for command in commands {
            let result = self.execute(command).await;
            let stop = !result.success && self.is_critical(command.kind());
            results.push(result);
            if stop {
                warn!(command = %command.kind(), "stopping batch after critical failure");
                break;
            }
        }
        results
    }

    fn append_log(&self, entry: ExecutionLogEntry) {
        let mut log = self.log.lock();
        while log.len() >= self.log_capacity {
            log.pop_front();
        }
        log.push_back(entry);
    }

    /// The most recent `limit` entries, oldest first.
    pub fn get_execution_log(&self, limit: usize) -> Vec<ExecutionLogEntry> {
        let log = self.log.lock();
        let skip = log.len().saturating_sub(limit);
        log.iter().skip(skip).cloned().collect()
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("handler panicked: {s}")
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("handler panicked: {s}")
    } else {
        "handler panicked".to_string()
    }
}
