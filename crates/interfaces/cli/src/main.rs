mod memory_cmds;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use serde_json::{Map, Value};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;
use tracing_subscriber::EnvFilter;

use jarvis_config::AppConfig;
use jarvis_memory::{InMemoryOutcomeStore, OutcomeStore, RedbOutcomeStore};
use jarvis_runtime::Dispatcher;

#[derive(Debug, Parser)]
#[command(
    name = "jarvis",
    version,
    about = "Command dispatch core for the JARVIS HUD"
)]
struct Cli {
    /// Path to the TOML configuration.
    #[arg(long, global = true, default_value = "config/default.toml")]
    config: PathBuf,
    /// Keep outcomes and events in memory only; nothing touches the data dir.
    #[arg(long, global = true)]
    ephemeral: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Print every registered tool as an OpenAI-style `tools` array.
    Tools,
    /// Call a tool directly.
    /// Example: jarvis call SET_VOLUME level=40   or   jarvis call SAY '{"text":"hej"}'
    Call {
        name: String,
        /// A JSON object, or key=value pairs.
        #[arg(trailing_var_arg = true)]
        args: Vec<String>,
    },
    /// Dispatch one command given as JSON, e.g. '{"type":"open_module","module":"calendar"}'.
    Command { json: String },
    /// Treat text as a spoken request: route to a tool or derive commands.
    Say {
        #[arg(trailing_var_arg = true, required = true)]
        text: Vec<String>,
    },
    /// Read JSON or text lines from stdin and print every hub message.
    Run,
    /// Per-tool success and failure counters.
    Stats,
    Memory {
        #[command(subcommand)]
        command: MemoryCommands,
    },
    /// Show the most recent audit events.
    Log {
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// Write events, memories and tool stats as JSONL.
    Export { path: PathBuf },
}

#[derive(Debug, Subcommand)]
enum MemoryCommands {
    /// Store a memory.
    Add {
        text: String,
        #[arg(long, default_value_t = 0.0)]
        score: f64,
        /// Tags as key=value.
        #[arg(long = "tag")]
        tags: Vec<String>,
    },
    /// Memories containing the query, best first.
    Search {
        query: String,
        #[arg(long, default_value_t = 5)]
        limit: usize,
    },
    /// Rate a memory up or down.
    Feedback { id: String, vote: String },
}

fn init_tracing(config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.telemetry.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn open_store(config: &AppConfig, ephemeral: bool) -> Result<Arc<dyn OutcomeStore>> {
    if ephemeral {
        return Ok(Arc::new(InMemoryOutcomeStore::new()));
    }
    let store = RedbOutcomeStore::open(
        config.store.database_path(),
        config.store.event_log_path(),
    )
    .with_context(|| format!("failed to open outcome store in {}", config.store.data_dir))?;
    Ok(Arc::new(store))
}

/// `{"a":1}` is taken as-is; otherwise every argument must be `key=value`,
/// where the value is read as JSON when it parses and as a string otherwise.
fn parse_tool_args(args: &[String]) -> Result<Value> {
    if let [single] = args {
        if single.trim_start().starts_with('{') {
            return serde_json::from_str(single).context("tool arguments are not valid JSON");
        }
    }
    let mut map = Map::new();
    for pair in args {
        let Some((key, raw)) = pair.split_once('=') else {
            bail!("expected key=value, got '{pair}'");
        };
        let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
        map.insert(key.trim().to_string(), value);
    }
    Ok(Value::Object(map))
}

fn print_json(value: &impl serde::Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn run_stdin_loop(dispatcher: &Dispatcher, buffer: usize) -> Result<()> {
    let (id, mut rx) = dispatcher.hub().connect(buffer);
    let printer = tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            println!("{}", message.to_line());
        }
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<Value>(line) {
            Ok(value @ Value::Object(_)) => {
                dispatcher.handle_inbound(&value).await;
            }
            _ => {
                dispatcher.handle_text(line).await;
            }
        }
    }

    dispatcher.hub().unsubscribe(id);
    printer.await?;
    info!(metrics = ?dispatcher.metrics().snapshot(), "input closed");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let config = AppConfig::load_from(&cli.config)?;
    init_tracing(&config);

    let store = open_store(&config, cli.ephemeral)?;
    let dispatcher = Dispatcher::from_config(&config, Arc::clone(&store));

    match cli.command {
        Commands::Tools => {
            let specs = dispatcher.registry().list_specs();
            print_json(&jarvis_tools::specs_to_openai_tools(&specs))?;
        }
        Commands::Call { name, args } => {
            let args = parse_tool_args(&args)?;
            print_json(&dispatcher.call_tool(&name, &args).await)?;
        }
        Commands::Command { json } => {
            let value: Value = serde_json::from_str(&json).context("command is not valid JSON")?;
            print_json(&dispatcher.handle_inbound(&value).await)?;
        }
        Commands::Say { text } => {
            print_json(&dispatcher.handle_text(&text.join(" ")).await)?;
        }
        Commands::Run => run_stdin_loop(&dispatcher, config.hub.subscriber_buffer).await?,
        Commands::Stats => memory_cmds::run_tool_stats(store.as_ref()).await?,
        Commands::Memory { command } => match command {
            MemoryCommands::Add { text, score, tags } => {
                memory_cmds::run_memory_add(store.as_ref(), &text, score, &tags).await?
            }
            MemoryCommands::Search { query, limit } => {
                memory_cmds::run_memory_search(store.as_ref(), &query, limit.max(1)).await?
            }
            MemoryCommands::Feedback { id, vote } => {
                memory_cmds::run_memory_feedback(store.as_ref(), &id, &vote).await?
            }
        },
        Commands::Log { limit } => memory_cmds::run_event_log(store.as_ref(), limit).await?,
        Commands::Export { path } => memory_cmds::run_export(store.as_ref(), &path).await?,
    }

    Ok(())
}
