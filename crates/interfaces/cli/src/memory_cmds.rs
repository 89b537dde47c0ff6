use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result, bail};
use uuid::Uuid;

use jarvis_memory::{Feedback, OutcomeStore, export_dataset};

pub(crate) async fn run_tool_stats(store: &dyn OutcomeStore) -> Result<()> {
    let mut stats = store.all_tool_stats().await?;
    stats.sort_by(|a, b| a.tool.cmp(&b.tool));

    println!("── tool outcomes ────────────────────────────────────");
    if stats.is_empty() {
        println!("  (no tool calls recorded yet)");
        return Ok(());
    }
    for row in &stats {
        println!(
            "  {:<12} ok={:<5} fail={:<5} rate={:.2}",
            row.tool,
            row.success_count,
            row.fail_count,
            row.success_rate()
        );
    }
    println!("  ({} tools total)", stats.len());
    Ok(())
}

fn parse_tags(raw: &[String]) -> Result<BTreeMap<String, String>> {
    raw.iter()
        .map(|pair| match pair.split_once('=') {
            Some((k, v)) if !k.trim().is_empty() => Ok((k.trim().to_string(), v.trim().to_string())),
            _ => bail!("tags must be key=value, got '{pair}'"),
        })
        .collect()
}

pub(crate) async fn run_memory_add(
    store: &dyn OutcomeStore,
    text: &str,
    score: f64,
    tags: &[String],
) -> Result<()> {
    let tags = parse_tags(tags)?;
    let id = store.upsert_memory(text, score, tags).await?;
    println!("{id}");
    Ok(())
}

pub(crate) async fn run_memory_search(store: &dyn OutcomeStore, query: &str, limit: usize) -> Result<()> {
    let hits = store.retrieve_memories(query, limit).await?;
    println!("memories matching '{query}' ({})", hits.len());
    for (index, memory) in hits.iter().enumerate() {
        println!(
            "{}. [{:+.1}] {} ({})",
            index + 1,
            memory.score,
            memory.text,
            memory.id
        );
    }
    Ok(())
}

pub(crate) async fn run_memory_feedback(store: &dyn OutcomeStore, id: &str, vote: &str) -> Result<()> {
    let id = Uuid::parse_str(id.trim()).with_context(|| format!("invalid memory id '{id}'"))?;
    let Some(feedback) = Feedback::parse(vote) else {
        bail!("feedback must be 'up' or 'down', got '{vote}'");
    };
    let score = store.feedback(id, feedback).await?;
    println!("memory {id} score is now {score:+.1}");
    Ok(())
}

pub(crate) async fn run_event_log(store: &dyn OutcomeStore, limit: usize) -> Result<()> {
    let events = store.load_events().await?;
    let skip = events.len().saturating_sub(limit);
    for event in events.iter().skip(skip) {
        println!(
            "{} {:<10} {}",
            event.occurred_at.to_rfc3339(),
            event.topic,
            event.payload
        );
    }
    Ok(())
}

pub(crate) async fn run_export(store: &dyn OutcomeStore, path: &Path) -> Result<()> {
    let summary = export_dataset(store, path).await?;
    println!("dataset export complete: {}", path.display());
    println!("- events: {}", summary.events);
    println!("- memories: {}", summary.memories);
    println!("- tool stats: {}", summary.tool_stats);
    Ok(())
}
