//! HUD command handlers.
//!
//! One controller covers every command variant with an exhaustive match, so a
//! new variant does not compile until it is handled here.  Handlers only build
//! the data the HUD needs; fanning it out is the dispatcher's job.

use std::sync::Arc;

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use chrono::Utc;
use jarvis_core::{Command, CommandBody, CommandKind};
use serde_json::{Map, Value, json};
use sysinfo::{Disks, Networks, System};
use tracing::info;
use uuid::Uuid;

use crate::bus::{CommandBus, CommandHandler};

const DEFAULT_WEATHER_LOCATION: &str = "Göteborg";
const GIB: f64 = 1024.0 * 1024.0 * 1024.0;
const MIB: f64 = 1024.0 * 1024.0;

fn object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

fn round1(x: f64) -> f64 {
    (x * 10.0).round() / 10.0
}

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

/// Host metrics for `system_status`.  Blocking; call off the async runtime.
fn collect_system_status(detailed: bool) -> Value {
    let mut sys = System::new_all();
    sys.refresh_all();
    // CPU usage needs two samples spaced by the minimum interval.
    std::thread::sleep(sysinfo::MINIMUM_CPU_UPDATE_INTERVAL);
    sys.refresh_cpu();

    let cpu = round1(f64::from(sys.global_cpu_info().cpu_usage()));
    let total_mem = sys.total_memory() as f64;
    let used_mem = sys.used_memory() as f64;
    let memory = if total_mem > 0.0 {
        round1(used_mem / total_mem * 100.0)
    } else {
        0.0
    };

    let disks = Disks::new_with_refreshed_list();
    let (disk_total, disk_free) = disks.list().iter().fold((0u64, 0u64), |(t, f), d| {
        (t + d.total_space(), f + d.available_space())
    });
    let disk = if disk_total > 0 {
        round1((disk_total - disk_free) as f64 / disk_total as f64 * 100.0)
    } else {
        0.0
    };

    let status = if cpu < 80.0 && memory < 85.0 {
        "healthy"
    } else {
        "warning"
    };
    let mut data = json!({
        "cpu": cpu,
        "memory": memory,
        "disk": disk,
        "status": status,
    });

    if detailed {
        let networks = Networks::new_with_refreshed_list();
        let (mut sent, mut recv) = (0u64, 0u64);
        for (_name, network) in networks.list() {
            sent += network.total_transmitted();
            recv += network.total_received();
        }
        let boot_time = chrono::DateTime::from_timestamp(System::boot_time() as i64, 0)
            .map(|t| t.to_rfc3339())
            .unwrap_or_default();
        let extra = json!({
            "memory_total": round2(total_mem / GIB),
            "memory_used": round2(used_mem / GIB),
            "disk_total": round2(disk_total as f64 / GIB),
            "disk_free": round2(disk_free as f64 / GIB),
            "network_sent": round2(sent as f64 / MIB),
            "network_recv": round2(recv as f64 / MIB),
            "boot_time": boot_time,
            "uptime_secs": System::uptime(),
        });
        if let (Value::Object(base), Value::Object(extra)) = (&mut data, extra) {
            base.extend(extra);
        }
    }
    data
}

/// Handles every HUD command variant.
#[derive(Debug, Default, Clone)]
pub struct HudController;

impl HudController {
    async fn run(&self, command: &Command) -> Result<Value> {
        let now = Utc::now().to_rfc3339();
        let data = match &command.body {
            CommandBody::OpenModule { module } => json!({
                "action": "module_opened",
                "module": module,
            }),
            CommandBody::CloseModule => json!({ "action": "module_closed" }),
            CommandBody::SystemStatus { detailed } => {
                let detailed = *detailed;
                let metrics = tokio::task::spawn_blocking(move || collect_system_status(detailed))
                    .await
                    .context("system metrics collection panicked")?;
                json!({ "action": "system_status", "detailed": detailed, "data": metrics })
            }
            CommandBody::AddTodo { text, priority } => {
                let text = text.trim();
                if text.is_empty() {
                    bail!("todo text cannot be empty");
                }
                json!({
                    "action": "todo_added",
                    "todo": {
                        "id": format!("todo_{}", Uuid::new_v4().simple()),
                        "text": text,
                        "priority": priority,
                        "done": false,
                        "created_at": now,
                    }
                })
            }
            CommandBody::ToggleTodo { todo_id } => {
                if todo_id.trim().is_empty() {
                    bail!("todo id cannot be empty");
                }
                json!({ "action": "todo_toggled", "todo_id": todo_id })
            }
            CommandBody::SetTheme { theme } => json!({
                "action": "theme_changed",
                "theme": theme,
            }),
            CommandBody::ShowWeather { location } => {
                let location = location
                    .as_deref()
                    .map(str::trim)
                    .filter(|l| !l.is_empty())
                    .unwrap_or(DEFAULT_WEATHER_LOCATION);
                json!({ "action": "weather_requested", "location": location })
            }
            CommandBody::PlayMedia { action } => json!({
                "action": "media",
                "media": { "action": action, "timestamp": now },
            }),
            CommandBody::SetVolume { level } => json!({
                "action": "volume_set",
                "level": level,
            }),
            CommandBody::ShowNotification {
                title,
                message,
                level,
                duration_ms,
            } => json!({
                "action": "notification",
                "notification": {
                    "id": format!("notif_{}", Uuid::new_v4().simple()),
                    "title": title,
                    "message": message,
                    "type": level,
                    "duration_ms": duration_ms,
                    "timestamp": now,
                }
            }),
            CommandBody::VoiceResponse { text, voice } => {
                if text.trim().is_empty() {
                    bail!("voice response text cannot be empty");
                }
                json!({
                    "action": "voice_response",
                    "voice": { "text": text, "voice": voice, "timestamp": now },
                })
            }
            CommandBody::AnimateElement {
                element,
                animation,
                duration_ms,
            } => json!({
                "action": "animation",
                "animation": {
                    "element": element,
                    "animation": animation,
                    "duration_ms": duration_ms,
                },
            }),
            CommandBody::UpdateMetrics {
                cpu,
                memory,
                network,
            } => json!({
                "action": "metrics_updated",
                "metrics": { "cpu": cpu, "memory": memory, "network": network },
            }),
            CommandBody::Search { query, scope } => {
                if query.trim().is_empty() {
                    bail!("search query cannot be empty");
                }
                json!({ "action": "search", "query": query.trim(), "scope": scope })
            }
        };
        Ok(data)
    }
}

#[async_trait]
impl CommandHandler for HudController {
    async fn handle(&self, command: &Command) -> Result<Map<String, Value>> {
        let data = self.run(command).await?;
        info!(command = %command.kind(), "hud command handled");
        Ok(object(data))
    }
}

/// Bind [`HudController`] to every command type.
pub fn register_default_handlers(bus: &mut CommandBus) {
    let controller: Arc<dyn CommandHandler> = Arc::new(HudController);
    for kind in CommandKind::ALL {
        bus.register_handler(kind, Arc::clone(&controller));
    }
}

#[cfg(test)]
mod tests {
    use jarvis_core::{HudModule, MediaAction, Priority, Theme};

    use super::*;

    async fn handle(body: CommandBody) -> Result<Map<String, Value>> {
        HudController.handle(&Command::new(body)).await
    }

    #[tokio::test]
    async fn open_module_reports_module() {
        let data = handle(CommandBody::OpenModule {
            module: HudModule::Calendar,
        })
        .await
        .unwrap();
        assert_eq!(data["action"], "module_opened");
        assert_eq!(data["module"], "calendar");
    }

    #[tokio::test]
    async fn add_todo_trims_and_rejects_blank() {
        let data = handle(CommandBody::AddTodo {
            text: "  buy milk ".into(),
            priority: Priority::High,
        })
        .await
        .unwrap();
        assert_eq!(data["todo"]["text"], "buy milk");
        assert_eq!(data["todo"]["priority"], "high");
        assert_eq!(data["todo"]["done"], false);

        let err = handle(CommandBody::AddTodo {
            text: "   ".into(),
            priority: Priority::Normal,
        })
        .await
        .unwrap_err();
        assert!(err.to_string().contains("empty"));
    }

    #[tokio::test]
    async fn weather_defaults_location() {
        let data = handle(CommandBody::ShowWeather { location: None }).await.unwrap();
        assert_eq!(data["location"], "Göteborg");
        let data = handle(CommandBody::ShowWeather {
            location: Some("Malmö".into()),
        })
        .await
        .unwrap();
        assert_eq!(data["location"], "Malmö");
    }

    #[tokio::test]
    async fn theme_and_media_serialize_lowercase() {
        let data = handle(CommandBody::SetTheme { theme: Theme::Purple }).await.unwrap();
        assert_eq!(data["theme"], "purple");
        let data = handle(CommandBody::PlayMedia {
            action: MediaAction::Previous,
        })
        .await
        .unwrap();
        assert_eq!(data["media"]["action"], "previous");
    }

    #[tokio::test]
    async fn system_status_reports_health() {
        let data = handle(CommandBody::SystemStatus { detailed: true }).await.unwrap();
        let metrics = &data["data"];
        assert!(metrics["cpu"].is_number());
        assert!(metrics["memory"].is_number());
        assert!(matches!(metrics["status"].as_str(), Some("healthy" | "warning")));
        assert!(metrics.get("memory_total").is_some());
    }

    #[test]
    fn every_command_type_gets_a_handler() {
        let mut bus = CommandBus::default();
        register_default_handlers(&mut bus);
        assert_eq!(bus.registered_commands().len(), CommandKind::ALL.len());
    }
}
