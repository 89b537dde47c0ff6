use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Result;
use serde::{Deserialize, Serialize};

// ── Safety gate ──────────────────────────────────────────────────────────────

/// Risk policy applied to every command and tool call before dispatch.
///
/// Scoring is a function of the action's declared type only.  Types listed in
/// `low_risk_types` score `(0.05, 0.6)`; types in `risk_overrides` score the
/// configured risk; everything else scores `(default_risk, default_utility)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SafetyConfig {
    /// Actions whose risk is strictly above this value are blocked.
    pub risk_threshold: f32,
    pub default_risk: f32,
    pub default_utility: f32,
    pub low_risk_types: Vec<String>,
    /// Explicit risk per action type (lowercase).  Takes precedence over
    /// `low_risk_types`.
    pub risk_overrides: BTreeMap<String, f32>,
}

impl Default for SafetyConfig {
    fn default() -> Self {
        Self {
            risk_threshold: 0.8,
            default_risk: 0.2,
            default_utility: 0.5,
            low_risk_types: vec![
                "show_module".to_string(),
                "hide_overlay".to_string(),
                "open_video".to_string(),
            ],
            risk_overrides: BTreeMap::new(),
        }
    }
}

// ── Tool selector ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectorConfig {
    /// Exploration probability for the epsilon-greedy selector.  Values
    /// outside `0.0..=1.0` are clamped when the selector is built.
    pub epsilon: f64,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self { epsilon: 0.1 }
    }
}

// ── Command bus ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    /// Number of execution-log entries kept in memory.  Older entries are
    /// evicted; the outcome store keeps the full audit trail.
    pub log_capacity: usize,
    /// Command types whose failure aborts the rest of a batch.
    pub critical_commands: Vec<String>,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            log_capacity: 500,
            critical_commands: vec!["system_status".to_string(), "voice_response".to_string()],
        }
    }
}

// ── Outcome store ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Directory holding `outcomes.redb` and `events.jsonl`.
    /// Overridden by the `JARVIS_DATA_DIR` environment variable when set.
    pub data_dir: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            data_dir: ".jarvis".to_string(),
        }
    }
}

impl StoreConfig {
    pub fn database_path(&self) -> PathBuf {
        Path::new(&self.data_dir).join("outcomes.redb")
    }

    pub fn event_log_path(&self) -> PathBuf {
        Path::new(&self.data_dir).join("events.jsonl")
    }
}

// ── Broadcast hub ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HubConfig {
    /// Per-subscriber channel buffer for channel-backed subscribers.
    pub subscriber_buffer: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            subscriber_buffer: 64,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    pub log_level: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub safety: SafetyConfig,
    pub selector: SelectorConfig,
    pub bus: BusConfig,
    pub store: StoreConfig,
    pub hub: HubConfig,
    pub telemetry: TelemetryConfig,
}

impl AppConfig {
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let mut config = Self::default();
        if let Ok(raw) = fs::read_to_string(path) {
            config = toml::from_str(&raw)?;
        }

        if let Ok(dir) = env::var("JARVIS_DATA_DIR") {
            if !dir.is_empty() {
                config.store.data_dir = dir;
            }
        }

        // Unparsable values are ignored so a stray env var cannot break startup.
        if let Ok(raw) = env::var("JARVIS_EPSILON") {
            if let Ok(epsilon) = raw.trim().parse::<f64>() {
                config.selector.epsilon = epsilon;
            }
        }

        Ok(config)
    }

    pub fn save_to(&self, path: impl AsRef<Path>) -> Result<()> {
        if let Some(parent) = path.as_ref().parent() {
            fs::create_dir_all(parent)?;
        }

        let rendered = toml::to_string_pretty(self)?;
        fs::write(path, rendered)?;
        Ok(())
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    // ── Safety-critical defaults ──────────────────────────────────────────
    // Changing any of these values should be a deliberate, reviewed decision.

    #[test]
    fn safety_defaults_block_above_point_eight() {
        let cfg = AppConfig::default();
        assert!((cfg.safety.risk_threshold - 0.8).abs() < f32::EPSILON);
        assert!((cfg.safety.default_risk - 0.2).abs() < f32::EPSILON);
        assert!(cfg.safety.low_risk_types.contains(&"show_module".to_string()));
        assert!(cfg.safety.risk_overrides.is_empty());
    }

    #[test]
    fn functional_defaults() {
        let cfg = AppConfig::default();
        assert!((cfg.selector.epsilon - 0.1).abs() < f64::EPSILON);
        assert_eq!(cfg.bus.log_capacity, 500);
        assert_eq!(
            cfg.bus.critical_commands,
            vec!["system_status".to_string(), "voice_response".to_string()]
        );
        assert_eq!(cfg.store.data_dir, ".jarvis");
        assert_eq!(cfg.hub.subscriber_buffer, 64);
        assert_eq!(cfg.telemetry.log_level, "info");
    }

    #[test]
    fn store_paths_live_under_data_dir() {
        let store = StoreConfig {
            data_dir: "/var/lib/jarvis".to_string(),
        };
        assert_eq!(store.database_path(), Path::new("/var/lib/jarvis/outcomes.redb"));
        assert_eq!(store.event_log_path(), Path::new("/var/lib/jarvis/events.jsonl"));
    }

    // ── load_from ──────────────────────────────────────────────────────────

    #[test]
    fn load_from_nonexistent_returns_defaults() {
        let cfg = AppConfig::load_from("/tmp/jarvis-config-does-not-exist.toml").unwrap();
        assert_eq!(cfg.bus.log_capacity, 500);
    }

    #[test]
    fn load_from_full_toml() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            r#"
[safety]
risk_threshold = 0.5
low_risk_types = ["open_module"]

[safety.risk_overrides]
wipe_disk = 0.95

[selector]
epsilon = 0.0

[bus]
log_capacity = 10
critical_commands = ["voice_response"]

[hub]
subscriber_buffer = 8
"#,
        )
        .unwrap();

        let cfg = AppConfig::load_from(&path).unwrap();
        assert!((cfg.safety.risk_threshold - 0.5).abs() < f32::EPSILON);
        assert_eq!(cfg.safety.low_risk_types, vec!["open_module"]);
        assert_eq!(cfg.safety.risk_overrides.get("wipe_disk"), Some(&0.95));
        assert_eq!(cfg.bus.log_capacity, 10);
        assert_eq!(cfg.bus.critical_commands, vec!["voice_response"]);
        assert_eq!(cfg.hub.subscriber_buffer, 8);
        // Unspecified sections keep their defaults.
        assert_eq!(cfg.telemetry.log_level, "info");
        assert!((cfg.safety.default_utility - 0.5).abs() < f32::EPSILON);
    }

    #[test]
    fn load_from_invalid_toml_returns_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.toml");
        fs::write(&path, "this is not valid toml {{{{").unwrap();
        assert!(AppConfig::load_from(&path).is_err());
    }

    // ── save_to + roundtrip ────────────────────────────────────────────────

    #[test]
    fn save_and_reload_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("sub/config.toml");

        let mut cfg = AppConfig::default();
        cfg.safety.risk_overrides.insert("shutdown".to_string(), 0.99);
        cfg.bus.log_capacity = 42;
        cfg.telemetry.log_level = "debug".to_string();

        cfg.save_to(&path).unwrap();
        assert!(path.exists());

        let loaded = AppConfig::load_from(&path).unwrap();
        assert_eq!(loaded.safety.risk_overrides.get("shutdown"), Some(&0.99));
        assert_eq!(loaded.bus.log_capacity, 42);
        assert_eq!(loaded.telemetry.log_level, "debug");
    }

    // ── Env var overrides ──────────────────────────────────────────────────
    // Both env vars are exercised in one test so parallel tests never race on
    // the same variable.

    #[test]
    fn env_overrides_data_dir_and_epsilon() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("env.toml");
        fs::write(&path, "[store]\ndata_dir = \"from-file\"\n").unwrap();

        // SAFETY: no other test touches these variables.
        unsafe {
            env::set_var("JARVIS_DATA_DIR", "/tmp/from-env");
            env::set_var("JARVIS_EPSILON", "0.25");
        }
        let cfg = AppConfig::load_from(&path).unwrap();
        assert_eq!(cfg.store.data_dir, "/tmp/from-env");
        assert!((cfg.selector.epsilon - 0.25).abs() < f64::EPSILON);

        unsafe { env::set_var("JARVIS_EPSILON", "not-a-number") };
        let cfg = AppConfig::load_from(&path).unwrap();
        assert!((cfg.selector.epsilon - 0.1).abs() < f64::EPSILON);

        unsafe {
            env::remove_var("JARVIS_DATA_DIR");
            env::remove_var("JARVIS_EPSILON");
        }
    }
}
