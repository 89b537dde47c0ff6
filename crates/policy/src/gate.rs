//! Risk scoring ahead of dispatch.
//!
//! The gate only scores.  Callers decide to block by asking [`SafetyGate::check`]
//! before running anything.

use std::collections::{BTreeMap, HashSet};

use jarvis_config::SafetyConfig;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

const LOW_RISK: RiskScore = RiskScore {
    risk: 0.05,
    utility: 0.6,
};

/// Risk and utility estimates, both in `0.0..=1.0`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RiskScore {
    pub risk: f32,
    pub utility: f32,
}

/// A pluggable scoring function.  Implementations must be deterministic for a
/// given action type.
pub trait RiskPolicy: Send + Sync {
    fn score(&self, action_type: &str) -> RiskScore;
}

/// Scores purely from the action's declared type; payload is never looked at.
#[derive(Debug, Clone)]
pub struct TypeRiskPolicy {
    low_risk: HashSet<String>,
    overrides: BTreeMap<String, f32>,
    default: RiskScore,
}

impl TypeRiskPolicy {
    pub fn from_config(config: &SafetyConfig) -> Self {
        Self {
            low_risk: config
                .low_risk_types
                .iter()
                .map(|t| t.trim().to_lowercase())
                .collect(),
            overrides: config
                .risk_overrides
                .iter()
                .map(|(t, risk)| (t.trim().to_lowercase(), risk.clamp(0.0, 1.0)))
                .collect(),
            default: RiskScore {
                risk: config.default_risk.clamp(0.0, 1.0),
                utility: config.default_utility.clamp(0.0, 1.0),
            },
        }
    }
}

impl Default for TypeRiskPolicy {
    fn default() -> Self {
        Self::from_config(&SafetyConfig::default())
    }
}

impl RiskPolicy for TypeRiskPolicy {
    fn score(&self, action_type: &str) -> RiskScore {
        let key = action_type.trim().to_lowercase();
        if let Some(&risk) = self.overrides.get(&key) {
            return RiskScore {
                risk,
                utility: self.default.utility,
            };
        }
        if self.low_risk.contains(&key) {
            return LOW_RISK;
        }
        self.default
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("'{action}' blocked: risk {risk:.2} exceeds {threshold:.2}")]
pub struct Blocked {
    pub action: String,
    pub risk: f32,
    pub threshold: f32,
}

pub struct SafetyGate {
    policy: Box<dyn RiskPolicy>,
    threshold: f32,
}

impl SafetyGate {
    pub fn new(policy: Box<dyn RiskPolicy>, threshold: f32) -> Self {
        Self { policy, threshold }
    }

    pub fn from_config(config: &SafetyConfig) -> Self {
        Self::new(
            Box::new(TypeRiskPolicy::from_config(config)),
            config.risk_threshold,
        )
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    pub fn score(&self, action_type: &str) -> RiskScore {
        self.policy.score(action_type)
    }

    /// `Err(Blocked)` when the risk is strictly above the threshold.
    pub fn check(&self, action_type: &str) -> Result<RiskScore, Blocked> {
        let score = self.score(action_type);
        if score.risk > self.threshold {
            warn!(action = action_type, risk = score.risk, threshold = self.threshold, "action blocked");
            return Err(Blocked {
                action: action_type.to_string(),
                risk: score.risk,
                threshold: self.threshold,
            });
        }
        debug!(action = action_type, risk = score.risk, utility = score.utility, "action allowed");
        Ok(score)
    }
}

impl Default for SafetyGate {
    fn default() -> Self {
        Self::from_config(&SafetyConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gate_with_override(action: &str, risk: f32) -> SafetyGate {
        let mut config = SafetyConfig::default();
        config.risk_overrides.insert(action.to_string(), risk);
        SafetyGate::from_config(&config)
    }

    #[test]
    fn hud_types_score_low() {
        let gate = SafetyGate::default();
        let score = gate.score("show_module");
        assert!(score.risk <= 0.1);
        assert_eq!(score, gate.score("SHOW_MODULE"));
        assert!(gate.check("open_video").is_ok());
    }

    #[test]
    fn unknown_types_take_the_default() {
        let score = SafetyGate::default().score("set_volume");
        assert_eq!(score, RiskScore { risk: 0.2, utility: 0.5 });
    }

    #[test]
    fn high_risk_type_is_blocked() {
        let gate = gate_with_override("wipe_disk", 0.95);
        assert!(gate.score("wipe_disk").risk > 0.8);
        let blocked = gate.check("wipe_disk").unwrap_err();
        assert_eq!(blocked.action, "wipe_disk");
        assert!(blocked.to_string().contains("exceeds 0.80"));
    }

    #[test]
    fn risk_at_threshold_is_allowed() {
        let gate = gate_with_override("borderline", 0.8);
        assert!(gate.check("borderline").is_ok());
    }

    #[test]
    fn overrides_beat_low_risk_list() {
        let gate = gate_with_override("show_module", 0.9);
        assert!(gate.check("show_module").is_err());
    }

    #[test]
    fn custom_policy_plugs_in() {
        struct Paranoid;
        impl RiskPolicy for Paranoid {
            fn score(&self, _action_type: &str) -> RiskScore {
                RiskScore { risk: 1.0, utility: 0.0 }
            }
        }
        let gate = SafetyGate::new(Box::new(Paranoid), 0.8);
        assert!(gate.check("show_module").is_err());
    }
}
