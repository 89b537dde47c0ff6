pub mod gate;
pub mod selector;

pub use gate::{Blocked, RiskPolicy, RiskScore, SafetyGate, TypeRiskPolicy};
pub use selector::{EpsilonGreedy, SelectorError, best_index};
