//! Epsilon-greedy choice among candidate tools.
//!
//! The selector only reads tool counters.  Learning happens when the caller
//! records outcomes after execution.

use std::sync::Arc;

use jarvis_memory::{OutcomeStore, ToolStats};
use parking_lot::Mutex;
use rand::rngs::SmallRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SelectorError {
    #[error("no candidate tools to choose from")]
    EmptyCandidates,
}

/// Index of the candidate with the highest success rate.  Strictly greater
/// wins, so ties keep the earliest candidate.
pub fn best_index(stats: &[ToolStats]) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (idx, row) in stats.iter().enumerate() {
        let rate = row.success_rate();
        if best.is_none_or(|(_, best_rate)| rate > best_rate) {
            best = Some((idx, rate));
        }
    }
    best.map(|(idx, _)| idx)
}

pub struct EpsilonGreedy {
    epsilon: f64,
    rng: Mutex<SmallRng>,
    store: Arc<dyn OutcomeStore>,
}

impl EpsilonGreedy {
    pub fn new(store: Arc<dyn OutcomeStore>, epsilon: f64) -> Self {
        Self::with_rng(store, epsilon, SmallRng::from_entropy())
    }

    /// Deterministic exploration for tests and replays.
    pub fn with_seed(store: Arc<dyn OutcomeStore>, epsilon: f64, seed: u64) -> Self {
        Self::with_rng(store, epsilon, SmallRng::seed_from_u64(seed))
    }

    fn with_rng(store: Arc<dyn OutcomeStore>, epsilon: f64, rng: SmallRng) -> Self {
        let epsilon = if epsilon.is_nan() { 0.0 } else { epsilon.clamp(0.0, 1.0) };
        Self {
            epsilon,
            rng: Mutex::new(rng),
            store,
        }
    }

    pub fn epsilon(&self) -> f64 {
        self.epsilon
    }

    pub async fn pick(&self, candidates: &[String]) -> Result<String, SelectorError> {
        if candidates.is_empty() {
            return Err(SelectorError::EmptyCandidates);
        }

        let explored = {
            let mut rng = self.rng.lock();
            if rng.gen_bool(self.epsilon) {
                candidates.choose(&mut *rng).cloned()
            } else {
                None
            }
        };
        if let Some(tool) = explored {
            debug!(tool = %tool, "selector explored");
            return Ok(tool);
        }

        let mut stats = Vec::with_capacity(candidates.len());
        for tool in candidates {
            let row = match self.store.tool_stats(tool).await {
                Ok(row) => row,
                Err(err) => {
                    warn!(tool = %tool, error = %err, "tool stats unavailable, treating as untried");
                    ToolStats::empty(tool.as_str())
                }
            };
            stats.push(row);
        }

        let idx = best_index(&stats).ok_or(SelectorError::EmptyCandidates)?;
        let tool = candidates[idx].clone();
        debug!(tool = %tool, rate = stats[idx].success_rate(), "selector exploited");
        Ok(tool)
    }
}
