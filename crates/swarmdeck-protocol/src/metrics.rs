//! Aggregate swarm metrics and the rolling cost-rate window.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use swarmdeck_core::{session::is_active_state, MetricsSessionRecord, SessionRecord};

// ============================================================================
// Wire Shapes
// ============================================================================

/// Per-agent cost ledger entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentCostEntry {
    pub agent_name: String,
    pub total_cost: f64,
    pub input_tokens: i64,
    pub output_tokens: i64,
    pub cache_read_tokens: i64,
    /// Most recently seen non-null model shorthand for this agent
    pub model: Option<String>,
}

/// Aggregate metrics snapshot - derived, never stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwarmMetrics {
    pub total_agents: usize,
    pub active_agents: usize,
    pub total_messages: usize,
    pub total_cost: f64,
    pub total_input_tokens: i64,
    pub total_output_tokens: i64,
    pub total_cache_read_tokens: i64,
    /// Smoothed $/minute from the rolling window, passed through verbatim
    pub cost_per_minute: f64,
    /// Sorted descending by cost
    pub agent_costs: Vec<AgentCostEntry>,
}

// ============================================================================
// Aggregation
// ============================================================================

/// Computes the aggregate metrics snapshot.
///
/// Deterministic given its inputs: the smoothed rate is supplied by the
/// caller (see [`CostRateWindow`]) rather than recomputed here, and a null
/// per-run cost aggregates as zero.
pub fn compute_metrics(
    sessions: &[SessionRecord],
    total_message_count: usize,
    metrics_sessions: &[MetricsSessionRecord],
    cost_per_minute: f64,
) -> SwarmMetrics {
    let total_agents = sessions.len();
    let active_agents = sessions
        .iter()
        .filter(|s| is_active_state(&s.state))
        .count();

    // Per-agent ledger, keyed by agent name. Insertion order preserved so
    // the final sort is stable across identical inputs.
    let mut ledger: Vec<AgentCostEntry> = Vec::new();
    for record in metrics_sessions {
        let idx = match ledger
            .iter()
            .position(|e| e.agent_name == record.agent_name)
        {
            Some(idx) => idx,
            None => {
                ledger.push(AgentCostEntry {
                    agent_name: record.agent_name.clone(),
                    total_cost: 0.0,
                    input_tokens: 0,
                    output_tokens: 0,
                    cache_read_tokens: 0,
                    model: None,
                });
                ledger.len() - 1
            }
        };
        let Some(entry) = ledger.get_mut(idx) else {
            continue;
        };

        entry.total_cost += record.estimated_cost_usd.unwrap_or(0.0);
        entry.input_tokens += record.input_tokens;
        entry.output_tokens += record.output_tokens;
        entry.cache_read_tokens += record.cache_read_tokens;
        if record.model.is_some() {
            entry.model = record.model.clone();
        }
    }

    ledger.sort_by(|a, b| {
        b.total_cost
            .partial_cmp(&a.total_cost)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let total_cost = ledger.iter().map(|e| e.total_cost).sum();
    let total_input_tokens = ledger.iter().map(|e| e.input_tokens).sum();
    let total_output_tokens = ledger.iter().map(|e| e.output_tokens).sum();
    let total_cache_read_tokens = ledger.iter().map(|e| e.cache_read_tokens).sum();

    SwarmMetrics {
        total_agents,
        active_agents,
        total_messages: total_message_count,
        total_cost,
        total_input_tokens,
        total_output_tokens,
        total_cache_read_tokens,
        cost_per_minute,
        agent_costs: ledger,
    }
}

// ============================================================================
// Cost Rate Window
// ============================================================================

/// Window length for rate smoothing.
const RATE_WINDOW_MS: i64 = 30_000;

/// Rolling window of (time, total cost) samples for $/minute smoothing.
///
/// Single writer: the poll tick pushes one sample per tick and reads the
/// rate back. Time is supplied by the caller so tests can feed elapsed
/// values directly.
#[derive(Debug, Default)]
pub struct CostRateWindow {
    samples: VecDeque<(i64, f64)>,
}

impl CostRateWindow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a sample and prunes everything older than the window.
    pub fn push(&mut self, now_ms: i64, total_cost: f64) {
        self.samples.push_back((now_ms, total_cost));
        while let Some(&(ts, _)) = self.samples.front() {
            if now_ms - ts > RATE_WINDOW_MS {
                self.samples.pop_front();
            } else {
                break;
            }
        }
    }

    /// Smoothed cost rate in $/minute over the current window.
    ///
    /// Returns 0.0 with fewer than two samples, and clamps negative deltas
    /// to zero (totals drop when the active source is swapped out).
    pub fn rate_per_minute(&self) -> f64 {
        let (Some(&(first_ts, first_cost)), Some(&(last_ts, last_cost))) =
            (self.samples.front(), self.samples.back())
        else {
            return 0.0;
        };

        let elapsed_ms = last_ts - first_ts;
        if elapsed_ms <= 0 {
            return 0.0;
        }

        let delta = (last_cost - first_cost).max(0.0);
        delta / elapsed_ms as f64 * 60_000.0
    }

    /// Drops all samples. Called on source switches so the rate doesn't
    /// blend two unrelated cost timelines.
    pub fn reset(&mut self) {
        self.samples.clear();
    }
}
