//! Per-run cost and usage records.

use serde::{Deserialize, Serialize};

/// One row of the `agent_sessions` metrics table, exactly as persisted.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawMetricsRow {
    pub agent_name: String,
    pub bead_id: String,
    pub agent_type: String,
    pub started_at: String,
    pub completed_at: Option<String>,
    pub duration_secs: Option<i64>,
    pub exit_code: Option<i64>,
    pub merge_result: Option<String>,
    pub parent_agent: Option<String>,
    pub input_tokens: i64,
    pub output_tokens: i64,
    pub cache_read_tokens: i64,
    pub cache_creation_tokens: i64,
    pub estimated_cost_usd: Option<f64>,
    pub model: Option<String>,
}

/// One completed-or-in-progress cost/usage record per agent run.
///
/// A missing cost is treated as zero by the aggregators, never as an error -
/// the metrics writer may not know pricing for every model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsSessionRecord {
    pub agent_name: String,
    pub bead_id: String,
    pub capability: String,
    pub started_at: String,
    pub completed_at: Option<String>,
    pub duration_secs: Option<i64>,
    pub exit_code: Option<i64>,
    pub merge_result: Option<String>,
    pub parent_agent: Option<String>,
    pub input_tokens: i64,
    pub output_tokens: i64,
    pub cache_read_tokens: i64,
    pub cache_creation_tokens: i64,
    pub estimated_cost_usd: Option<f64>,
    pub model: Option<String>,
}

/// Maps a raw metrics row into the domain record.
pub fn map_metrics_session(row: RawMetricsRow) -> MetricsSessionRecord {
    MetricsSessionRecord {
        agent_name: row.agent_name,
        bead_id: row.bead_id,
        capability: row.agent_type,
        started_at: row.started_at,
        completed_at: row.completed_at,
        duration_secs: row.duration_secs,
        exit_code: row.exit_code,
        merge_result: row.merge_result,
        parent_agent: row.parent_agent,
        input_tokens: row.input_tokens,
        output_tokens: row.output_tokens,
        cache_read_tokens: row.cache_read_tokens,
        cache_creation_tokens: row.cache_creation_tokens,
        estimated_cost_usd: row.estimated_cost_usd,
        model: row.model,
    }
}
