//! Swarmdeck Protocol - wire shapes for the dashboard feed
//!
//! This crate owns everything that crosses the WebSocket boundary:
//! - `wire` - the minimal client-facing shapes and the pure projections
//!   from domain records into them
//! - `message` - the server-to-client message envelope
//! - `metrics` - aggregate metrics computation and the rolling cost-rate
//!   window
//!
//! Everything here is pure: no I/O, no clocks (time values are supplied by
//! callers), no hidden state. The daemon composes these pieces inside its
//! poll tick.

pub mod message;
pub mod metrics;
pub mod wire;

// Re-exports for convenience
pub use message::{DashboardState, Mode, ProjectInfo, ServerMessage, SnapshotData, UpdateEvent};
pub use metrics::{compute_metrics, AgentCostEntry, CostRateWindow, SwarmMetrics};
pub use wire::{
    parse_timestamp_ms, to_agent, to_agent_message, to_merge_entry, to_tool_event, Agent,
    AgentMessage, Capability, ToolEventData, WireMergeEntry,
};
