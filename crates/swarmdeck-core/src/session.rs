//! Agent session records and lifecycle states.

use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Lifecycle State
// ============================================================================

/// Lifecycle state of an agent session.
///
/// The store records the state as free text; this enum names the values the
/// orchestrator is known to write. Records carry the literal string so that
/// a newer orchestrator writing an unknown state still flows through the
/// pipeline unharmed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentState {
    /// Worktree created, agent process not yet reporting
    Booting,

    /// Agent is actively making progress
    Working,

    /// Agent finished and its work is handed off
    Completed,

    /// No activity past the stall threshold
    Stalled,

    /// Process gone but the session row was never closed out
    Zombie,
}

impl AgentState {
    /// Returns the stored string form of this state.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Booting => "booting",
            Self::Working => "working",
            Self::Completed => "completed",
            Self::Stalled => "stalled",
            Self::Zombie => "zombie",
        }
    }

    /// Parses a stored state string. Unknown values return `None`.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "booting" => Some(Self::Booting),
            "working" => Some(Self::Working),
            "completed" => Some(Self::Completed),
            "stalled" => Some(Self::Stalled),
            "zombie" => Some(Self::Zombie),
            _ => None,
        }
    }

    /// Returns true for states that count toward the active-agent total.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Working | Self::Booting)
    }
}

impl fmt::Display for AgentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Returns true if a stored state string counts as active.
///
/// Unknown states are not active; the aggregate metrics only count states
/// the dashboard understands as in-flight.
pub fn is_active_state(state: &str) -> bool {
    AgentState::parse(state).is_some_and(|s| s.is_active())
}

// ============================================================================
// Raw Row
// ============================================================================

/// One row of the `sessions` table, exactly as persisted.
///
/// Field names mirror the store's column names; the mapper below renames
/// them into the domain record. Nullable columns are `Option`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawSessionRow {
    pub id: i64,
    pub agent_name: String,
    pub agent_type: String,
    pub worktree_path: String,
    pub branch_name: String,
    pub bead_id: String,
    pub tmux_session: String,
    pub status: String,
    pub pid: Option<i64>,
    pub parent_agent: Option<String>,
    pub depth: i64,
    pub run_id: Option<String>,
    pub started_at: String,
    pub last_activity: String,
    pub escalation_level: i64,
    pub stalled_since: Option<String>,
}

// ============================================================================
// Domain Record
// ============================================================================

/// One agent's lifecycle record as observed from the session store.
///
/// Created when the store reports a new row (or the demo generator scripts
/// a spawn); mutated in place by subsequent polls. This system never deletes
/// sessions - client-visible removal is the renderer's concern.
///
/// Invariant (written by the orchestrator, observed here):
/// `depth == 0` iff `parent_agent == None`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    /// Store row id
    pub id: i64,

    /// Agent display name, unique within a run
    pub agent_name: String,

    /// Capability class as stored. Validated (with fallback) only at the
    /// wire layer; trusted everywhere else.
    pub capability: String,

    /// Filesystem worktree the agent operates in
    pub worktree_path: String,

    /// Version-control branch the agent commits to
    pub branch_name: String,

    /// Associated task identifier (empty when unassigned)
    pub bead_id: String,

    /// Terminal-multiplexer handle for the agent's pane
    pub tmux_session: String,

    /// Lifecycle state as stored (see [`AgentState`])
    pub state: String,

    /// Process id, if the orchestrator recorded one
    pub pid: Option<i64>,

    /// Parent agent name; `None` for roots of the spawn tree
    pub parent_agent: Option<String>,

    /// Depth in the spawn tree (0 for roots)
    pub depth: i64,

    /// Run grouping id, if part of a named run
    pub run_id: Option<String>,

    /// Start timestamp, stored textual form
    pub started_at: String,

    /// Last-activity timestamp, stored textual form
    pub last_activity: String,

    /// Number of escalations raised by this agent
    pub escalation_level: i64,

    /// When the agent was first seen stalled, if it is
    pub stalled_since: Option<String>,
}

/// Maps a raw session row into the domain record.
///
/// Pure field translation: enum-ish columns pass through as their literal
/// strings, nullable columns map straight to `Option`.
pub fn map_session(row: RawSessionRow) -> SessionRecord {
    SessionRecord {
        id: row.id,
        agent_name: row.agent_name,
        capability: row.agent_type,
        worktree_path: row.worktree_path,
        branch_name: row.branch_name,
        bead_id: row.bead_id,
        tmux_session: row.tmux_session,
        state: row.status,
        pid: row.pid,
        parent_agent: row.parent_agent,
        depth: row.depth,
        run_id: row.run_id,
        started_at: row.started_at,
        last_activity: row.last_activity,
        escalation_level: row.escalation_level,
        stalled_since: row.stalled_since,
    }
}
