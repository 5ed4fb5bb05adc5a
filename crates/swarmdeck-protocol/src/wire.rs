//! Client-facing wire shapes and domain-to-wire projections.
//!
//! The wire layer is deliberately narrower than the domain records: the
//! renderer needs names, states and timings, not worktree paths or process
//! ids. Timestamps cross the boundary as epoch milliseconds so the client
//! never parses text.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use swarmdeck_core::{EventRecord, MailRecord, MergeQueueRecord, SessionRecord};

// ============================================================================
// Capability
// ============================================================================

/// Capability class of an agent.
///
/// Closed set on the wire. Session rows written by a newer orchestrator may
/// carry capabilities this build doesn't know; those fall back to `Builder`
/// so the renderer always has a usable class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    Coordinator,
    Lead,
    Scout,
    #[default]
    Builder,
    Reviewer,
    Merger,
}

impl Capability {
    /// Parses a stored capability string, falling back to `Builder` for
    /// anything outside the known set.
    pub fn from_str_or_default(s: &str) -> Self {
        match s {
            "coordinator" => Self::Coordinator,
            "lead" => Self::Lead,
            "scout" => Self::Scout,
            "builder" => Self::Builder,
            "reviewer" => Self::Reviewer,
            "merger" => Self::Merger,
            _ => Self::Builder,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Coordinator => "coordinator",
            Self::Lead => "lead",
            Self::Scout => "scout",
            Self::Builder => "builder",
            Self::Reviewer => "reviewer",
            Self::Merger => "merger",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// Timestamps
// ============================================================================

/// Converts a stored textual timestamp to epoch milliseconds.
///
/// Accepts RFC 3339 and SQLite's `datetime()` format. Unparseable input
/// maps to 0 - a wrong-but-renderable value beats dropping the record.
pub fn parse_timestamp_ms(raw: &str) -> i64 {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return dt.timestamp_millis();
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S") {
        return naive.and_utc().timestamp_millis();
    }
    0
}

/// Formats epoch milliseconds back into the stored RFC 3339 form.
///
/// Used by the demo generator so synthetic records look like live ones.
pub fn format_timestamp_ms(ms: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(ms)
        .unwrap_or_default()
        .to_rfc3339()
}

// ============================================================================
// Wire Shapes
// ============================================================================

/// One agent as the renderer sees it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Agent {
    pub name: String,
    pub capability: Capability,
    pub state: String,
    pub parent_agent: Option<String>,
    pub depth: i64,
    /// Task id; `None` when the session has no task assigned
    pub bead_id: Option<String>,
    /// Epoch milliseconds
    pub last_activity: i64,
}

/// One inter-agent message as the renderer sees it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentMessage {
    pub id: i64,
    pub from: String,
    pub to: String,
    #[serde(rename = "type")]
    pub message_type: String,
    pub priority: String,
    pub subject: String,
    /// Epoch milliseconds
    pub created_at: i64,
}

/// One merge-queue entry as the renderer sees it.
///
/// The wire view strips identity and enqueue time; the renderer keys merge
/// lanes by branch name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireMergeEntry {
    pub branch_name: String,
    pub agent_name: String,
    pub status: String,
    pub files_modified: Vec<String>,
}

/// One tool/observability event as the renderer sees it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolEventData {
    pub id: i64,
    pub agent_name: String,
    pub event_type: String,
    pub tool_name: Option<String>,
    pub duration_ms: Option<i64>,
    pub level: String,
    /// Epoch milliseconds
    pub created_at: i64,
}

// ============================================================================
// Projections
// ============================================================================

/// Projects a session record into its wire shape.
///
/// - unknown capability falls back to `builder`
/// - empty bead id becomes `None` (distinguishes "no task" from an empty
///   task string at the presentation layer)
/// - textual last-activity becomes epoch milliseconds
pub fn to_agent(record: &SessionRecord) -> Agent {
    Agent {
        name: record.agent_name.clone(),
        capability: Capability::from_str_or_default(&record.capability),
        state: record.state.clone(),
        parent_agent: record.parent_agent.clone(),
        depth: record.depth,
        bead_id: if record.bead_id.is_empty() {
            None
        } else {
            Some(record.bead_id.clone())
        },
        last_activity: parse_timestamp_ms(&record.last_activity),
    }
}

/// Projects a mail record into its wire shape.
pub fn to_agent_message(record: &MailRecord) -> AgentMessage {
    AgentMessage {
        id: record.id,
        from: record.from_agent.clone(),
        to: record.to_agent.clone(),
        message_type: record.message_type.clone(),
        priority: record.priority.clone(),
        subject: record.subject.clone(),
        created_at: parse_timestamp_ms(&record.created_at),
    }
}

/// Projects a merge-queue record into its wire shape.
pub fn to_merge_entry(record: &MergeQueueRecord) -> WireMergeEntry {
    WireMergeEntry {
        branch_name: record.branch_name.clone(),
        agent_name: record.agent_name.clone(),
        status: record.status.clone(),
        files_modified: record.files_modified.clone(),
    }
}

/// Projects an event record into its wire shape.
pub fn to_tool_event(record: &EventRecord) -> ToolEventData {
    ToolEventData {
        id: record.id,
        agent_name: record.agent_name.clone(),
        event_type: record.event_type.clone(),
        tool_name: record.tool_name.clone(),
        duration_ms: record.duration_ms,
        level: record.level.clone(),
        created_at: parse_timestamp_ms(&record.created_at),
    }
}
