//! Server-to-client message envelope.
//!
//! The feed is one-directional: the daemon pushes, the renderer listens.
//! Every frame is one JSON object with a `type` tag and a `data` payload.
//! There is no error message type - degraded data arrives as empty arrays,
//! never as a protocol-level error.

use serde::{Deserialize, Serialize};
use std::fmt;

use swarmdeck_core::DiscoveredProject;

use crate::metrics::SwarmMetrics;
use crate::wire::{Agent, AgentMessage, ToolEventData, WireMergeEntry};

// ============================================================================
// Mode
// ============================================================================

/// Which kind of source is backing the feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Backed by a real project's state stores
    Live,
    /// Backed by the scripted synthetic generator
    Demo,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Live => "live",
            Self::Demo => "demo",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// Payloads
// ============================================================================

/// Full current state, sent once per connection (and again on mode switch).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotData {
    pub agents: Vec<Agent>,
    /// The most recent messages in ascending chronological order
    pub messages: Vec<AgentMessage>,
    pub merge_queue: Vec<WireMergeEntry>,
    pub metrics: SwarmMetrics,
}

/// A discovered project annotated with whether it backs the current feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectInfo {
    pub name: String,
    pub path: String,
    pub active_agents: usize,
    pub is_active: bool,
}

impl ProjectInfo {
    /// Builds the wire view of a discovered project. The active flag is
    /// computed by the source manager at read time.
    pub fn from_discovered(project: &DiscoveredProject, is_active: bool) -> Self {
        Self {
            name: project.name.clone(),
            path: project.path.display().to_string(),
            active_agents: project.active_agents,
            is_active,
        }
    }
}

/// Current mode and project list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardState {
    pub mode: Mode,
    pub active_project: Option<String>,
    pub projects: Vec<ProjectInfo>,
}

/// One typed entity update inside an `update` frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum UpdateEvent {
    /// An agent appeared or one of its tracked fields changed
    AgentUpdate(Agent),

    /// A new inter-agent message
    MessageEvent(AgentMessage),

    /// A merge-queue entry appeared or its status changed
    MergeUpdate(WireMergeEntry),

    /// The aggregate metrics changed
    MetricsUpdate(Box<SwarmMetrics>),

    /// A new observability event (live mode only)
    ToolEvent(ToolEventData),
}

// ============================================================================
// Envelope
// ============================================================================

/// Messages sent from the daemon to renderer clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Full state at connect time
    Snapshot(Box<SnapshotData>),

    /// One incremental change
    Update(UpdateEvent),

    /// Mode and discovered-project state
    DashboardState(DashboardState),
}

impl ServerMessage {
    /// Creates a snapshot frame.
    pub fn snapshot(
        agents: Vec<Agent>,
        messages: Vec<AgentMessage>,
        merge_queue: Vec<WireMergeEntry>,
        metrics: SwarmMetrics,
    ) -> Self {
        Self::Snapshot(Box::new(SnapshotData {
            agents,
            messages,
            merge_queue,
            metrics,
        }))
    }

    /// Creates an agent update frame.
    pub fn agent_update(agent: Agent) -> Self {
        Self::Update(UpdateEvent::AgentUpdate(agent))
    }

    /// Creates a message event frame.
    pub fn message_event(message: AgentMessage) -> Self {
        Self::Update(UpdateEvent::MessageEvent(message))
    }

    /// Creates a merge update frame.
    pub fn merge_update(entry: WireMergeEntry) -> Self {
        Self::Update(UpdateEvent::MergeUpdate(entry))
    }

    /// Creates a metrics update frame.
    pub fn metrics_update(metrics: SwarmMetrics) -> Self {
        Self::Update(UpdateEvent::MetricsUpdate(Box::new(metrics)))
    }

    /// Creates a tool event frame.
    pub fn tool_event(event: ToolEventData) -> Self {
        Self::Update(UpdateEvent::ToolEvent(event))
    }

    /// Creates a dashboard state frame.
    pub fn dashboard_state(
        mode: Mode,
        active_project: Option<String>,
        projects: Vec<ProjectInfo>,
    ) -> Self {
        Self::DashboardState(DashboardState {
            mode,
            active_project,
            projects,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::compute_metrics;
    use crate::wire::to_agent;
    use swarmdeck_core::{map_session, RawSessionRow};

    fn sample_agent() -> Agent {
        to_agent(&map_session(RawSessionRow {
            agent_name: "builder-1".to_string(),
            agent_type: "builder".to_string(),
            status: "working".to_string(),
            bead_id: "bd-9".to_string(),
            last_activity: "2025-06-12T10:00:00Z".to_string(),
            ..Default::default()
        }))
    }

    #[test]
    fn test_snapshot_frame_shape() {
        let metrics = compute_metrics(&[], 0, &[], 0.0);
        let msg = ServerMessage::snapshot(vec![sample_agent()], vec![], vec![], metrics);
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"type\":\"snapshot\""));
        assert!(json.contains("\"agents\""));
        assert!(json.contains("\"mergeQueue\""));
    }

    #[test]
    fn test_update_frame_is_doubly_tagged() {
        let msg = ServerMessage::agent_update(sample_agent());
        let json = serde_json::to_string(&msg).unwrap();
        // Outer envelope tag plus the inner update tag
        assert!(json.contains("\"type\":\"update\""));
        assert!(json.contains("\"type\":\"agent_update\""));
        assert!(json.contains("\"name\":\"builder-1\""));
    }

    #[test]
    fn test_dashboard_state_frame() {
        let msg = ServerMessage::dashboard_state(
            Mode::Demo,
            None,
            vec![ProjectInfo {
                name: "alpha".to_string(),
                path: "/work/alpha".to_string(),
                active_agents: 3,
                is_active: false,
            }],
        );
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"type\":\"dashboard_state\""));
        assert!(json.contains("\"mode\":\"demo\""));
        assert!(json.contains("\"activeProject\":null"));
        assert!(json.contains("\"activeAgents\":3"));
    }

    #[test]
    fn test_roundtrip() {
        let original = ServerMessage::message_event(AgentMessage {
            id: 4,
            from: "a".to_string(),
            to: "b".to_string(),
            message_type: "status".to_string(),
            priority: "normal".to_string(),
            subject: "hi".to_string(),
            created_at: 1_700_000_000_000,
        });
        let json = serde_json::to_string(&original).unwrap();
        let parsed: ServerMessage = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, original);
    }
}
