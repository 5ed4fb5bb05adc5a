//! Per-connection delta computation.
//!
//! Each connected client owns a `ClientTracker`: cheap fingerprints and
//! cursors describing everything that client has already been sent. On
//! every tick the gateway feeds the tracker the freshly polled state and
//! gets back the minimal batch of update frames for that client, in the
//! fixed emission order: agents, messages, merges, events, metrics.
//!
//! After emission the tracker's maps and cursors are replaced wholesale
//! with the freshly computed values - never patched incrementally - so no
//! drift can accumulate between ticks. A client connected before a change
//! sees it exactly once; a client that connected after the change got it
//! inside its snapshot and never sees it as a delta.

use std::collections::HashMap;

use swarmdeck_core::{EventRecord, MailRecord, MergeQueueRecord, SessionRecord};
use swarmdeck_protocol::{
    message::ServerMessage,
    metrics::SwarmMetrics,
    wire::{to_agent, to_agent_message, to_merge_entry, to_tool_event},
};

// ============================================================================
// Fingerprints
// ============================================================================

/// Change fingerprint of a session: exactly the mutable fields the
/// dashboard animates on. Everything else may change without triggering an
/// agent update.
pub fn agent_fingerprint(session: &SessionRecord) -> String {
    format!(
        "{}|{}|{}",
        session.state, session.last_activity, session.escalation_level
    )
}

/// Serialized form of the aggregate metrics, compared as an opaque string.
pub fn metrics_fingerprint(metrics: &SwarmMetrics) -> String {
    serde_json::to_string(metrics).unwrap_or_default()
}

// ============================================================================
// Client Tracker
// ============================================================================

/// What one client has already been sent.
#[derive(Debug, Default)]
pub struct ClientTracker {
    /// agent name → change fingerprint
    agent_fingerprints: HashMap<String, String>,

    /// Stored textual timestamp of the newest message sent
    last_message_ts: String,

    /// branch name → merge status
    merge_status: HashMap<String, String>,

    /// Serialized aggregate metrics at last send
    metrics_fingerprint: String,

    /// Highest event id sent
    last_event_id: i64,
}

impl ClientTracker {
    /// Builds a tracker from the snapshot a client was just sent.
    ///
    /// The event cursor starts at the source's current maximum id - not
    /// zero - so only events created after the snapshot stream as deltas.
    pub fn from_snapshot(
        sessions: &[SessionRecord],
        snapshot_messages: &[MailRecord],
        merge_queue: &[MergeQueueRecord],
        metrics: &SwarmMetrics,
        max_event_id: i64,
    ) -> Self {
        Self {
            agent_fingerprints: sessions
                .iter()
                .map(|s| (s.agent_name.clone(), agent_fingerprint(s)))
                .collect(),
            last_message_ts: snapshot_messages
                .last()
                .map(|m| m.created_at.clone())
                .unwrap_or_default(),
            merge_status: merge_queue
                .iter()
                .map(|e| (e.branch_name.clone(), e.status.clone()))
                .collect(),
            metrics_fingerprint: metrics_fingerprint(metrics),
            last_event_id: max_event_id,
        }
    }

    /// Message-timestamp cursor for the next `messages_since` query.
    pub fn last_message_ts(&self) -> &str {
        &self.last_message_ts
    }

    /// Event-id cursor for the next `events_since` query.
    pub fn last_event_id(&self) -> i64 {
        self.last_event_id
    }
}

// ============================================================================
// Delta Computation
// ============================================================================

/// Computes this client's update batch for one tick and advances the
/// tracker.
///
/// `new_messages` and `new_events` must have been queried with this
/// tracker's cursors; the shared poll results (`sessions`, `merge_queue`,
/// `metrics`) are the same for every client.
pub fn compute_updates(
    tracker: &mut ClientTracker,
    sessions: &[SessionRecord],
    new_messages: &[MailRecord],
    merge_queue: &[MergeQueueRecord],
    new_events: &[EventRecord],
    metrics: &SwarmMetrics,
) -> Vec<ServerMessage> {
    let mut updates = Vec::new();

    // 1. Agents: changed fingerprint or not previously seen.
    for session in sessions {
        let fingerprint = agent_fingerprint(session);
        if tracker.agent_fingerprints.get(&session.agent_name) != Some(&fingerprint) {
            updates.push(ServerMessage::agent_update(to_agent(session)));
        }
    }

    // 2. Messages: one frame per message newer than the cursor.
    for message in new_messages {
        updates.push(ServerMessage::message_event(to_agent_message(message)));
    }

    // 3. Merge queue: changed status or new branch.
    for entry in merge_queue {
        if tracker.merge_status.get(&entry.branch_name) != Some(&entry.status) {
            updates.push(ServerMessage::merge_update(to_merge_entry(entry)));
        }
    }

    // 4. Events: one frame per event past the cursor.
    for event in new_events {
        updates.push(ServerMessage::tool_event(to_tool_event(event)));
    }

    // 5. Metrics: exactly one frame, only when the aggregate changed.
    let current_metrics_fp = metrics_fingerprint(metrics);
    if current_metrics_fp != tracker.metrics_fingerprint {
        updates.push(ServerMessage::metrics_update(metrics.clone()));
    }

    // Replace tracker state wholesale; cursors advance strictly after
    // emission.
    tracker.agent_fingerprints = sessions
        .iter()
        .map(|s| (s.agent_name.clone(), agent_fingerprint(s)))
        .collect();
    if let Some(last) = new_messages.last() {
        tracker.last_message_ts = last.created_at.clone();
    }
    tracker.merge_status = merge_queue
        .iter()
        .map(|e| (e.branch_name.clone(), e.status.clone()))
        .collect();
    if let Some(max_id) = new_events.iter().map(|e| e.id).max() {
        tracker.last_event_id = max_id;
    }
    tracker.metrics_fingerprint = current_metrics_fp;

    updates
}
