//! End-to-end delta scenarios against real store fixtures.
//!
//! These walk the full pipeline - SQLite rows → row mapper → source
//! manager → client tracker → update frames - the way the tick loop
//! drives it, with the store mutated between ticks like a live
//! orchestrator would.
//!
//! Tests CAN use `.unwrap()` and `.expect()` - the panic-free policy
//! applies to production code only.

use std::fs;
use std::path::{Path, PathBuf};

use rusqlite::{params, Connection};
use tempfile::TempDir;

use swarmdeck_core::DiscoveredProject;
use swarmdeck_protocol::message::{ServerMessage, UpdateEvent};
use swarmdeck_protocol::metrics::{compute_metrics, SwarmMetrics};
use swarmdeckd::delta::{compute_updates, ClientTracker};
use swarmdeckd::source::SourceManager;

// ============================================================================
// Fixture Helpers
// ============================================================================

const SESSIONS_SCHEMA: &str = "
    CREATE TABLE sessions (
        id INTEGER PRIMARY KEY,
        agent_name TEXT NOT NULL,
        agent_type TEXT NOT NULL DEFAULT 'builder',
        worktree_path TEXT NOT NULL DEFAULT '',
        branch_name TEXT NOT NULL DEFAULT '',
        bead_id TEXT NOT NULL DEFAULT '',
        tmux_session TEXT NOT NULL DEFAULT '',
        status TEXT NOT NULL,
        pid INTEGER,
        parent_agent TEXT,
        depth INTEGER NOT NULL DEFAULT 0,
        run_id TEXT,
        started_at TEXT NOT NULL DEFAULT '2025-06-12T10:00:00Z',
        last_activity TEXT NOT NULL DEFAULT '2025-06-12T10:00:00Z',
        escalation_level INTEGER NOT NULL DEFAULT 0,
        stalled_since TEXT
    );
";

const MAIL_SCHEMA: &str = "
    CREATE TABLE messages (
        id INTEGER PRIMARY KEY,
        from_agent TEXT NOT NULL,
        to_agent TEXT NOT NULL,
        subject TEXT NOT NULL DEFAULT '',
        body TEXT NOT NULL DEFAULT '',
        message_type TEXT NOT NULL DEFAULT 'status',
        priority TEXT NOT NULL DEFAULT 'normal',
        thread_id TEXT,
        read INTEGER NOT NULL DEFAULT 0,
        created_at TEXT NOT NULL
    );
";

fn make_project(root: &Path, name: &str) -> PathBuf {
    let project_dir = root.join(name);
    let state_dir = project_dir.join(".swarm");
    fs::create_dir_all(&state_dir).unwrap();
    let conn = Connection::open(state_dir.join("sessions.db")).unwrap();
    conn.execute_batch(SESSIONS_SCHEMA).unwrap();
    project_dir
}

fn live_manager(project_dir: &Path) -> SourceManager {
    let name = project_dir.file_name().unwrap().to_str().unwrap();
    let mut project =
        DiscoveredProject::new(name, project_dir, project_dir.join(".swarm"));
    project.active_agents = 1;
    let mut manager = SourceManager::start(None, false).unwrap();
    manager.handle_projects_update(vec![project]);
    assert!(manager.active_project().is_some(), "fixture must connect");
    manager
}

fn sessions_conn(project_dir: &Path) -> Connection {
    Connection::open(project_dir.join(".swarm").join("sessions.db")).unwrap()
}

fn mail_conn(project_dir: &Path) -> Connection {
    let conn = Connection::open(project_dir.join(".swarm").join("mail.db")).unwrap();
    conn.execute_batch(MAIL_SCHEMA).unwrap();
    conn
}

fn insert_message(conn: &Connection, id: i64, created_at: &str) {
    conn.execute(
        "INSERT INTO messages (id, from_agent, to_agent, subject, created_at) \
         VALUES (?1, 'a', 'b', 'subj', ?2)",
        params![id, created_at],
    )
    .unwrap();
}

/// One snapshot the way the gateway builds it at connect time.
fn snapshot(manager: &mut SourceManager, metrics: &SwarmMetrics) -> ClientTracker {
    let sessions = manager.sessions();
    let messages = manager.recent_messages(50);
    let merge_queue = manager.merge_queue();
    let max_event_id = manager.max_event_id();
    ClientTracker::from_snapshot(&sessions, &messages, &merge_queue, metrics, max_event_id)
}

/// One tick the way the gateway runs it for one connection.
fn tick(
    manager: &mut SourceManager,
    tracker: &mut ClientTracker,
    metrics: &SwarmMetrics,
) -> Vec<ServerMessage> {
    let sessions = manager.sessions();
    let merge_queue = manager.merge_queue();
    let new_messages = manager.messages_since(tracker.last_message_ts());
    let new_events = manager.events_since(tracker.last_event_id());
    compute_updates(
        tracker,
        &sessions,
        &new_messages,
        &merge_queue,
        &new_events,
        metrics,
    )
}

// ============================================================================
// Scenario A: one state change, exactly one agent_update
// ============================================================================

#[test]
fn scenario_a_state_change_emits_single_agent_update() {
    let temp = TempDir::new().unwrap();
    let project = make_project(temp.path(), "alpha");
    sessions_conn(&project)
        .execute(
            "INSERT INTO sessions (agent_name, status) VALUES ('x', 'working')",
            [],
        )
        .unwrap();

    let mut manager = live_manager(&project);
    let metrics = compute_metrics(&[], 0, &[], 0.0);
    let mut tracker = snapshot(&mut manager, &metrics);

    // Quiet tick: nothing changed, nothing emitted.
    assert!(tick(&mut manager, &mut tracker, &metrics).is_empty());

    // The orchestrator marks the agent completed.
    sessions_conn(&project)
        .execute("UPDATE sessions SET status = 'completed' WHERE agent_name = 'x'", [])
        .unwrap();

    let updates = tick(&mut manager, &mut tracker, &metrics);
    assert_eq!(updates.len(), 1, "exactly one update, no more");
    match &updates[0] {
        ServerMessage::Update(UpdateEvent::AgentUpdate(agent)) => {
            assert_eq!(agent.name, "x");
            assert_eq!(agent.state, "completed");
        }
        other => panic!("expected agent_update, got {other:?}"),
    }

    // The change streams exactly once; the next tick is quiet again.
    assert!(tick(&mut manager, &mut tracker, &metrics).is_empty());
}

// ============================================================================
// Scenario B: snapshot history + exactly-once message delivery
// ============================================================================

#[test]
fn scenario_b_snapshot_history_and_single_message_event() {
    let temp = TempDir::new().unwrap();
    let project = make_project(temp.path(), "alpha");
    sessions_conn(&project)
        .execute(
            "INSERT INTO sessions (agent_name, status) VALUES ('x', 'working')",
            [],
        )
        .unwrap();

    let mail = mail_conn(&project);
    for i in 1..=60_i64 {
        insert_message(&mail, i, &format!("2025-06-12T10:{:02}:{:02}Z", i / 60, i % 60));
    }

    let mut manager = live_manager(&project);

    // Connect: the snapshot carries the 50 most recent messages ascending.
    let snapshot_messages = manager.recent_messages(50);
    assert_eq!(snapshot_messages.len(), 50);
    assert_eq!(snapshot_messages.first().unwrap().id, 11);
    assert_eq!(snapshot_messages.last().unwrap().id, 60);
    for pair in snapshot_messages.windows(2) {
        assert!(pair[0].created_at <= pair[1].created_at);
    }

    let metrics = compute_metrics(&[], 60, &[], 0.0);
    let mut tracker = snapshot(&mut manager, &metrics);

    // A message created after connect arrives as exactly one frame.
    insert_message(&mail, 61, "2025-06-12T10:01:30Z");
    let updates = tick(&mut manager, &mut tracker, &metrics);
    let message_events: Vec<_> = updates
        .iter()
        .filter_map(|u| match u {
            ServerMessage::Update(UpdateEvent::MessageEvent(m)) => Some(m),
            _ => None,
        })
        .collect();
    assert_eq!(message_events.len(), 1);
    assert_eq!(message_events[0].id, 61);

    // Never duplicated on a later tick.
    assert!(tick(&mut manager, &mut tracker, &metrics).is_empty());

    // A client connecting now sees it folded into its snapshot instead.
    let late_snapshot = manager.recent_messages(50);
    assert_eq!(late_snapshot.last().unwrap().id, 61);
    let mut late_tracker = snapshot(&mut manager, &metrics);
    assert!(tick(&mut manager, &mut late_tracker, &metrics).is_empty());
}

// ============================================================================
// Demo pipeline sanity
// ============================================================================

#[test]
fn demo_mode_deltas_flow_through_same_pipeline() {
    let mut manager = SourceManager::start(None, true).unwrap();
    let t0: i64 = 1_750_000_000_000;
    manager.advance_demo(t0);

    let metrics = compute_metrics(&manager.sessions(), manager.message_count(), &[], 0.0);
    let mut tracker = snapshot(&mut manager, &metrics);

    // Let the scripted timeline run a few seconds: spawns and mail arrive
    // as ordinary deltas.
    manager.advance_demo(t0 + 7_000);
    let updates = tick(&mut manager, &mut tracker, &metrics);
    assert!(!updates.is_empty());
    assert!(updates.iter().any(|u| matches!(
        u,
        ServerMessage::Update(UpdateEvent::AgentUpdate(_))
    )));
    assert!(updates.iter().any(|u| matches!(
        u,
        ServerMessage::Update(UpdateEvent::MessageEvent(_))
    )));

    // Demo mode has no tool-event stream.
    assert!(updates
        .iter()
        .all(|u| !matches!(u, ServerMessage::Update(UpdateEvent::ToolEvent(_)))));

    // Replaying the same instant emits nothing new.
    manager.advance_demo(t0 + 7_000);
    assert!(tick(&mut manager, &mut tracker, &metrics).is_empty());
}
