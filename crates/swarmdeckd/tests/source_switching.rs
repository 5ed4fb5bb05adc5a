//! Integration tests for the source manager's mode-switch policy.
//!
//! Drives SourceManager with real on-disk store bundles and synthetic
//! discovery updates, covering the demo→live→demo cycle, the explicit
//! override freeze, and preference among multiple candidates.
//!
//! Tests CAN use `.unwrap()` and `.expect()` - the panic-free policy
//! applies to production code only.

use std::fs;
use std::path::{Path, PathBuf};

use rusqlite::{params, Connection};
use tempfile::TempDir;

use swarmdeck_core::DiscoveredProject;
use swarmdeck_protocol::message::Mode;
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

/// Creates a project dir with a session store holding `active` working
/// agents, returning the project path.
fn make_project(root: &Path, name: &str, active: usize) -> PathBuf {
    let project_dir = root.join(name);
    let state_dir = project_dir.join(".swarm");
    fs::create_dir_all(&state_dir).unwrap();
    let conn = Connection::open(state_dir.join("sessions.db")).unwrap();
    conn.execute_batch(SESSIONS_SCHEMA).unwrap();
    for i in 0..active {
        conn.execute(
            "INSERT INTO sessions (agent_name, status) VALUES (?1, 'working')",
            params![format!("{name}-agent-{i}")],
        )
        .unwrap();
    }
    project_dir
}

fn discovered(project_dir: &Path, active: usize) -> DiscoveredProject {
    let name = project_dir.file_name().unwrap().to_str().unwrap();
    let mut project =
        DiscoveredProject::new(name, project_dir, project_dir.join(".swarm"));
    project.active_agents = active;
    project
}

// ============================================================================
// Scenario: demo → live → demo
// ============================================================================

#[test]
fn switches_to_live_and_back_on_agent_counts() {
    let temp = TempDir::new().unwrap();
    let alpha = make_project(temp.path(), "alpha", 3);

    let mut manager = SourceManager::start(None, false).unwrap();
    assert_eq!(manager.mode(), Mode::Demo);

    // A project with three live agents appears: switch to live.
    manager.handle_projects_update(vec![discovered(&alpha, 3)]);
    assert_eq!(manager.mode(), Mode::Live);
    assert_eq!(manager.active_project().as_deref(), Some("alpha"));
    assert_eq!(manager.generation(), 1);
    assert_eq!(manager.sessions().len(), 3);

    // Its agents all finish: fall back to demo.
    manager.handle_projects_update(vec![discovered(&alpha, 0)]);
    assert_eq!(manager.mode(), Mode::Demo);
    assert!(manager.active_project().is_none());
    assert_eq!(manager.generation(), 2);
}

#[test]
fn prefers_candidate_with_most_live_agents() {
    let temp = TempDir::new().unwrap();
    let alpha = make_project(temp.path(), "alpha", 1);
    let beta = make_project(temp.path(), "beta", 5);

    let mut manager = SourceManager::start(None, false).unwrap();
    manager.handle_projects_update(vec![discovered(&alpha, 1), discovered(&beta, 5)]);
    assert_eq!(manager.active_project().as_deref(), Some("beta"));

    // Alpha overtakes: switch over, dropping beta's bundle first.
    manager.handle_projects_update(vec![discovered(&alpha, 6), discovered(&beta, 5)]);
    assert_eq!(manager.active_project().as_deref(), Some("alpha"));
    assert_eq!(manager.generation(), 2);
}

#[test]
fn same_best_candidate_does_not_reconnect() {
    let temp = TempDir::new().unwrap();
    let alpha = make_project(temp.path(), "alpha", 2);

    let mut manager = SourceManager::start(None, false).unwrap();
    manager.handle_projects_update(vec![discovered(&alpha, 2)]);
    assert_eq!(manager.generation(), 1);

    // Count moves but the winner is the same project: no provider swap,
    // no snapshot churn for connected clients.
    manager.handle_projects_update(vec![discovered(&alpha, 4)]);
    assert_eq!(manager.mode(), Mode::Live);
    assert_eq!(manager.generation(), 1);
}

#[test]
fn failed_connection_keeps_previous_provider() {
    let temp = TempDir::new().unwrap();
    let alpha = make_project(temp.path(), "alpha", 2);
    let ghost_dir = temp.path().join("ghost");

    let mut manager = SourceManager::start(None, false).unwrap();
    manager.handle_projects_update(vec![discovered(&alpha, 2)]);
    assert_eq!(manager.active_project().as_deref(), Some("alpha"));

    // A better-looking candidate with no actual store: the connect fails
    // and alpha stays active.
    let mut ghost = DiscoveredProject::new("ghost", &ghost_dir, ghost_dir.join(".swarm"));
    ghost.active_agents = 9;
    manager.handle_projects_update(vec![discovered(&alpha, 2), ghost]);
    assert_eq!(manager.mode(), Mode::Live);
    assert_eq!(manager.active_project().as_deref(), Some("alpha"));
}

// ============================================================================
// Explicit override
// ============================================================================

#[test]
fn explicit_override_connects_and_freezes() {
    let temp = TempDir::new().unwrap();
    let alpha = make_project(temp.path(), "alpha", 1);
    let beta = make_project(temp.path(), "beta", 8);

    let mut manager = SourceManager::start(Some(&alpha), false).unwrap();
    assert_eq!(manager.mode(), Mode::Live);
    assert_eq!(manager.active_project().as_deref(), Some("alpha"));
    assert!(manager.is_frozen());

    // Discovery keeps feeding updates; a frozen manager records the list
    // for the dashboard but never switches.
    manager.handle_projects_update(vec![discovered(&alpha, 1), discovered(&beta, 8)]);
    assert_eq!(manager.active_project().as_deref(), Some("alpha"));
    assert_eq!(manager.generation(), 0);

    manager.handle_projects_update(vec![discovered(&alpha, 0), discovered(&beta, 0)]);
    assert_eq!(manager.mode(), Mode::Live, "frozen manager never falls back to demo");
}

#[test]
fn explicit_override_without_store_is_fatal() {
    let temp = TempDir::new().unwrap();
    let empty_dir = temp.path().join("empty");
    fs::create_dir_all(&empty_dir).unwrap();

    assert!(SourceManager::start(Some(&empty_dir), false).is_err());
}

// ============================================================================
// Dashboard state
// ============================================================================

#[test]
fn dashboard_state_flags_active_project() {
    let temp = TempDir::new().unwrap();
    let alpha = make_project(temp.path(), "alpha", 2);
    let beta = make_project(temp.path(), "beta", 1);

    let mut manager = SourceManager::start(None, false).unwrap();
    manager.handle_projects_update(vec![discovered(&alpha, 2), discovered(&beta, 1)]);

    let state = manager.dashboard_state();
    assert_eq!(state.mode, Mode::Live);
    assert_eq!(state.active_project.as_deref(), Some("alpha"));
    assert_eq!(state.projects.len(), 2);

    let alpha_info = state.projects.iter().find(|p| p.name == "alpha").unwrap();
    let beta_info = state.projects.iter().find(|p| p.name == "beta").unwrap();
    assert!(alpha_info.is_active);
    assert!(!beta_info.is_active);
    assert_eq!(alpha_info.active_agents, 2);
}
