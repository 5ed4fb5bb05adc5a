//! Read-only SQLite bundle for one live project.
//!
//! A swarm project keeps its state in five single-table SQLite files under
//! `<project>/.swarm/`. The orchestration framework owns and writes them;
//! this daemon only ever reads. The session store is the primary - without
//! it there is no live source. The other four are optional: each sits
//! behind a small explicit state machine (`StoreState`) so a store that
//! appears, disappears, or faults mid-run degrades that one query surface
//! to empty results and is re-probed lazily on the next access.
//!
//! Queries never propagate errors into the poll tick: every helper catches
//! internally and returns an empty contribution for the tick.

use std::path::{Path, PathBuf};
use std::time::Duration;

use rusqlite::{Connection, OpenFlags};
use thiserror::Error;
use tracing::{debug, info, warn};

use swarmdeck_core::{
    map_event, map_merge_entry, map_message, map_metrics_session, map_session, EventRecord,
    MailRecord, MergeQueueRecord, MetricsSessionRecord, RawEventRow, RawMailRow, RawMergeRow,
    RawMetricsRow, RawSessionRow, SessionRecord,
};

// ============================================================================
// Constants
// ============================================================================

/// Name of the per-project state directory.
pub const STATE_DIR_NAME: &str = ".swarm";

/// Primary store: agent session records. Required.
pub const SESSIONS_DB: &str = "sessions.db";

/// Optional store: inter-agent mail.
pub const MAIL_DB: &str = "mail.db";

/// Optional store: merge queue.
pub const MERGE_DB: &str = "merge_queue.db";

/// Optional store: per-run cost/usage metrics.
pub const METRICS_DB: &str = "metrics.db";

/// Optional store: observability events.
pub const EVENTS_DB: &str = "events.db";

/// How long to wait on a writer's lock before giving up on a query.
const BUSY_TIMEOUT: Duration = Duration::from_millis(250);

/// Upper bound on events returned per cursor query, so one very chatty
/// tick cannot stall the broadcast for every connection.
const MAX_EVENTS_PER_QUERY: usize = 500;

// ============================================================================
// Errors
// ============================================================================

/// Errors that can occur opening a live store bundle.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Primary session store missing - the bundle cannot open
    #[error("session store not found at {path}")]
    MissingPrimary { path: PathBuf },

    /// SQLite-level failure opening or probing a store
    #[error("failed to open store at {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },
}

// ============================================================================
// Optional Store State Machine
// ============================================================================

/// Availability of one underlying store file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreState {
    /// File absent; re-checked on every access
    Unavailable,
    /// Open and answering queries
    Available,
    /// Open or query failed; connection dropped, re-probed on next access
    Faulted,
}

impl StoreState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unavailable => "unavailable",
            Self::Available => "available",
            Self::Faulted => "faulted",
        }
    }
}

/// One store file behind the {unavailable, available, faulted} machine.
///
/// Transitions happen only on explicit query attempts - there is no
/// background prober. A faulted store keeps no connection; the next query
/// re-opens from scratch.
struct StoreHandle {
    label: &'static str,
    path: PathBuf,
    conn: Option<Connection>,
    state: StoreState,
}

impl StoreHandle {
    fn new(label: &'static str, path: PathBuf) -> Self {
        Self {
            label,
            path,
            conn: None,
            state: StoreState::Unavailable,
        }
    }

    fn state(&self) -> StoreState {
        self.state
    }

    /// Opens the connection if needed. Returns `None` when the store is
    /// absent or fails to open; both leave the machine re-probing on the
    /// next access.
    fn ensure_open(&mut self) -> Option<&Connection> {
        if self.conn.is_none() {
            if !self.path.exists() {
                if self.state != StoreState::Unavailable {
                    debug!(store = self.label, "Store file gone; marking unavailable");
                }
                self.state = StoreState::Unavailable;
                return None;
            }
            match open_read_only(&self.path) {
                Ok(conn) => {
                    info!(store = self.label, path = %self.path.display(), "Store opened");
                    self.conn = Some(conn);
                    self.state = StoreState::Available;
                }
                Err(e) => {
                    if self.state != StoreState::Faulted {
                        warn!(store = self.label, error = %e, "Failed to open store");
                    }
                    self.state = StoreState::Faulted;
                    return None;
                }
            }
        }
        self.conn.as_ref()
    }

    /// Runs one query against the store, degrading any failure to `None`.
    ///
    /// On failure the connection is dropped so the next access re-probes
    /// from scratch.
    fn query<T>(&mut self, f: impl FnOnce(&Connection) -> rusqlite::Result<T>) -> Option<T> {
        let conn = self.ensure_open()?;
        match f(conn) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(store = self.label, error = %e, "Store query failed; will re-probe");
                self.conn = None;
                self.state = StoreState::Faulted;
                None
            }
        }
    }
}

/// Opens a SQLite file strictly read-only with a short busy timeout, so a
/// writer holding the lock degrades the query instead of blocking the tick.
fn open_read_only(path: &Path) -> Result<Connection, StoreError> {
    let conn = Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )
    .map_err(|source| StoreError::Open {
        path: path.to_path_buf(),
        source,
    })?;
    conn.busy_timeout(BUSY_TIMEOUT)
        .map_err(|source| StoreError::Open {
            path: path.to_path_buf(),
            source,
        })?;
    Ok(conn)
}

// ============================================================================
// Live Source Bundle
// ============================================================================

/// Read-only connection bundle for one live project.
///
/// Owns all five store handles. The session store must open (and answer a
/// probe query) at bundle-open time; afterwards every store, primary
/// included, degrades per-query.
pub struct LiveSource {
    name: String,
    state_dir: PathBuf,
    sessions: StoreHandle,
    mail: StoreHandle,
    merge: StoreHandle,
    metrics: StoreHandle,
    events: StoreHandle,
}

impl LiveSource {
    /// Opens the bundle for a project's state directory.
    ///
    /// Fails only when the primary session store is missing or unreadable;
    /// the optional stores are probed lazily on first access.
    pub fn open(name: impl Into<String>, state_dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let name = name.into();
        let state_dir = state_dir.into();

        let sessions_path = state_dir.join(SESSIONS_DB);
        if !sessions_path.exists() {
            return Err(StoreError::MissingPrimary {
                path: sessions_path,
            });
        }

        // Probe now so a truncated or non-SQLite file fails the open, not
        // the first poll tick.
        let conn = open_read_only(&sessions_path)?;
        conn.query_row("SELECT COUNT(*) FROM sessions", [], |row| {
            row.get::<_, i64>(0)
        })
        .map_err(|source| StoreError::Open {
            path: sessions_path.clone(),
            source,
        })?;

        let mut sessions = StoreHandle::new("sessions", sessions_path);
        sessions.conn = Some(conn);
        sessions.state = StoreState::Available;

        Ok(Self {
            name,
            mail: StoreHandle::new("mail", state_dir.join(MAIL_DB)),
            merge: StoreHandle::new("merge_queue", state_dir.join(MERGE_DB)),
            metrics: StoreHandle::new("metrics", state_dir.join(METRICS_DB)),
            events: StoreHandle::new("events", state_dir.join(EVENTS_DB)),
            sessions,
            state_dir,
        })
    }

    /// Project name this bundle was opened for.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// State directory this bundle reads from.
    pub fn state_dir(&self) -> &Path {
        &self.state_dir
    }

    /// All session records, in row order.
    pub fn sessions(&mut self) -> Vec<SessionRecord> {
        self.sessions
            .query(|conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, agent_name, agent_type, worktree_path, branch_name, bead_id, \
                     tmux_session, status, pid, parent_agent, depth, run_id, started_at, \
                     last_activity, escalation_level, stalled_since \
                     FROM sessions ORDER BY id ASC",
                )?;
                let rows = stmt.query_map([], |row| {
                    Ok(RawSessionRow {
                        id: row.get(0)?,
                        agent_name: row.get(1)?,
                        agent_type: row.get(2)?,
                        worktree_path: row.get(3)?,
                        branch_name: row.get(4)?,
                        bead_id: row.get(5)?,
                        tmux_session: row.get(6)?,
                        status: row.get(7)?,
                        pid: row.get(8)?,
                        parent_agent: row.get(9)?,
                        depth: row.get(10)?,
                        run_id: row.get(11)?,
                        started_at: row.get(12)?,
                        last_activity: row.get(13)?,
                        escalation_level: row.get(14)?,
                        stalled_since: row.get(15)?,
                    })
                })?;
                rows.collect::<rusqlite::Result<Vec<_>>>()
            })
            .unwrap_or_default()
            .into_iter()
            .map(map_session)
            .collect()
    }

    /// The `limit` most recent messages, returned in ascending
    /// chronological order.
    pub fn recent_messages(&mut self, limit: usize) -> Vec<MailRecord> {
        let mut records: Vec<MailRecord> = self
            .mail
            .query(|conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, from_agent, to_agent, subject, body, message_type, priority, \
                     thread_id, read, created_at \
                     FROM messages ORDER BY created_at DESC, id DESC LIMIT ?1",
                )?;
                let rows = stmt.query_map([limit as i64], mail_row)?;
                rows.collect::<rusqlite::Result<Vec<_>>>()
            })
            .unwrap_or_default()
            .into_iter()
            .map(map_message)
            .collect();
        records.reverse();
        records
    }

    /// Messages strictly newer than the cursor timestamp, ascending.
    ///
    /// The cursor is the stored textual timestamp of the newest message the
    /// caller has seen; it only advances when the caller says so.
    pub fn messages_since(&mut self, cursor: &str) -> Vec<MailRecord> {
        self.mail
            .query(|conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, from_agent, to_agent, subject, body, message_type, priority, \
                     thread_id, read, created_at \
                     FROM messages WHERE created_at > ?1 ORDER BY created_at ASC, id ASC",
                )?;
                let rows = stmt.query_map([cursor], mail_row)?;
                rows.collect::<rusqlite::Result<Vec<_>>>()
            })
            .unwrap_or_default()
            .into_iter()
            .map(map_message)
            .collect()
    }

    /// Total message count.
    pub fn message_count(&mut self) -> usize {
        self.mail
            .query(|conn| {
                conn.query_row("SELECT COUNT(*) FROM messages", [], |row| {
                    row.get::<_, i64>(0)
                })
            })
            .unwrap_or(0)
            .max(0) as usize
    }

    /// Current merge-queue entries, in row order.
    pub fn merge_queue(&mut self) -> Vec<MergeQueueRecord> {
        self.merge
            .query(|conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, branch_name, bead_id, agent_name, files_modified, queued_at, \
                     status, merge_tier \
                     FROM merge_queue ORDER BY id ASC",
                )?;
                let rows = stmt.query_map([], |row| {
                    Ok(RawMergeRow {
                        id: row.get(0)?,
                        branch_name: row.get(1)?,
                        bead_id: row.get(2)?,
                        agent_name: row.get(3)?,
                        files_modified: row.get(4)?,
                        queued_at: row.get(5)?,
                        status: row.get(6)?,
                        merge_tier: row.get(7)?,
                    })
                })?;
                rows.collect::<rusqlite::Result<Vec<_>>>()
            })
            .unwrap_or_default()
            .into_iter()
            .map(map_merge_entry)
            .collect()
    }

    /// All metrics session records, in insertion order.
    pub fn metrics_sessions(&mut self) -> Vec<MetricsSessionRecord> {
        self.metrics
            .query(|conn| {
                let mut stmt = conn.prepare(
                    "SELECT agent_name, bead_id, agent_type, started_at, completed_at, \
                     duration_secs, exit_code, merge_result, parent_agent, input_tokens, \
                     output_tokens, cache_read_tokens, cache_creation_tokens, \
                     estimated_cost_usd, model \
                     FROM agent_sessions ORDER BY rowid ASC",
                )?;
                let rows = stmt.query_map([], |row| {
                    Ok(RawMetricsRow {
                        agent_name: row.get(0)?,
                        bead_id: row.get(1)?,
                        agent_type: row.get(2)?,
                        started_at: row.get(3)?,
                        completed_at: row.get(4)?,
                        duration_secs: row.get(5)?,
                        exit_code: row.get(6)?,
                        merge_result: row.get(7)?,
                        parent_agent: row.get(8)?,
                        input_tokens: row.get(9)?,
                        output_tokens: row.get(10)?,
                        cache_read_tokens: row.get(11)?,
                        cache_creation_tokens: row.get(12)?,
                        estimated_cost_usd: row.get(13)?,
                        model: row.get(14)?,
                    })
                })?;
                rows.collect::<rusqlite::Result<Vec<_>>>()
            })
            .unwrap_or_default()
            .into_iter()
            .map(map_metrics_session)
            .collect()
    }

    /// Events with id strictly greater than the cursor, ascending, bounded.
    ///
    /// The cursor never advances implicitly: querying twice with the same
    /// cursor returns the same set.
    pub fn events_since(&mut self, cursor: i64) -> Vec<EventRecord> {
        self.events
            .query(|conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, run_id, session_id, agent_name, event_type, tool_name, \
                     tool_args, duration_ms, level, payload, created_at \
                     FROM events WHERE id > ?1 ORDER BY id ASC LIMIT ?2",
                )?;
                let rows = stmt.query_map([cursor, MAX_EVENTS_PER_QUERY as i64], event_row)?;
                rows.collect::<rusqlite::Result<Vec<_>>>()
            })
            .unwrap_or_default()
            .into_iter()
            .map(map_event)
            .collect()
    }

    /// The `limit` most recent events, ascending by id.
    pub fn recent_events(&mut self, limit: usize) -> Vec<EventRecord> {
        let mut records: Vec<EventRecord> = self
            .events
            .query(|conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, run_id, session_id, agent_name, event_type, tool_name, \
                     tool_args, duration_ms, level, payload, created_at \
                     FROM events ORDER BY id DESC LIMIT ?1",
                )?;
                let rows = stmt.query_map([limit as i64], event_row)?;
                rows.collect::<rusqlite::Result<Vec<_>>>()
            })
            .unwrap_or_default()
            .into_iter()
            .map(map_event)
            .collect();
        records.reverse();
        records
    }

    /// Highest event id currently in the store (0 when empty or absent).
    ///
    /// New connections start their event cursor here so only future events
    /// stream to them.
    pub fn max_event_id(&mut self) -> i64 {
        self.events
            .query(|conn| {
                conn.query_row("SELECT COALESCE(MAX(id), 0) FROM events", [], |row| {
                    row.get::<_, i64>(0)
                })
            })
            .unwrap_or(0)
    }

    /// Availability of each store, for the health surface.
    pub fn store_health(&self) -> Vec<(&'static str, StoreState)> {
        vec![
            ("sessions", self.sessions.state()),
            ("mail", self.mail.state()),
            ("merge_queue", self.merge.state()),
            ("metrics", self.metrics.state()),
            ("events", self.events.state()),
        ]
    }
}

/// Row extractor shared by the mail queries.
fn mail_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawMailRow> {
    Ok(RawMailRow {
        id: row.get(0)?,
        from_agent: row.get(1)?,
        to_agent: row.get(2)?,
        subject: row.get(3)?,
        body: row.get(4)?,
        message_type: row.get(5)?,
        priority: row.get(6)?,
        thread_id: row.get(7)?,
        read: row.get(8)?,
        created_at: row.get(9)?,
    })
}

/// Row extractor shared by the event queries.
fn event_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawEventRow> {
    Ok(RawEventRow {
        id: row.get(0)?,
        run_id: row.get(1)?,
        session_id: row.get(2)?,
        agent_name: row.get(3)?,
        event_type: row.get(4)?,
        tool_name: row.get(5)?,
        tool_args: row.get(6)?,
        duration_ms: row.get(7)?,
        level: row.get(8)?,
        payload: row.get(9)?,
        created_at: row.get(10)?,
    })
}

// ============================================================================
// Standalone Count Probe
// ============================================================================

/// Counts active agents in a project's session store without keeping a
/// connection open. Used by the discovery feedback loop for every
/// discovered project, not just the one backing live mode.
///
/// Returns `None` when the store is absent or unreadable.
pub fn count_active_agents(state_dir: &Path) -> Option<usize> {
    let path = state_dir.join(SESSIONS_DB);
    if !path.exists() {
        return None;
    }
    let conn = open_read_only(&path).ok()?;
    let count: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM sessions WHERE status IN ('working', 'booting')",
            [],
            |row| row.get(0),
        )
        .ok()?;
    Some(count.max(0) as usize)
}
