//! WebSocket gateway for the dashboard feed.
//!
//! The server:
//! - Accepts renderer connections on `/ws` and sends each a full snapshot
//!   followed by per-tick delta batches
//! - Reports mode and store availability on `/healthz`
//! - Drives the poll/broadcast tick and the discovery feedback loops
//!
//! Connections live in an explicit map owned by this component and passed
//! into the tick handler; a delivery failure on one connection drops that
//! connection and never affects the others.
//!
//! # Panic-Free Guarantees
//!
//! This module follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - Server errors are logged and allow continued operation

mod connection;

pub use connection::{ClientConnection, ConnectionsMap, OutboundMessage};

use std::collections::HashMap;
use std::sync::atomic::AtomicU64;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;
use serde_json::json;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use swarmdeck_core::DiscoveredProject;
use swarmdeck_protocol::message::ServerMessage;
use swarmdeck_protocol::metrics::{compute_metrics, CostRateWindow};
use swarmdeck_protocol::wire::{to_agent, to_agent_message, to_merge_entry};

use crate::config::Config;
use crate::delta::{compute_updates, ClientTracker};
use crate::discovery::DiscoveryService;
use crate::source::SourceManager;
use crate::store::count_active_agents;

// ============================================================================
// Constants
// ============================================================================

/// Messages included in a connect-time snapshot.
const SNAPSHOT_MESSAGE_LIMIT: usize = 50;

/// How often the discovery feedback loop refreshes live-agent counts.
const COUNT_POLL_INTERVAL: Duration = Duration::from_secs(10);

// ============================================================================
// Shared Context
// ============================================================================

/// State shared between the HTTP handlers and the tick loop.
pub struct ServerContext {
    pub(crate) manager: Arc<Mutex<SourceManager>>,
    pub(crate) connections: ConnectionsMap,
    pub(crate) connection_counter: AtomicU64,
    pub(crate) rate_window: std::sync::Mutex<CostRateWindow>,
}

impl ServerContext {
    fn new(manager: Arc<Mutex<SourceManager>>) -> Self {
        Self {
            manager,
            connections: Arc::new(RwLock::new(HashMap::new())),
            connection_counter: AtomicU64::new(0),
            rate_window: std::sync::Mutex::new(CostRateWindow::new()),
        }
    }

    fn current_rate(&self) -> f64 {
        self.rate_window
            .lock()
            .map(|w| w.rate_per_minute())
            .unwrap_or(0.0)
    }
}

/// Builds the snapshot + dashboard-state frames and the matching tracker
/// for one client, forcing a fresh poll of every query.
///
/// Shared by the connect path and the tick's mode-switch re-snapshot.
pub(crate) fn build_client_state(
    manager: &mut SourceManager,
    rate: f64,
) -> (ClientTracker, Vec<ServerMessage>) {
    let sessions = manager.sessions();
    let messages = manager.recent_messages(SNAPSHOT_MESSAGE_LIMIT);
    let merge_queue = manager.merge_queue();
    let metrics_rows = manager.metrics_sessions();
    let message_count = manager.message_count();
    let max_event_id = manager.max_event_id();

    let metrics = compute_metrics(&sessions, message_count, &metrics_rows, rate);
    let tracker =
        ClientTracker::from_snapshot(&sessions, &messages, &merge_queue, &metrics, max_event_id);

    let snapshot = ServerMessage::snapshot(
        sessions.iter().map(to_agent).collect(),
        messages.iter().map(to_agent_message).collect(),
        merge_queue.iter().map(to_merge_entry).collect(),
        metrics,
    );
    let dashboard = ServerMessage::DashboardState(manager.dashboard_state());

    (tracker, vec![snapshot, dashboard])
}

// ============================================================================
// Dashboard Server
// ============================================================================

/// The gateway: HTTP/WebSocket listener plus the periodic loops.
pub struct DashboardServer {
    config: Config,
    discovery: DiscoveryService,
    cancel_token: CancellationToken,
    ctx: Arc<ServerContext>,
}

impl DashboardServer {
    /// Creates the server around an already-started source manager.
    pub fn new(
        config: Config,
        manager: SourceManager,
        discovery: DiscoveryService,
        cancel_token: CancellationToken,
    ) -> Self {
        let manager = Arc::new(Mutex::new(manager));
        Self {
            config,
            discovery,
            cancel_token,
            ctx: Arc::new(ServerContext::new(manager)),
        }
    }

    /// Runs the server until the cancellation token fires.
    pub async fn run(&self) -> Result<(), ServerError> {
        self.wire_discovery();
        self.discovery.spawn(
            Duration::from_secs(self.config.scan_interval_secs),
            self.cancel_token.clone(),
        );
        self.spawn_count_poll();
        self.spawn_tick_loop();

        let app = Router::new()
            .route("/", get(index_handler))
            .route("/healthz", get(health_handler))
            .route("/ws", get(connection::ws_handler))
            .with_state(Arc::clone(&self.ctx));

        let addr = ("0.0.0.0", self.config.port);
        let listener = TcpListener::bind(addr).await.map_err(|source| {
            ServerError::Bind {
                port: self.config.port,
                source,
            }
        })?;

        info!(port = self.config.port, "Dashboard server listening");

        let cancel = self.cancel_token.clone();
        axum::serve(listener, app)
            .with_graceful_shutdown(async move { cancel.cancelled().await })
            .await
            .map_err(ServerError::Serve)?;

        info!("Server shut down");
        Ok(())
    }

    /// Forwards discovery changes into the source manager.
    ///
    /// The discovery handler runs synchronously inside the scan; it only
    /// enqueues. A dedicated task applies updates to the manager in order.
    fn wire_discovery(&self) {
        let (tx, mut rx) = mpsc::unbounded_channel::<Vec<DiscoveredProject>>();
        self.discovery.on_change(Box::new(move |projects| {
            let _ = tx.send(projects.to_vec());
        }));

        let manager = Arc::clone(&self.ctx.manager);
        let cancel = self.cancel_token.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    update = rx.recv() => {
                        let Some(projects) = update else { break };
                        manager.lock().await.handle_projects_update(projects);
                    }
                }
            }
        });
    }

    /// Periodically refreshes every discovered project's live-agent count.
    ///
    /// The active provider is counted through the manager; every other
    /// project gets a one-shot read-only count probe.
    fn spawn_count_poll(&self) {
        let discovery = self.discovery.clone();
        let manager = Arc::clone(&self.ctx.manager);
        let cancel = self.cancel_token.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(COUNT_POLL_INTERVAL);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        let active = {
                            let mut mgr = manager.lock().await;
                            mgr.active_project().map(|name| (name, mgr.poll_active_agent_count()))
                        };
                        for project in discovery.current() {
                            let count = match &active {
                                Some((name, count)) if *name == project.name => Some(*count),
                                _ => count_active_agents(&project.state_dir),
                            };
                            if let Some(count) = count {
                                discovery.update_live_count(&project.name, count);
                            }
                        }
                    }
                }
            }
        });
    }

    /// The poll/broadcast tick: one fixed-interval loop serving every
    /// connection.
    fn spawn_tick_loop(&self) {
        let ctx = Arc::clone(&self.ctx);
        let cancel = self.cancel_token.clone();
        let interval = Duration::from_millis(self.config.poll_ms);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        debug!("Tick loop shutting down");
                        break;
                    }
                    _ = ticker.tick() => {
                        run_tick(&ctx).await;
                    }
                }
            }
        });
    }
}

/// One poll/broadcast tick.
async fn run_tick(ctx: &Arc<ServerContext>) {
    let now_ms = Utc::now().timestamp_millis();
    let mut manager = ctx.manager.lock().await;
    manager.advance_demo(now_ms);

    // Shared poll results, computed once per tick for every connection.
    let sessions = manager.sessions();
    let merge_queue = manager.merge_queue();
    let metrics_rows = manager.metrics_sessions();
    let message_count = manager.message_count();
    let generation = manager.generation();

    // Feed the rolling rate window; single writer, once per tick.
    let total_cost: f64 = metrics_rows
        .iter()
        .map(|r| r.estimated_cost_usd.unwrap_or(0.0))
        .sum();
    let rate = match ctx.rate_window.lock() {
        Ok(mut window) => {
            window.push(now_ms, total_cost);
            window.rate_per_minute()
        }
        Err(_) => 0.0,
    };

    let metrics = compute_metrics(&sessions, message_count, &metrics_rows, rate);

    let mut failed: Vec<u64> = Vec::new();
    let mut connections = ctx.connections.write().await;
    for (id, conn) in connections.iter_mut() {
        if conn.generation != generation {
            // The provider was swapped out under this client: deliberate
            // full-clear snapshot instead of a delta batch.
            let (tracker, frames) = build_client_state(&mut manager, rate);
            conn.tracker = tracker;
            conn.generation = generation;
            if !conn.send_all(frames) {
                failed.push(*id);
            }
            continue;
        }

        let new_messages = manager.messages_since(conn.tracker.last_message_ts());
        let new_events = manager.events_since(conn.tracker.last_event_id());
        let updates = compute_updates(
            &mut conn.tracker,
            &sessions,
            &new_messages,
            &merge_queue,
            &new_events,
            &metrics,
        );
        if !conn.send_all(updates) {
            failed.push(*id);
        }
    }

    for id in failed {
        connections.remove(&id);
        debug!(connection = id, "Removed failed connection");
    }
}

// ============================================================================
// HTTP Handlers
// ============================================================================

/// The rendering client is served elsewhere; the root just identifies us.
async fn index_handler() -> &'static str {
    "swarmdeck daemon\n"
}

/// Health surface: mode, active project, per-store availability.
async fn health_handler(State(ctx): State<Arc<ServerContext>>) -> impl IntoResponse {
    // Lock order matches the tick loop: manager first, then connections.
    let manager = ctx.manager.lock().await;
    let connections = ctx.connections.read().await.len();
    let stores: serde_json::Map<String, serde_json::Value> = manager
        .store_health()
        .into_iter()
        .map(|(name, state)| (name.to_string(), json!(state.as_str())))
        .collect();
    let body = json!({
        "status": "ok",
        "mode": manager.mode().as_str(),
        "activeProject": manager.active_project(),
        "stores": stores,
        "connections": connections,
    });
    Json(body)
}

// ============================================================================
// Errors
// ============================================================================

/// Errors that can occur running the server.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind port {port}: {source}")]
    Bind {
        port: u16,
        #[source]
        source: std::io::Error,
    },

    #[error("server error: {0}")]
    Serve(#[source] std::io::Error),
}
