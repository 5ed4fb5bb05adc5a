//! Synthetic data source - a scripted swarm for demo mode.
//!
//! When no live project is running, the dashboard still needs something to
//! render. This module replays a fixed timeline of swarm activity (spawns,
//! state changes, mail, merges) against a caller-supplied clock, producing
//! the same record shapes the row mapper produces from a live store. The
//! source manager treats both interchangeably.
//!
//! Time is injected: `advance(now_ms)` is the only way the script moves.
//! Tests drive the timeline with synthetic instants and never sleep.

use rand::Rng;
use tracing::debug;

use swarmdeck_core::{
    AgentState, MailRecord, MergeQueueRecord, MergeStatus, MergeTier, MessageKind,
    MessagePriority, MetricsSessionRecord, SessionRecord,
};
use swarmdeck_protocol::wire::format_timestamp_ms;

// ============================================================================
// Script Constants
// ============================================================================

/// Length of one demo cycle. When the virtual clock passes this, in-flight
/// agents are archived and the script restarts with fresh task names.
pub const CYCLE_MS: i64 = 45_000;

/// Task-name pool. Each cycle draws its task slots starting at
/// `cycle_count % POOL` - consecutive cycles never reuse identical names,
/// repeats beyond that modulus are intentional.
const TASK_POOL: [&str; 8] = [
    "bd-auth-refresh",
    "bd-parser-rewrite",
    "bd-cache-layer",
    "bd-flaky-tests",
    "bd-api-pagination",
    "bd-worker-pool",
    "bd-schema-migration",
    "bd-retry-budget",
];

/// Completed demo runs kept around for the cost ledger.
const MAX_ARCHIVED_METRICS: usize = 48;

// ============================================================================
// Script Model
// ============================================================================

#[derive(Debug, Clone, Copy)]
enum ScriptAction {
    Spawn {
        agent: &'static str,
        capability: &'static str,
        parent: Option<&'static str>,
        depth: i64,
        task_slot: Option<usize>,
    },
    SetState {
        agent: &'static str,
        state: AgentState,
    },
    Escalate {
        agent: &'static str,
    },
    Mail {
        from: &'static str,
        to: &'static str,
        kind: MessageKind,
        priority: MessagePriority,
        subject: &'static str,
    },
    EnqueueMerge {
        agent: &'static str,
        task_slot: usize,
        files: &'static [&'static str],
    },
    SetMergeStatus {
        agent: &'static str,
        status: MergeStatus,
        tier: Option<MergeTier>,
    },
    RemoveMerge {
        agent: &'static str,
    },
}

struct ScriptedEvent {
    offset_ms: i64,
    action: ScriptAction,
}

/// One scripted cycle of swarm activity. Offsets are milliseconds from the
/// cycle start and must be non-decreasing: the generator fires them with a
/// single monotonic cursor.
const SCRIPT: &[ScriptedEvent] = &[
    ScriptedEvent {
        offset_ms: 0,
        action: ScriptAction::Spawn {
            agent: "coordinator",
            capability: "coordinator",
            parent: None,
            depth: 0,
            task_slot: None,
        },
    },
    ScriptedEvent {
        offset_ms: 700,
        action: ScriptAction::SetState { agent: "coordinator", state: AgentState::Working },
    },
    ScriptedEvent {
        offset_ms: 1_500,
        action: ScriptAction::Spawn {
            agent: "lead-1",
            capability: "lead",
            parent: Some("coordinator"),
            depth: 1,
            task_slot: Some(0),
        },
    },
    ScriptedEvent {
        offset_ms: 2_400,
        action: ScriptAction::SetState { agent: "lead-1", state: AgentState::Working },
    },
    ScriptedEvent {
        offset_ms: 2_600,
        action: ScriptAction::Mail {
            from: "coordinator",
            to: "lead-1",
            kind: MessageKind::Dispatch,
            priority: MessagePriority::Normal,
            subject: "kick off run",
        },
    },
    ScriptedEvent {
        offset_ms: 4_000,
        action: ScriptAction::Spawn {
            agent: "scout-1",
            capability: "scout",
            parent: Some("lead-1"),
            depth: 2,
            task_slot: Some(1),
        },
    },
    ScriptedEvent {
        offset_ms: 5_200,
        action: ScriptAction::SetState { agent: "scout-1", state: AgentState::Working },
    },
    ScriptedEvent {
        offset_ms: 6_000,
        action: ScriptAction::Mail {
            from: "lead-1",
            to: "scout-1",
            kind: MessageKind::Assign,
            priority: MessagePriority::Normal,
            subject: "survey the blast radius",
        },
    },
    ScriptedEvent {
        offset_ms: 9_000,
        action: ScriptAction::Spawn {
            agent: "builder-1",
            capability: "builder",
            parent: Some("lead-1"),
            depth: 2,
            task_slot: Some(1),
        },
    },
    ScriptedEvent {
        offset_ms: 9_600,
        action: ScriptAction::Spawn {
            agent: "builder-2",
            capability: "builder",
            parent: Some("lead-1"),
            depth: 2,
            task_slot: Some(2),
        },
    },
    ScriptedEvent {
        offset_ms: 11_000,
        action: ScriptAction::SetState { agent: "builder-1", state: AgentState::Working },
    },
    ScriptedEvent {
        offset_ms: 11_400,
        action: ScriptAction::SetState { agent: "builder-2", state: AgentState::Working },
    },
    ScriptedEvent {
        offset_ms: 13_000,
        action: ScriptAction::Mail {
            from: "scout-1",
            to: "lead-1",
            kind: MessageKind::Result,
            priority: MessagePriority::Normal,
            subject: "survey complete, 14 call sites",
        },
    },
    ScriptedEvent {
        offset_ms: 14_000,
        action: ScriptAction::SetState { agent: "scout-1", state: AgentState::Completed },
    },
    ScriptedEvent {
        offset_ms: 16_000,
        action: ScriptAction::Mail {
            from: "builder-1",
            to: "lead-1",
            kind: MessageKind::Status,
            priority: MessagePriority::Low,
            subject: "halfway through the call sites",
        },
    },
    ScriptedEvent {
        offset_ms: 18_000,
        action: ScriptAction::Spawn {
            agent: "reviewer-1",
            capability: "reviewer",
            parent: Some("lead-1"),
            depth: 2,
            task_slot: Some(3),
        },
    },
    ScriptedEvent {
        offset_ms: 19_000,
        action: ScriptAction::SetState { agent: "reviewer-1", state: AgentState::Working },
    },
    ScriptedEvent {
        offset_ms: 21_000,
        action: ScriptAction::Mail {
            from: "builder-2",
            to: "lead-1",
            kind: MessageKind::Question,
            priority: MessagePriority::High,
            subject: "schema field nullable or defaulted?",
        },
    },
    ScriptedEvent {
        offset_ms: 23_000,
        action: ScriptAction::Mail {
            from: "lead-1",
            to: "builder-2",
            kind: MessageKind::Dispatch,
            priority: MessagePriority::Normal,
            subject: "defaulted, match the v2 tables",
        },
    },
    ScriptedEvent {
        offset_ms: 24_000,
        action: ScriptAction::Spawn {
            agent: "merger-1",
            capability: "merger",
            parent: Some("coordinator"),
            depth: 1,
            task_slot: None,
        },
    },
    ScriptedEvent {
        offset_ms: 24_800,
        action: ScriptAction::SetState { agent: "merger-1", state: AgentState::Working },
    },
    ScriptedEvent {
        offset_ms: 25_500,
        action: ScriptAction::Mail {
            from: "builder-1",
            to: "lead-1",
            kind: MessageKind::WorkerDone,
            priority: MessagePriority::Normal,
            subject: "done, tests green",
        },
    },
    ScriptedEvent {
        offset_ms: 25_800,
        action: ScriptAction::SetState { agent: "builder-1", state: AgentState::Completed },
    },
    ScriptedEvent {
        offset_ms: 26_500,
        action: ScriptAction::EnqueueMerge {
            agent: "builder-1",
            task_slot: 1,
            files: &["src/parser/lexer.rs", "src/parser/mod.rs", "tests/parser.rs"],
        },
    },
    ScriptedEvent {
        offset_ms: 27_200,
        action: ScriptAction::Mail {
            from: "builder-1",
            to: "merger-1",
            kind: MessageKind::MergeReady,
            priority: MessagePriority::Normal,
            subject: "branch ready",
        },
    },
    ScriptedEvent {
        offset_ms: 29_000,
        action: ScriptAction::SetMergeStatus {
            agent: "builder-1",
            status: MergeStatus::Merging,
            tier: None,
        },
    },
    ScriptedEvent {
        offset_ms: 31_000,
        action: ScriptAction::SetMergeStatus {
            agent: "builder-1",
            status: MergeStatus::Merged,
            tier: Some(MergeTier::CleanMerge),
        },
    },
    ScriptedEvent {
        offset_ms: 31_400,
        action: ScriptAction::Mail {
            from: "merger-1",
            to: "coordinator",
            kind: MessageKind::Merged,
            priority: MessagePriority::Normal,
            subject: "landed cleanly",
        },
    },
    ScriptedEvent {
        offset_ms: 33_000,
        action: ScriptAction::Escalate { agent: "builder-2" },
    },
    ScriptedEvent {
        offset_ms: 33_200,
        action: ScriptAction::Mail {
            from: "builder-2",
            to: "coordinator",
            kind: MessageKind::Escalation,
            priority: MessagePriority::Urgent,
            subject: "stuck on migration ordering",
        },
    },
    ScriptedEvent {
        offset_ms: 34_000,
        action: ScriptAction::SetState { agent: "builder-2", state: AgentState::Stalled },
    },
    ScriptedEvent {
        offset_ms: 36_000,
        action: ScriptAction::Mail {
            from: "coordinator",
            to: "builder-2",
            kind: MessageKind::HealthCheck,
            priority: MessagePriority::High,
            subject: "still with us?",
        },
    },
    ScriptedEvent {
        offset_ms: 36_800,
        action: ScriptAction::SetState { agent: "builder-2", state: AgentState::Working },
    },
    ScriptedEvent {
        offset_ms: 38_500,
        action: ScriptAction::Mail {
            from: "builder-2",
            to: "lead-1",
            kind: MessageKind::WorkerDone,
            priority: MessagePriority::Normal,
            subject: "migration landed after reorder",
        },
    },
    ScriptedEvent {
        offset_ms: 38_800,
        action: ScriptAction::SetState { agent: "builder-2", state: AgentState::Completed },
    },
    ScriptedEvent {
        offset_ms: 39_200,
        action: ScriptAction::EnqueueMerge {
            agent: "builder-2",
            task_slot: 2,
            files: &["migrations/0042_add_defaults.sql", "src/schema.rs"],
        },
    },
    ScriptedEvent {
        offset_ms: 40_000,
        action: ScriptAction::SetMergeStatus {
            agent: "builder-2",
            status: MergeStatus::Merging,
            tier: None,
        },
    },
    ScriptedEvent {
        offset_ms: 41_500,
        action: ScriptAction::SetMergeStatus {
            agent: "builder-2",
            status: MergeStatus::Conflict,
            tier: None,
        },
    },
    ScriptedEvent {
        offset_ms: 43_000,
        action: ScriptAction::SetMergeStatus {
            agent: "builder-2",
            status: MergeStatus::Merged,
            tier: Some(MergeTier::AiResolve),
        },
    },
    ScriptedEvent {
        offset_ms: 43_200,
        action: ScriptAction::RemoveMerge { agent: "builder-1" },
    },
    ScriptedEvent {
        offset_ms: 44_000,
        action: ScriptAction::Mail {
            from: "reviewer-1",
            to: "lead-1",
            kind: MessageKind::Result,
            priority: MessagePriority::Normal,
            subject: "review clean, two nits filed",
        },
    },
    ScriptedEvent {
        offset_ms: 44_300,
        action: ScriptAction::SetState { agent: "reviewer-1", state: AgentState::Completed },
    },
    ScriptedEvent {
        offset_ms: 44_600,
        action: ScriptAction::SetState { agent: "lead-1", state: AgentState::Completed },
    },
];

// ============================================================================
// Synthetic Source
// ============================================================================

/// Scripted data source exposing the same query surface as a live bundle.
pub struct SyntheticSource {
    cycle_start_ms: Option<i64>,
    cycle_count: u64,
    cursor: usize,
    next_session_id: i64,
    next_message_id: i64,
    next_merge_id: i64,
    sessions: Vec<SessionRecord>,
    messages: Vec<MailRecord>,
    merge_queue: Vec<MergeQueueRecord>,
    metrics_sessions: Vec<MetricsSessionRecord>,
}

impl SyntheticSource {
    pub fn new() -> Self {
        Self {
            cycle_start_ms: None,
            cycle_count: 0,
            cursor: 0,
            next_session_id: 1,
            next_message_id: 1,
            next_merge_id: 1,
            sessions: Vec::new(),
            messages: Vec::new(),
            merge_queue: Vec::new(),
            metrics_sessions: Vec::new(),
        }
    }

    /// Advances the virtual clock and fires every scripted event whose
    /// offset has now elapsed, in script order, at most once per cycle.
    ///
    /// The first call pins the cycle start to `now_ms`. A call past the
    /// cycle length archives the run and restarts the script.
    pub fn advance(&mut self, now_ms: i64) {
        if self.cycle_start_ms.is_none() {
            self.cycle_start_ms = Some(now_ms);
        }
        let Some(mut cycle_start) = self.cycle_start_ms else {
            return;
        };

        if now_ms - cycle_start >= CYCLE_MS {
            self.rollover(now_ms);
            cycle_start = now_ms;
        }

        let elapsed = now_ms - cycle_start;
        while let Some(event) = SCRIPT.get(self.cursor) {
            if event.offset_ms > elapsed {
                break;
            }
            let ts = format_timestamp_ms(cycle_start + event.offset_ms);
            self.apply(&event.action, &ts);
            self.cursor += 1;
        }
    }

    /// Archives the finished cycle and resets the script.
    ///
    /// Every in-flight agent becomes a completed metrics record with
    /// bounded randomized usage numbers, so the cost ledger keeps moving
    /// between cycles.
    fn rollover(&mut self, now_ms: i64) {
        debug!(cycle = self.cycle_count, "Demo cycle rollover");
        let completed_at = format_timestamp_ms(now_ms);
        let mut rng = rand::thread_rng();

        for session in self.sessions.drain(..) {
            let merged = session.state == AgentState::Completed.as_str();
            self.metrics_sessions.push(MetricsSessionRecord {
                agent_name: session.agent_name,
                bead_id: session.bead_id,
                capability: session.capability,
                started_at: session.started_at,
                completed_at: Some(completed_at.clone()),
                duration_secs: Some(rng.gen_range(90..600)),
                exit_code: Some(0),
                merge_result: merged.then(|| "merged".to_string()),
                parent_agent: session.parent_agent,
                input_tokens: rng.gen_range(50_000..400_000),
                output_tokens: rng.gen_range(2_000..40_000),
                cache_read_tokens: rng.gen_range(100_000..1_500_000),
                cache_creation_tokens: rng.gen_range(5_000..80_000),
                estimated_cost_usd: Some((rng.gen_range(0.25..4.00_f64) * 100.0).round() / 100.0),
                model: Some(if rng.gen_bool(0.7) { "sonnet" } else { "opus" }.to_string()),
            });
        }
        while self.metrics_sessions.len() > MAX_ARCHIVED_METRICS {
            self.metrics_sessions.remove(0);
        }

        self.messages.clear();
        self.merge_queue.clear();
        self.cursor = 0;
        self.cycle_count += 1;
        self.cycle_start_ms = Some(now_ms);
    }

    /// Task name for a script slot in the current cycle, drawn round-robin
    /// from the pool by cycle count.
    fn task_for_slot(&self, slot: usize) -> String {
        let idx = (self.cycle_count as usize + slot) % TASK_POOL.len();
        TASK_POOL[idx].to_string()
    }

    fn branch_for(&self, agent: &str, slot: usize) -> String {
        format!("agent/{}/{}", agent, self.task_for_slot(slot))
    }

    fn apply(&mut self, action: &ScriptAction, ts: &str) {
        match *action {
            ScriptAction::Spawn {
                agent,
                capability,
                parent,
                depth,
                task_slot,
            } => {
                let id = self.next_session_id;
                self.next_session_id += 1;
                let bead_id = task_slot.map(|s| self.task_for_slot(s)).unwrap_or_default();
                let branch_name = match task_slot {
                    Some(slot) => self.branch_for(agent, slot),
                    None => "main".to_string(),
                };
                self.sessions.push(SessionRecord {
                    id,
                    agent_name: agent.to_string(),
                    capability: capability.to_string(),
                    worktree_path: format!("/demo/worktrees/{agent}"),
                    branch_name,
                    bead_id,
                    tmux_session: format!("swarm:{id}"),
                    state: AgentState::Booting.as_str().to_string(),
                    pid: Some(40_000 + id),
                    parent_agent: parent.map(String::from),
                    depth,
                    run_id: Some(format!("demo-run-{}", self.cycle_count)),
                    started_at: ts.to_string(),
                    last_activity: ts.to_string(),
                    escalation_level: 0,
                    stalled_since: None,
                });
            }

            ScriptAction::SetState { agent, state } => {
                if let Some(session) = self.session_mut(agent) {
                    session.state = state.as_str().to_string();
                    session.last_activity = ts.to_string();
                    session.stalled_since = if state == AgentState::Stalled {
                        Some(ts.to_string())
                    } else {
                        None
                    };
                }
            }

            ScriptAction::Escalate { agent } => {
                if let Some(session) = self.session_mut(agent) {
                    session.escalation_level += 1;
                    session.last_activity = ts.to_string();
                }
            }

            ScriptAction::Mail {
                from,
                to,
                kind,
                priority,
                subject,
            } => {
                let id = self.next_message_id;
                self.next_message_id += 1;
                self.messages.push(MailRecord {
                    id,
                    from_agent: from.to_string(),
                    to_agent: to.to_string(),
                    subject: subject.to_string(),
                    body: format!("[{}] {}", kind.as_str(), subject),
                    message_type: kind.as_str().to_string(),
                    priority: priority.as_str().to_string(),
                    thread_id: None,
                    read: false,
                    created_at: ts.to_string(),
                });
            }

            ScriptAction::EnqueueMerge {
                agent,
                task_slot,
                files,
            } => {
                let id = self.next_merge_id;
                self.next_merge_id += 1;
                let entry = MergeQueueRecord {
                    id,
                    branch_name: self.branch_for(agent, task_slot),
                    bead_id: self.task_for_slot(task_slot),
                    agent_name: agent.to_string(),
                    files_modified: files.iter().map(|f| f.to_string()).collect(),
                    queued_at: ts.to_string(),
                    status: MergeStatus::Pending.as_str().to_string(),
                    merge_tier: None,
                };
                self.merge_queue.push(entry);
            }

            ScriptAction::SetMergeStatus {
                agent,
                status,
                tier,
            } => {
                if let Some(entry) = self.merge_queue.iter_mut().find(|e| e.agent_name == agent) {
                    entry.status = status.as_str().to_string();
                    entry.merge_tier = tier.map(|t| t.as_str().to_string());
                }
            }

            ScriptAction::RemoveMerge { agent } => {
                self.merge_queue.retain(|e| e.agent_name != agent);
            }
        }
    }

    fn session_mut(&mut self, agent: &str) -> Option<&mut SessionRecord> {
        self.sessions.iter_mut().find(|s| s.agent_name == agent)
    }

    // ------------------------------------------------------------------
    // Query surface (mirrors LiveSource)
    // ------------------------------------------------------------------

    pub fn sessions(&self) -> Vec<SessionRecord> {
        self.sessions.clone()
    }

    /// The `limit` most recent messages in ascending chronological order.
    pub fn recent_messages(&self, limit: usize) -> Vec<MailRecord> {
        let start = self.messages.len().saturating_sub(limit);
        self.messages[start..].to_vec()
    }

    /// Messages strictly newer than the cursor timestamp.
    pub fn messages_since(&self, cursor: &str) -> Vec<MailRecord> {
        self.messages
            .iter()
            .filter(|m| m.created_at.as_str() > cursor)
            .cloned()
            .collect()
    }

    pub fn message_count(&self) -> usize {
        self.messages.len()
    }

    pub fn merge_queue(&self) -> Vec<MergeQueueRecord> {
        self.merge_queue.clone()
    }

    pub fn metrics_sessions(&self) -> Vec<MetricsSessionRecord> {
        self.metrics_sessions.clone()
    }
}

impl Default for SyntheticSource {
    fn default() -> Self {
        Self::new()
    }
}
