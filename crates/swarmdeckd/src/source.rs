//! Source manager - single owner of the active data provider.
//!
//! Exactly one provider backs the feed at any moment: a live store bundle
//! or the synthetic generator. The manager owns it exclusively, exposes a
//! uniform query surface over both, and holds the switching policy driven
//! by discovery updates. Switching is an explicit variant swap - the old
//! provider's resources are dropped in full before the replacement is
//! activated.

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{info, warn};

use swarmdeck_core::{
    session::is_active_state, DiscoveredProject, EventRecord, MailRecord, MergeQueueRecord,
    MetricsSessionRecord, SessionRecord,
};
use swarmdeck_protocol::message::{DashboardState, Mode, ProjectInfo};

use crate::demo::SyntheticSource;
use crate::store::{LiveSource, StoreError, StoreState, STATE_DIR_NAME};

// ============================================================================
// Errors
// ============================================================================

/// Errors that can occur selecting or opening a provider.
#[derive(Debug, Error)]
pub enum SourceError {
    /// Explicit project override could not be opened - fatal at startup
    #[error("cannot open project at {path}: {source}")]
    Connect {
        path: PathBuf,
        #[source]
        source: StoreError,
    },
}

// ============================================================================
// Provider
// ============================================================================

/// The two provider variants. Selected explicitly by the manager; queries
/// dispatch on the variant rather than through swappable function values.
enum ActiveProvider {
    Live(LiveSource),
    Demo(SyntheticSource),
}

// ============================================================================
// Source Manager
// ============================================================================

/// Owns the active provider and the live/demo switch policy.
pub struct SourceManager {
    provider: ActiveProvider,
    /// Set when an explicit project override connected at startup;
    /// discovery-driven switching stays disabled for the process lifetime.
    frozen: bool,
    /// Latest discovery list, kept for the dashboard-state surface.
    projects: Vec<DiscoveredProject>,
    /// Bumped on every provider swap. The gateway compares it per
    /// connection to know when a full re-snapshot is due.
    generation: u64,
}

impl SourceManager {
    /// Builds the manager according to the startup inputs.
    ///
    /// With an explicit project override (and demo not forced) the live
    /// connection must succeed - a missing primary store is fatal here,
    /// unlike in discovery-driven switching. On success auto-switching is
    /// frozen. Without an override the manager starts in demo mode and
    /// lets discovery drive it.
    pub fn start(project_dir: Option<&Path>, force_demo: bool) -> Result<Self, SourceError> {
        if let (Some(dir), false) = (project_dir, force_demo) {
            let state_dir = dir.join(STATE_DIR_NAME);
            let name = dir
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or("project")
                .to_string();

            let live = LiveSource::open(name.clone(), &state_dir).map_err(|source| {
                SourceError::Connect {
                    path: dir.to_path_buf(),
                    source,
                }
            })?;

            info!(project = %name, "Connected to explicit project; auto-switching frozen");
            return Ok(Self {
                provider: ActiveProvider::Live(live),
                frozen: true,
                projects: Vec::new(),
                generation: 0,
            });
        }

        if force_demo {
            info!("Demo mode forced");
        } else {
            info!("No explicit project; starting in demo mode");
        }
        Ok(Self {
            provider: ActiveProvider::Demo(SyntheticSource::new()),
            frozen: false,
            projects: Vec::new(),
            generation: 0,
        })
    }

    /// Applies a discovery update.
    ///
    /// Picks the candidate with the highest positive live-agent count and
    /// switches to it when it isn't already the active one; with no such
    /// candidate, falls back from live to demo. A failed connection keeps
    /// the previous provider - never a crash.
    pub fn handle_projects_update(&mut self, projects: Vec<DiscoveredProject>) {
        self.projects = projects;
        if self.frozen {
            return;
        }

        let Some(best) = select_candidate(&self.projects) else {
            if matches!(self.provider, ActiveProvider::Live(_)) {
                info!("No live agents anywhere; falling back to demo mode");
                self.provider = ActiveProvider::Demo(SyntheticSource::new());
                self.generation += 1;
            }
            return;
        };

        let already_active = match &self.provider {
            ActiveProvider::Live(live) => live.name() == best.name,
            ActiveProvider::Demo(_) => false,
        };
        if already_active {
            return;
        }

        let (name, state_dir) = (best.name.clone(), best.state_dir.clone());
        match LiveSource::open(name.clone(), &state_dir) {
            Ok(live) => {
                info!(project = %name, "Switching to live project");
                // Assignment drops the previous provider - and with it any
                // open store handles - before the new one serves a query.
                self.provider = ActiveProvider::Live(live);
                self.generation += 1;
            }
            Err(e) => {
                warn!(project = %name, error = %e, "Failed to connect; keeping current provider");
            }
        }
    }

    // ------------------------------------------------------------------
    // Uniform query surface
    // ------------------------------------------------------------------

    pub fn sessions(&mut self) -> Vec<SessionRecord> {
        match &mut self.provider {
            ActiveProvider::Live(live) => live.sessions(),
            ActiveProvider::Demo(demo) => demo.sessions(),
        }
    }

    pub fn recent_messages(&mut self, limit: usize) -> Vec<MailRecord> {
        match &mut self.provider {
            ActiveProvider::Live(live) => live.recent_messages(limit),
            ActiveProvider::Demo(demo) => demo.recent_messages(limit),
        }
    }

    pub fn messages_since(&mut self, cursor: &str) -> Vec<MailRecord> {
        match &mut self.provider {
            ActiveProvider::Live(live) => live.messages_since(cursor),
            ActiveProvider::Demo(demo) => demo.messages_since(cursor),
        }
    }

    pub fn message_count(&mut self) -> usize {
        match &mut self.provider {
            ActiveProvider::Live(live) => live.message_count(),
            ActiveProvider::Demo(demo) => demo.message_count(),
        }
    }

    pub fn merge_queue(&mut self) -> Vec<MergeQueueRecord> {
        match &mut self.provider {
            ActiveProvider::Live(live) => live.merge_queue(),
            ActiveProvider::Demo(demo) => demo.merge_queue(),
        }
    }

    pub fn metrics_sessions(&mut self) -> Vec<MetricsSessionRecord> {
        match &mut self.provider {
            ActiveProvider::Live(live) => live.metrics_sessions(),
            ActiveProvider::Demo(demo) => demo.metrics_sessions(),
        }
    }

    /// Events newer than the cursor. Only live mode has an event stream;
    /// demo returns nothing.
    pub fn events_since(&mut self, cursor: i64) -> Vec<EventRecord> {
        match &mut self.provider {
            ActiveProvider::Live(live) => live.events_since(cursor),
            ActiveProvider::Demo(_) => Vec::new(),
        }
    }

    /// Highest event id in the active source (0 in demo mode).
    pub fn max_event_id(&mut self) -> i64 {
        match &mut self.provider {
            ActiveProvider::Live(live) => live.max_event_id(),
            ActiveProvider::Demo(_) => 0,
        }
    }

    /// Active agent count of the current provider, fed back into the
    /// discovery service by the polling loop.
    pub fn poll_active_agent_count(&mut self) -> usize {
        self.sessions()
            .iter()
            .filter(|s| is_active_state(&s.state))
            .count()
    }

    /// Advances the demo timeline. No-op in live mode.
    pub fn advance_demo(&mut self, now_ms: i64) {
        if let ActiveProvider::Demo(demo) = &mut self.provider {
            demo.advance(now_ms);
        }
    }

    // ------------------------------------------------------------------
    // State surface
    // ------------------------------------------------------------------

    pub fn mode(&self) -> Mode {
        match &self.provider {
            ActiveProvider::Live(_) => Mode::Live,
            ActiveProvider::Demo(_) => Mode::Demo,
        }
    }

    pub fn active_project(&self) -> Option<String> {
        match &self.provider {
            ActiveProvider::Live(live) => Some(live.name().to_string()),
            ActiveProvider::Demo(_) => None,
        }
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    /// Provider swap counter; changes force full re-snapshots downstream.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Current mode, active project, and the discovered list with the
    /// active flag computed at read time.
    pub fn dashboard_state(&self) -> DashboardState {
        let active = self.active_project();
        let projects = self
            .projects
            .iter()
            .map(|p| ProjectInfo::from_discovered(p, active.as_deref() == Some(p.name.as_str())))
            .collect();
        DashboardState {
            mode: self.mode(),
            active_project: active,
            projects,
        }
    }

    /// Store availability for the health surface. Demo mode has no stores.
    pub fn store_health(&self) -> Vec<(&'static str, StoreState)> {
        match &self.provider {
            ActiveProvider::Live(live) => live.store_health(),
            ActiveProvider::Demo(_) => Vec::new(),
        }
    }
}

/// Picks the discovery candidate with the highest positive live-agent
/// count. Ties keep the earliest candidate, so the selection is stable for
/// an unchanged list.
fn select_candidate(projects: &[DiscoveredProject]) -> Option<&DiscoveredProject> {
    projects
        .iter()
        .filter(|p| p.active_agents > 0)
        .fold(None::<&DiscoveredProject>, |acc, p| match acc {
            Some(best) if best.active_agents >= p.active_agents => Some(best),
            _ => Some(p),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn project(name: &str, active: usize) -> DiscoveredProject {
        let mut p = DiscoveredProject::new(
            name,
            format!("/work/{name}"),
            format!("/work/{name}/.swarm"),
        );
        p.active_agents = active;
        p
    }

    #[test]
    fn test_select_candidate_highest_positive() {
        let projects = vec![project("a", 0), project("b", 3), project("c", 1)];
        assert_eq!(select_candidate(&projects).unwrap().name, "b");
    }

    #[test]
    fn test_select_candidate_none_when_all_zero() {
        let projects = vec![project("a", 0), project("b", 0)];
        assert!(select_candidate(&projects).is_none());
    }

    #[test]
    fn test_select_candidate_tie_keeps_first() {
        let projects = vec![project("a", 2), project("b", 2)];
        assert_eq!(select_candidate(&projects).unwrap().name, "a");
    }

    #[test]
    fn test_starts_in_demo_without_override() {
        let manager = SourceManager::start(None, false).unwrap();
        assert_eq!(manager.mode(), Mode::Demo);
        assert!(!manager.is_frozen());
        assert_eq!(manager.generation(), 0);
    }

    #[test]
    fn test_forced_demo_ignores_override() {
        // Even with a (nonexistent) override, forced demo must not try to
        // connect and must not fail.
        let manager =
            SourceManager::start(Some(Path::new("/no/such/project")), true).unwrap();
        assert_eq!(manager.mode(), Mode::Demo);
    }

    #[test]
    fn test_explicit_override_missing_store_is_fatal() {
        let result = SourceManager::start(Some(Path::new("/no/such/project")), false);
        assert!(result.is_err());
    }

    #[test]
    fn test_unconnectable_candidate_keeps_demo() {
        let mut manager = SourceManager::start(None, false).unwrap();
        // The candidate claims agents but its store doesn't exist; the
        // connection fails and the manager stays in demo mode.
        manager.handle_projects_update(vec![project("ghost", 5)]);
        assert_eq!(manager.mode(), Mode::Demo);
        assert_eq!(manager.generation(), 0);
    }

    #[test]
    fn test_dashboard_state_demo() {
        let mut manager = SourceManager::start(None, false).unwrap();
        manager.handle_projects_update(vec![project("a", 0)]);
        let state = manager.dashboard_state();
        assert_eq!(state.mode, Mode::Demo);
        assert!(state.active_project.is_none());
        assert_eq!(state.projects.len(), 1);
        assert!(!state.projects[0].is_active);
    }

    #[test]
    fn test_demo_has_no_event_stream() {
        let mut manager = SourceManager::start(None, false).unwrap();
        manager.advance_demo(1_750_000_000_000);
        assert_eq!(manager.max_event_id(), 0);
        assert!(manager.events_since(0).is_empty());
    }
}
