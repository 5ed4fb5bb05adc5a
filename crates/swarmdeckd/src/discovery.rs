//! Project discovery - finds swarm state roots on disk.
//!
//! Scans a configured set of root directories for immediate subdirectories
//! containing a non-empty session store, and notifies listeners only when
//! the set of candidates structurally changes. Unchanged re-scans are cheap
//! and produce zero notifications - the scan runs every few tens of seconds
//! for the lifetime of the daemon.
//!
//! # Panic-Free Guarantees
//!
//! This module follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - A missing or unreadable root contributes zero candidates, never an error

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use swarmdeck_core::DiscoveredProject;

use crate::store::{SESSIONS_DB, STATE_DIR_NAME};

// ============================================================================
// Constants
// ============================================================================

/// Default re-scan period.
pub const DEFAULT_SCAN_INTERVAL: Duration = Duration::from_secs(30);

// ============================================================================
// Change Handlers
// ============================================================================

/// Callback invoked synchronously with the new project list on change.
pub type ChangeHandler = Box<dyn Fn(&[DiscoveredProject]) + Send + Sync>;

// ============================================================================
// Discovery Service
// ============================================================================

struct DiscoveryState {
    roots: Vec<PathBuf>,
    projects: Vec<DiscoveredProject>,
    fingerprint: String,
}

/// Periodically scans the configured roots for swarm projects.
///
/// Cheap to clone; all clones share the same state and handler list.
#[derive(Clone)]
pub struct DiscoveryService {
    state: Arc<Mutex<DiscoveryState>>,
    handlers: Arc<Mutex<Vec<ChangeHandler>>>,
}

impl DiscoveryService {
    /// Creates a discovery service over the given scan roots.
    pub fn new(roots: Vec<PathBuf>) -> Self {
        Self {
            state: Arc::new(Mutex::new(DiscoveryState {
                roots,
                projects: Vec::new(),
                fingerprint: String::new(),
            })),
            handlers: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Returns the last computed project list.
    pub fn current(&self) -> Vec<DiscoveredProject> {
        match self.state.lock() {
            Ok(state) => state.projects.clone(),
            Err(_) => Vec::new(),
        }
    }

    /// Registers a change handler.
    ///
    /// Handlers run synchronously from whichever call detected the change
    /// (`rescan` or `update_live_count`); they should hand work off quickly.
    pub fn on_change(&self, handler: ChangeHandler) {
        if let Ok(mut handlers) = self.handlers.lock() {
            handlers.push(handler);
        }
    }

    /// Scans the roots once.
    ///
    /// When the structural fingerprint (the sorted candidate path list) is
    /// unchanged, nothing fires. When it changed, previous live-agent
    /// counts are carried forward by path and every handler is invoked
    /// with the new list.
    pub fn rescan(&self) {
        let candidates = {
            let Ok(state) = self.state.lock() else {
                return;
            };
            scan_roots(&state.roots)
        };

        let fingerprint = candidates
            .iter()
            .map(|p| p.path.display().to_string())
            .collect::<Vec<_>>()
            .join("\n");

        let notified = {
            let Ok(mut state) = self.state.lock() else {
                return;
            };
            if fingerprint == state.fingerprint {
                debug!(projects = state.projects.len(), "Discovery unchanged");
                None
            } else {
                // Carry live-agent counts forward for paths that survived
                // the change; new paths start at zero.
                let mut next = candidates;
                for project in &mut next {
                    if let Some(prev) = state.projects.iter().find(|p| p.path == project.path) {
                        project.active_agents = prev.active_agents;
                    }
                }

                info!(projects = next.len(), "Discovered project set changed");
                state.projects = next.clone();
                state.fingerprint = fingerprint;
                Some(next)
            }
        };

        if let Some(projects) = notified {
            self.notify(&projects);
        }
    }

    /// Updates one project's live-agent count.
    ///
    /// Fires handlers only when the count actually changed for that
    /// project; a no-op update is silent.
    pub fn update_live_count(&self, name: &str, count: usize) {
        let changed = {
            let Ok(mut state) = self.state.lock() else {
                return;
            };
            match state.projects.iter_mut().find(|p| p.name == name) {
                Some(project) if project.active_agents != count => {
                    debug!(
                        project = name,
                        from = project.active_agents,
                        to = count,
                        "Live agent count changed"
                    );
                    project.active_agents = count;
                    Some(state.projects.clone())
                }
                _ => None,
            }
        };

        if let Some(projects) = changed {
            self.notify(&projects);
        }
    }

    /// Spawns the periodic re-scan task. Runs one scan immediately.
    pub fn spawn(&self, interval: Duration, cancel_token: CancellationToken) {
        let service = self.clone();
        tokio::spawn(async move {
            service.rescan();
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            // The first interval tick fires immediately; consume it so the
            // startup scan above isn't doubled.
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = cancel_token.cancelled() => {
                        debug!("Discovery scanner shutting down");
                        break;
                    }
                    _ = ticker.tick() => {
                        service.rescan();
                    }
                }
            }
        });
    }

    fn notify(&self, projects: &[DiscoveredProject]) {
        let Ok(handlers) = self.handlers.lock() else {
            return;
        };
        for handler in handlers.iter() {
            handler(projects);
        }
    }
}

// ============================================================================
// Filesystem Scan
// ============================================================================

/// Lists candidate projects under the given roots.
///
/// A candidate is an immediate subdirectory holding a non-empty session
/// store at `<dir>/.swarm/sessions.db`. Roots that don't exist or can't be
/// listed are skipped.
fn scan_roots(roots: &[PathBuf]) -> Vec<DiscoveredProject> {
    let mut candidates = Vec::new();

    for root in roots {
        let entries = match std::fs::read_dir(root) {
            Ok(entries) => entries,
            Err(e) => {
                debug!(root = %root.display(), error = %e, "Skipping unreadable scan root");
                continue;
            }
        };

        for entry in entries.flatten() {
            let path = entry.path();
            if !path.is_dir() {
                continue;
            }

            let state_dir = path.join(STATE_DIR_NAME);
            let marker = state_dir.join(SESSIONS_DB);
            let non_empty = std::fs::metadata(&marker)
                .map(|m| m.is_file() && m.len() > 0)
                .unwrap_or(false);
            if !non_empty {
                continue;
            }

            let name = match path.file_name().and_then(|n| n.to_str()) {
                Some(name) => name.to_string(),
                None => {
                    warn!(path = %path.display(), "Skipping candidate with undecodable name");
                    continue;
                }
            };

            candidates.push(DiscoveredProject::new(name, path, state_dir));
        }
    }

    candidates.sort_by(|a, b| a.path.cmp(&b.path));
    candidates
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    /// Creates `<root>/<name>/.swarm/sessions.db` with non-empty content.
    fn make_project(root: &std::path::Path, name: &str) {
        let state_dir = root.join(name).join(STATE_DIR_NAME);
        fs::create_dir_all(&state_dir).unwrap();
        fs::write(state_dir.join(SESSIONS_DB), b"stub").unwrap();
    }

    fn counting_service(root: PathBuf) -> (DiscoveryService, Arc<AtomicUsize>) {
        let service = DiscoveryService::new(vec![root]);
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = Arc::clone(&calls);
        service.on_change(Box::new(move |_| {
            calls_clone.fetch_add(1, Ordering::SeqCst);
        }));
        (service, calls)
    }

    #[test]
    fn test_scan_finds_projects_with_nonempty_marker() {
        let temp = TempDir::new().unwrap();
        make_project(temp.path(), "alpha");
        make_project(temp.path(), "beta");
        // No marker at all
        fs::create_dir_all(temp.path().join("gamma")).unwrap();
        // Empty marker
        let empty_state = temp.path().join("delta").join(STATE_DIR_NAME);
        fs::create_dir_all(&empty_state).unwrap();
        fs::write(empty_state.join(SESSIONS_DB), b"").unwrap();

        let found = scan_roots(&[temp.path().to_path_buf()]);
        let names: Vec<&str> = found.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["alpha", "beta"]);
    }

    #[test]
    fn test_missing_root_contributes_nothing() {
        let found = scan_roots(&[PathBuf::from("/no/such/root/anywhere")]);
        assert!(found.is_empty());
    }

    #[test]
    fn test_unchanged_rescan_fires_no_handlers() {
        let temp = TempDir::new().unwrap();
        make_project(temp.path(), "alpha");
        let (service, calls) = counting_service(temp.path().to_path_buf());

        service.rescan();
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        // Same filesystem layout: the second scan must be silent.
        service.rescan();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_structural_change_fires_handlers() {
        let temp = TempDir::new().unwrap();
        make_project(temp.path(), "alpha");
        let (service, calls) = counting_service(temp.path().to_path_buf());

        service.rescan();
        make_project(temp.path(), "beta");
        service.rescan();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(service.current().len(), 2);
    }

    #[test]
    fn test_counts_carried_forward_across_rescans() {
        let temp = TempDir::new().unwrap();
        make_project(temp.path(), "alpha");
        let (service, _calls) = counting_service(temp.path().to_path_buf());

        service.rescan();
        service.update_live_count("alpha", 4);

        make_project(temp.path(), "beta");
        service.rescan();

        let projects = service.current();
        let alpha = projects.iter().find(|p| p.name == "alpha").unwrap();
        let beta = projects.iter().find(|p| p.name == "beta").unwrap();
        assert_eq!(alpha.active_agents, 4, "count must survive the re-scan");
        assert_eq!(beta.active_agents, 0);
    }

    #[test]
    fn test_update_live_count_notifies_only_on_change() {
        let temp = TempDir::new().unwrap();
        make_project(temp.path(), "alpha");
        let (service, calls) = counting_service(temp.path().to_path_buf());

        service.rescan();
        let after_scan = calls.load(Ordering::SeqCst);

        service.update_live_count("alpha", 2);
        assert_eq!(calls.load(Ordering::SeqCst), after_scan + 1);

        // Same value again: silent.
        service.update_live_count("alpha", 2);
        assert_eq!(calls.load(Ordering::SeqCst), after_scan + 1);

        // Unknown project: silent.
        service.update_live_count("nope", 9);
        assert_eq!(calls.load(Ordering::SeqCst), after_scan + 1);
    }
}
