//! Discovered source-instance records.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// A filesystem location recognized as a valid swarm state root.
///
/// Created and destroyed by periodic directory scans; `active_agents` is
/// updated independently by the count-polling loop. Whether this instance
/// is the one currently backing live mode is computed at read time by the
/// source manager, not stored here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoveredProject {
    /// Display name (the directory name)
    pub name: String,

    /// Absolute path to the project root
    pub path: PathBuf,

    /// Absolute path to the `.swarm` state directory
    pub state_dir: PathBuf,

    /// Live agent count from the most recent poll
    pub active_agents: usize,
}

impl DiscoveredProject {
    /// Creates a project entry with a zero agent count.
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>, state_dir: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            state_dir: state_dir.into(),
            active_agents: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_project_starts_at_zero_agents() {
        let project = DiscoveredProject::new("alpha", "/work/alpha", "/work/alpha/.swarm");
        assert_eq!(project.active_agents, 0);
        assert_eq!(project.name, "alpha");
    }
}
