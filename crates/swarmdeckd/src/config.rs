//! Daemon configuration from environment-style key/value input.

use std::env;
use std::path::PathBuf;

/// Default WebSocket/HTTP port.
pub const DEFAULT_PORT: u16 = 8900;

/// Default poll/broadcast tick interval in milliseconds.
pub const DEFAULT_POLL_MS: u64 = 500;

/// Default discovery re-scan interval in seconds.
pub const DEFAULT_SCAN_INTERVAL_SECS: u64 = 30;

/// Daemon configuration.
///
/// Loaded from the environment; every key has a default so a bare
/// `swarmdeckd start` works out of the box in demo mode.
#[derive(Debug, Clone)]
pub struct Config {
    /// Port the gateway binds on (`SWARMDECK_PORT`)
    pub port: u16,

    /// Poll/broadcast tick interval in ms (`SWARMDECK_POLL_MS`)
    pub poll_ms: u64,

    /// Force demo mode even when live projects exist (`SWARMDECK_DEMO`)
    pub force_demo: bool,

    /// Explicit project root; set ⇒ live mode is attempted against it at
    /// startup and discovery-driven switching is frozen
    /// (`SWARMDECK_PROJECT_DIR`)
    pub project_dir: Option<PathBuf>,

    /// Roots scanned for swarm state directories
    /// (`SWARMDECK_SCAN_ROOTS`, colon-separated)
    pub scan_roots: Vec<PathBuf>,

    /// Discovery re-scan interval in seconds
    pub scan_interval_secs: u64,
}

impl Config {
    /// Loads configuration from the environment.
    pub fn from_env() -> Self {
        let port = env::var("SWARMDECK_PORT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_PORT);

        let poll_ms = env::var("SWARMDECK_POLL_MS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_POLL_MS);

        let force_demo = env::var("SWARMDECK_DEMO")
            .map(|v| is_truthy(&v))
            .unwrap_or(false);

        let project_dir = env::var("SWARMDECK_PROJECT_DIR")
            .ok()
            .filter(|v| !v.is_empty())
            .map(PathBuf::from);

        let scan_roots = env::var("SWARMDECK_SCAN_ROOTS")
            .ok()
            .map(|v| v.split(':').filter(|s| !s.is_empty()).map(PathBuf::from).collect())
            .unwrap_or_else(default_scan_roots);

        Self {
            port,
            poll_ms,
            force_demo,
            project_dir,
            scan_roots,
            scan_interval_secs: DEFAULT_SCAN_INTERVAL_SECS,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            poll_ms: DEFAULT_POLL_MS,
            force_demo: false,
            project_dir: None,
            scan_roots: default_scan_roots(),
            scan_interval_secs: DEFAULT_SCAN_INTERVAL_SECS,
        }
    }
}

/// Conventional places multi-agent runs live under the user's home.
fn default_scan_roots() -> Vec<PathBuf> {
    let Some(home) = dirs::home_dir() else {
        return Vec::new();
    };
    ["work", "projects", "src"]
        .iter()
        .map(|d| home.join(d))
        .collect()
}

fn is_truthy(v: &str) -> bool {
    matches!(v, "1" | "true" | "yes" | "on")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truthy_values() {
        assert!(is_truthy("1"));
        assert!(is_truthy("true"));
        assert!(!is_truthy("0"));
        assert!(!is_truthy(""));
        assert!(!is_truthy("no"));
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.poll_ms, DEFAULT_POLL_MS);
        assert!(!config.force_demo);
        assert!(config.project_dir.is_none());
    }
}
