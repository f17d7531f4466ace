//! Explicit configuration for the analysis engine.
//!
//! The source this system was distilled from read a process-wide mutable
//! LLM configuration from ambient state; here it is a plain value
//! threaded through [`crate::session::SessionManager::new`] and the
//! cache constructor at construction time, mirroring the builder-style
//! config structs (`ClientConfig`, `OrchestratorConfig`) this crate's
//! style is grounded on. No component reads ambient state.

use std::path::PathBuf;
use std::time::Duration;

use tracing::Level;

/// Default cap on resolver iterations before the Workflow Orchestrator
/// gives up and returns a diagnostic listing (§4.10).
pub const DEFAULT_RESOLVER_ITERATION_CAP: usize = 20;
const MIN_RESOLVER_ITERATION_CAP: usize = 1;
const MAX_RESOLVER_ITERATION_CAP: usize = 50;

#[derive(Debug, Clone)]
pub struct Config {
    pub max_concurrent_sessions: usize,
    pub session_idle_timeout: Duration,
    pub log_level: Level,
    pub cache_root: PathBuf,
    pub resolver_iteration_cap: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_concurrent_sessions: 64,
            session_idle_timeout: Duration::from_secs(30 * 60),
            log_level: Level::INFO,
            cache_root: PathBuf::from("./completed-sessions"),
            resolver_iteration_cap: DEFAULT_RESOLVER_ITERATION_CAP,
        }
    }
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_concurrent_sessions(mut self, max: usize) -> Self {
        self.max_concurrent_sessions = max;
        self
    }

    pub fn with_session_idle_timeout(mut self, timeout: Duration) -> Self {
        self.session_idle_timeout = timeout;
        self
    }

    pub fn with_log_level(mut self, level: Level) -> Self {
        self.log_level = level;
        self
    }

    pub fn with_cache_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.cache_root = root.into();
        self
    }

    /// Bounded to [1, 50]; out-of-range values are clamped rather than
    /// rejected, since this is a construction-time convenience, not a
    /// user-submitted value.
    pub fn with_resolver_iteration_cap(mut self, cap: usize) -> Self {
        self.resolver_iteration_cap =
            cap.clamp(MIN_RESOLVER_ITERATION_CAP, MAX_RESOLVER_ITERATION_CAP);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamps_iteration_cap_to_bounds() {
        assert_eq!(Config::new().with_resolver_iteration_cap(0).resolver_iteration_cap, 1);
        assert_eq!(Config::new().with_resolver_iteration_cap(500).resolver_iteration_cap, 50);
        assert_eq!(Config::new().with_resolver_iteration_cap(10).resolver_iteration_cap, 10);
    }

    #[test]
    fn default_matches_spec() {
        let cfg = Config::default();
        assert_eq!(cfg.resolver_iteration_cap, DEFAULT_RESOLVER_ITERATION_CAP);
    }
}
