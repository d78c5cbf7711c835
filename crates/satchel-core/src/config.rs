//! Sync tuning options

use std::time::Duration;

const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_CONFLICT_RETENTION: Duration = Duration::from_secs(24 * 60 * 60);

/// Tunables shared by the sync coordinator and the conflict resolver
#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// Bound for one-shot fetches; indefinite blocking on a lost connection
    /// is a correctness bug
    pub fetch_timeout: Duration,
    /// Age at which a pending conflict is pruned
    pub conflict_retention: Duration,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
            conflict_retention: DEFAULT_CONFLICT_RETENTION,
        }
    }
}

impl SyncOptions {
    /// Set the one-shot fetch timeout
    #[must_use]
    pub const fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    /// Set the pending-conflict retention window
    #[must_use]
    pub const fn with_conflict_retention(mut self, retention: Duration) -> Self {
        self.conflict_retention = retention;
        self
    }
}
