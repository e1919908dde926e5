use std::time::Duration;

/// Reconciliation engine tuning
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Time between passes when driven by the daemon
    pub interval: Duration,
    /// Concurrent transaction detail lookups per batch
    pub max_parallel_lookups: usize,
    /// Confirmations a transaction needs before it is applied
    pub confirmation_threshold: u64,
    /// Age after which another pass may take over a source's lock
    pub lock_timeout: Duration,
    /// How many escrow spends to walk back when checking an input chain
    pub traceback_depth: usize,
    /// Previous checkpoints kept for rollback detection
    pub retained_checkpoints: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(20),
            max_parallel_lookups: 5,
            confirmation_threshold: 1,
            lock_timeout: Duration::from_secs(15 * 60),
            traceback_depth: 5,
            retained_checkpoints: 20,
        }
    }
}
