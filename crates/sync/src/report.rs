use agentpay_core::SourceId;
use serde::Serialize;

/// Outcome of one pass over one payment source
#[derive(Debug, Clone, Serialize)]
pub struct SourceReport {
    pub source_id: SourceId,
    /// Transactions whose checkpoint was advanced past
    pub processed: usize,
    /// Record updates written
    pub applied: usize,
    /// Structurally invalid transactions
    pub skipped_invalid: usize,
    /// Decoded transactions rejected by business validation
    pub rejected: usize,
    /// Local transactions reverted because they left the chain
    pub rolled_back: usize,
    /// First transaction not processed (confirmations or error)
    pub halted_at: Option<String>,
    pub error: Option<String>,
}

impl SourceReport {
    pub fn new(source_id: SourceId) -> Self {
        Self {
            source_id,
            processed: 0,
            applied: 0,
            skipped_invalid: 0,
            rejected: 0,
            rolled_back: 0,
            halted_at: None,
            error: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SyncReport {
    /// Another pass was already running in this process
    pub skipped: bool,
    pub sources: Vec<SourceReport>,
}

impl SyncReport {
    pub fn skipped() -> Self {
        Self { skipped: true, sources: Vec::new() }
    }

    pub fn source(&self, source_id: SourceId) -> Option<&SourceReport> {
        self.sources.iter().find(|s| s.source_id == source_id)
    }

    pub fn total_applied(&self) -> usize {
        self.sources.iter().map(|s| s.applied).sum()
    }

    pub fn has_errors(&self) -> bool {
        self.sources.iter().any(|s| s.error.is_some())
    }
}
