//! Errors surfaced by sync invocations.

use game_ingestor::providers::ProviderError;

/// Failure of one sync invocation.
///
/// Lock contention is not represented here; it is a normal
/// [`SyncOutcome::Busy`](crate::job::SyncOutcome::Busy).
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// The game source failed after its own retries.
    #[error("upstream: {source}")]
    Upstream {
        #[from]
        source: ProviderError,
    },
    /// Reading or writing the database failed.
    #[error("storage: {0:#}")]
    Storage(#[from] anyhow::Error),
    /// The database schema is behind this build; run `migrate` first.
    #[error("database needs migration ({} pending)", pending.len())]
    NeedsMigration { pending: Vec<String> },
    /// Stop/restart/read-back for a target that was never synced.
    #[error("no import job for {target}")]
    UnknownJob { target: String },
}

impl SyncError {
    /// Whether calling again later, unchanged, may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Upstream { source } => source.is_transient(),
            SyncError::Storage(_) => true,
            SyncError::NeedsMigration { .. } | SyncError::UnknownJob { .. } => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification() {
        assert!(SyncError::Storage(anyhow::anyhow!("locked")).is_retryable());
        let needs = SyncError::NeedsMigration {
            pending: vec!["2025-01-01-000000_init".into()],
        };
        assert!(!needs.is_retryable());
        assert_eq!(needs.to_string(), "database needs migration (1 pending)");
    }
}
