//! Transaction management utilities for repositories.

use crate::error::AppError;
use crate::repositories::unit_of_work::UnitOfWork;

/// Decides whether a unit of work that produced an error is still committed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitPolicy {
    /// Commit on success only.
    OnSuccess,
    /// Commit on success and on expected rejections, so ledger rows written
    /// before the rejection (attempts, lockouts, events) are kept.
    UnlessInternal,
}

impl CommitPolicy {
    fn should_commit<T>(self, outcome: &Result<T, AppError>) -> bool {
        match (self, outcome) {
            (_, Ok(_)) => true,
            (CommitPolicy::OnSuccess, Err(_)) => false,
            (CommitPolicy::UnlessInternal, Err(err)) => !err.is_internal(),
        }
    }
}

/// Commits or rolls back `tx` according to `policy` and returns `outcome`.
///
/// A failed commit replaces a successful outcome. A failed rollback is logged
/// and the original outcome is returned.
pub async fn finish<T>(
    tx: Box<dyn UnitOfWork>,
    outcome: Result<T, AppError>,
    policy: CommitPolicy,
) -> Result<T, AppError> {
    if policy.should_commit(&outcome) {
        tx.commit().await?;
        return outcome;
    }

    if let Err(err) = tx.rollback().await {
        tracing::error!(error = %err, "Failed to roll back unit of work");
    }
    outcome
}
