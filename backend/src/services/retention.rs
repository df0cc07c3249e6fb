//! Token retention: drops blacklist entries past their expiry and refresh
//! tokens that expired or were revoked more than the retention period ago.

use chrono::{DateTime, Duration, Utc};

use crate::config::Config;
use crate::error::AppError;
use crate::repositories::{finish, CommitPolicy, SecurityStore};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RetentionReport {
    pub blacklist_purged: u64,
    pub refresh_tokens_purged: u64,
}

pub async fn purge(
    store: &dyn SecurityStore,
    config: &Config,
    now: DateTime<Utc>,
) -> Result<RetentionReport, AppError> {
    let cutoff = now - Duration::days(config.token_retention_days as i64);

    let mut tx = store.begin().await?;
    let outcome = async {
        Ok::<RetentionReport, AppError>(RetentionReport {
            blacklist_purged: tx.purge_expired_blacklist(now).await?,
            refresh_tokens_purged: tx.purge_refresh_tokens(cutoff).await?,
        })
    }
    .await;
    finish(tx, outcome, CommitPolicy::OnSuccess).await
}
