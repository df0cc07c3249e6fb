//! Decides whether a client address may attempt to log in.

use chrono::{DateTime, Utc};

use crate::error::AppError;
use crate::repositories::UnitOfWork;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IpDecision {
    Allowed,
    Denied { reason: &'static str },
}

/// The deny list always wins. The allow list is consulted only when enforced.
pub async fn check(
    tx: &mut dyn UnitOfWork,
    ip: &str,
    allowlist_enforced: bool,
    now: DateTime<Utc>,
) -> Result<IpDecision, AppError> {
    if tx.is_ip_blacklisted(ip, now).await? {
        return Ok(IpDecision::Denied {
            reason: "IP address is blacklisted",
        });
    }

    if allowlist_enforced && !tx.is_ip_whitelisted(ip, now).await? {
        return Ok(IpDecision::Denied {
            reason: "IP address is not whitelisted",
        });
    }

    Ok(IpDecision::Allowed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repositories::{MemoryStore, SecurityStore};

    #[tokio::test]
    async fn deny_list_wins_over_allow_list() {
        let store = MemoryStore::new();
        store.block_ip("10.0.0.9", None).await;
        store.allow_ip("10.0.0.9", None).await;

        let mut tx = store.begin().await.unwrap();
        let decision = check(tx.as_mut(), "10.0.0.9", true, Utc::now()).await.unwrap();
        assert!(matches!(decision, IpDecision::Denied { .. }));
    }

    #[tokio::test]
    async fn allow_list_only_applies_when_enforced() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        let now = Utc::now();
        assert_eq!(
            check(tx.as_mut(), "10.0.0.1", false, now).await.unwrap(),
            IpDecision::Allowed
        );
        assert!(matches!(
            check(tx.as_mut(), "10.0.0.1", true, now).await.unwrap(),
            IpDecision::Denied { .. }
        ));
    }

    #[tokio::test]
    async fn expired_block_no_longer_denies() {
        let store = MemoryStore::new();
        let now = Utc::now();
        store
            .block_ip("10.0.0.2", Some(now - chrono::Duration::minutes(1)))
            .await;
        let mut tx = store.begin().await.unwrap();
        assert_eq!(
            check(tx.as_mut(), "10.0.0.2", false, now).await.unwrap(),
            IpDecision::Allowed
        );
    }
}
