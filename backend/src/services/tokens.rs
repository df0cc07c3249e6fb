//! Access-token signing, refresh-token persistence and the blacklist.

use chrono::{DateTime, Utc};

use crate::config::Config;
use crate::error::AppError;
use crate::models::token::{BlacklistedToken, NewRefreshToken, RefreshToken};
use crate::models::user::User;
use crate::repositories::UnitOfWork;
use crate::types::{BranchId, SessionId};
use crate::utils::jwt::{create_access_token, Claims};
use crate::utils::refresh::{generate_refresh_token, hash_refresh_token};

/// A freshly signed token pair whose refresh half is not persisted yet.
#[derive(Debug, Clone)]
pub struct MintedTokens {
    pub access_token: String,
    pub refresh_token: String,
    pub refresh_hash: String,
    pub refresh_expires_at: DateTime<Utc>,
    pub expires_in: i64,
}

pub fn mint(
    config: &Config,
    user: &User,
    branch_id: BranchId,
    session_id: SessionId,
    now: DateTime<Utc>,
) -> Result<MintedTokens, AppError> {
    let ttl = config.access_token_ttl();
    let (access_token, _) =
        create_access_token(user, branch_id, session_id, &config.jwt_secret, ttl)?;
    let refresh_token = generate_refresh_token();
    let refresh_hash = hash_refresh_token(&refresh_token);

    Ok(MintedTokens {
        access_token,
        refresh_token,
        refresh_hash,
        refresh_expires_at: now + config.refresh_token_ttl(),
        expires_in: ttl.num_seconds(),
    })
}

pub async fn persist_refresh(
    tx: &mut dyn UnitOfWork,
    minted: &MintedTokens,
    user: &User,
    session_id: SessionId,
    now: DateTime<Utc>,
) -> Result<(), AppError> {
    tx.insert_refresh_token(
        &NewRefreshToken {
            token_hash: minted.refresh_hash.clone(),
            user_id: user.id,
            session_id,
            expires_at: minted.refresh_expires_at,
        },
        now,
    )
    .await
}

/// Mints a pair and stores its refresh half.
pub async fn issue(
    tx: &mut dyn UnitOfWork,
    config: &Config,
    user: &User,
    branch_id: BranchId,
    session_id: SessionId,
    now: DateTime<Utc>,
) -> Result<MintedTokens, AppError> {
    let minted = mint(config, user, branch_id, session_id, now)?;
    persist_refresh(tx, &minted, user, session_id, now).await?;
    Ok(minted)
}

#[derive(Debug, Clone)]
pub enum RefreshLookup {
    Active(RefreshToken),
    Missing,
    Expired(RefreshToken),
    Revoked(RefreshToken),
}

impl RefreshLookup {
    pub fn rejection_reason(&self) -> Option<&'static str> {
        match self {
            RefreshLookup::Active(_) => None,
            RefreshLookup::Missing => Some("Refresh token not found"),
            RefreshLookup::Expired(_) => Some("Refresh token expired"),
            RefreshLookup::Revoked(_) => Some("Refresh token revoked"),
        }
    }
}

pub async fn lookup_refresh(
    tx: &mut dyn UnitOfWork,
    presented: &str,
    now: DateTime<Utc>,
) -> Result<RefreshLookup, AppError> {
    let hash = hash_refresh_token(presented);
    let Some(record) = tx.find_refresh_token(&hash).await? else {
        return Ok(RefreshLookup::Missing);
    };

    if record.is_revoked {
        Ok(RefreshLookup::Revoked(record))
    } else if record.expires_at <= now {
        Ok(RefreshLookup::Expired(record))
    } else {
        Ok(RefreshLookup::Active(record))
    }
}

/// Blacklists the token's jti until its own expiry. Returns `false` without
/// writing when the token has already expired.
pub async fn blacklist(
    tx: &mut dyn UnitOfWork,
    claims: &Claims,
    reason: &str,
    now: DateTime<Utc>,
) -> Result<bool, AppError> {
    let Some(expires_at) = claims.expires_at() else {
        return Ok(false);
    };
    if expires_at <= now {
        return Ok(false);
    }

    tx.blacklist_token(&BlacklistedToken {
        jti: claims.jti.clone(),
        expires_at,
        blacklisted_at: now,
        reason: Some(reason.to_string()),
    })
    .await?;
    Ok(true)
}
