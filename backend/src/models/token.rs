//! Refresh tokens and revoked access-token identifiers.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;

use crate::types::{SessionId, UserId};

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct RefreshToken {
    pub id: i64,
    /// SHA-256 hex digest of the opaque value handed to the client.
    pub token_hash: String,
    pub user_id: UserId,
    pub session_id: SessionId,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub is_revoked: bool,
    pub revoked_at: Option<DateTime<Utc>>,
    pub revoked_reason: Option<String>,
    /// Hash of the token that replaced this one on rotation.
    pub replaced_by: Option<String>,
}

impl RefreshToken {
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        !self.is_revoked && self.expires_at > now
    }
}

#[derive(Debug, Clone)]
pub struct NewRefreshToken {
    pub token_hash: String,
    pub user_id: UserId,
    pub session_id: SessionId,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct RefreshRevocation {
    pub reason: String,
    pub replaced_by: Option<String>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct BlacklistedToken {
    pub jti: String,
    pub expires_at: DateTime<Utc>,
    pub blacklisted_at: DateTime<Utc>,
    pub reason: Option<String>,
}
