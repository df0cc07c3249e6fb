//! Store traits for the security ledger, grouped into one transactional handle.
//!
//! Every operation that writes opens a [`UnitOfWork`] through
//! [`SecurityStore::begin`], performs its reads and writes through the
//! per-concern traits below, and hands the handle to
//! [`crate::repositories::transaction::finish`], which commits or rolls back
//! exactly once.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::AppError;
use crate::models::permission::{Actor, NewRolePermission, RolePermission};
use crate::models::security::{AccountLockout, NewLoginAttempt, NewSecurityEvent};
use crate::models::session::{NewSession, Session};
use crate::models::token::{BlacklistedToken, NewRefreshToken, RefreshRevocation, RefreshToken};
use crate::models::user::{PasswordUpdate, User};
use crate::types::{RoleId, SessionId, UserId};

/// User accounts.
#[async_trait]
pub trait CredentialStore: Send {
    async fn find_user_by_username(&mut self, username: &str) -> Result<Option<User>, AppError>;

    async fn find_user_by_id(&mut self, id: UserId) -> Result<Option<User>, AppError>;

    /// Returns `false` when `expected_version` no longer matches.
    async fn update_password(
        &mut self,
        id: UserId,
        expected_version: i32,
        update: &PasswordUpdate,
    ) -> Result<bool, AppError>;

    /// Returns `false` when `expected_version` no longer matches.
    async fn set_user_enabled(
        &mut self,
        id: UserId,
        expected_version: i32,
        enabled: bool,
    ) -> Result<bool, AppError>;
}

/// IP lists, login attempts, lockouts and the security event log.
#[async_trait]
pub trait SecurityLedger: Send {
    async fn is_ip_blacklisted(&mut self, ip: &str, now: DateTime<Utc>) -> Result<bool, AppError>;

    async fn is_ip_whitelisted(&mut self, ip: &str, now: DateTime<Utc>) -> Result<bool, AppError>;

    async fn record_login_attempt(
        &mut self,
        attempt: &NewLoginAttempt,
        at: DateTime<Utc>,
    ) -> Result<(), AppError>;

    async fn last_successful_login(
        &mut self,
        username: &str,
    ) -> Result<Option<DateTime<Utc>>, AppError>;

    /// Failed attempts strictly after `since`.
    async fn count_failed_attempts_since(
        &mut self,
        username: &str,
        since: DateTime<Utc>,
    ) -> Result<i64, AppError>;

    async fn find_active_lockout(
        &mut self,
        username: &str,
    ) -> Result<Option<AccountLockout>, AppError>;

    /// Latest end time across all lockouts of `username`, active or not.
    async fn latest_lockout_end(
        &mut self,
        username: &str,
    ) -> Result<Option<DateTime<Utc>>, AppError>;

    /// Merges into the active lockout when one already exists.
    async fn open_lockout(
        &mut self,
        username: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        failed_attempts: i32,
        reason: &str,
    ) -> Result<(), AppError>;

    async fn extend_lockout(
        &mut self,
        lockout_id: i64,
        end: DateTime<Utc>,
        failed_attempts: i32,
    ) -> Result<(), AppError>;

    /// Deactivates every active lockout, pulling future end times back to `now`.
    async fn deactivate_lockouts(
        &mut self,
        username: &str,
        now: DateTime<Utc>,
    ) -> Result<u64, AppError>;

    async fn record_security_event(
        &mut self,
        event: &NewSecurityEvent,
        at: DateTime<Utc>,
    ) -> Result<(), AppError>;
}

/// Refresh tokens and the access-token blacklist.
#[async_trait]
pub trait TokenStore: Send {
    async fn insert_refresh_token(
        &mut self,
        token: &NewRefreshToken,
        created_at: DateTime<Utc>,
    ) -> Result<(), AppError>;

    async fn find_refresh_token(
        &mut self,
        token_hash: &str,
    ) -> Result<Option<RefreshToken>, AppError>;

    /// Revokes only a token that is not revoked yet; `false` means another
    /// request got there first.
    async fn revoke_refresh_token(
        &mut self,
        token_hash: &str,
        revocation: &RefreshRevocation,
        now: DateTime<Utc>,
    ) -> Result<bool, AppError>;

    async fn revoke_refresh_tokens_for_user(
        &mut self,
        user_id: UserId,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<u64, AppError>;

    /// Inserting a jti that is already present is a no-op.
    async fn blacklist_token(&mut self, token: &BlacklistedToken) -> Result<(), AppError>;

    async fn is_token_blacklisted(&mut self, jti: &str) -> Result<bool, AppError>;

    async fn purge_expired_blacklist(&mut self, now: DateTime<Utc>) -> Result<u64, AppError>;

    /// Deletes refresh tokens that expired, or were revoked, before `cutoff`.
    async fn purge_refresh_tokens(&mut self, cutoff: DateTime<Utc>) -> Result<u64, AppError>;
}

/// Login sessions.
#[async_trait]
pub trait SessionStore: Send {
    async fn open_session(
        &mut self,
        session: &NewSession,
        now: DateTime<Utc>,
    ) -> Result<SessionId, AppError>;

    async fn find_session(&mut self, id: SessionId) -> Result<Option<Session>, AppError>;

    /// Closes the session only if it is still open and owned by `user_id`.
    async fn end_session(
        &mut self,
        id: SessionId,
        user_id: UserId,
        now: DateTime<Utc>,
    ) -> Result<bool, AppError>;

    async fn end_sessions_for_user(
        &mut self,
        user_id: UserId,
        now: DateTime<Utc>,
    ) -> Result<u64, AppError>;
}

/// Role permission grants and their history.
#[async_trait]
pub trait PermissionStore: Send {
    async fn list_role_permissions(
        &mut self,
        role_id: RoleId,
    ) -> Result<Vec<RolePermission>, AppError>;

    /// Returns `false` when the row is gone or its version moved on.
    async fn delete_role_permission(
        &mut self,
        id: i64,
        expected_version: i32,
    ) -> Result<bool, AppError>;

    /// A duplicate (role, path) surfaces as [`AppError::Conflict`].
    async fn insert_role_permission(
        &mut self,
        grant: &NewRolePermission,
        now: DateTime<Utc>,
    ) -> Result<(), AppError>;

    async fn archive_role_permission(
        &mut self,
        grant: &RolePermission,
        archived_by: &Actor,
        now: DateTime<Utc>,
    ) -> Result<(), AppError>;

    async fn role_has_permission(&mut self, role_id: RoleId, path: &str)
        -> Result<bool, AppError>;
}

/// One transaction over every store. Committed or rolled back exactly once.
#[async_trait]
pub trait UnitOfWork:
    CredentialStore + SecurityLedger + TokenStore + SessionStore + PermissionStore + Send
{
    async fn commit(self: Box<Self>) -> Result<(), AppError>;

    async fn rollback(self: Box<Self>) -> Result<(), AppError>;
}

/// Entry point to durable state, shared across requests.
#[async_trait]
pub trait SecurityStore: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, AppError>;

    /// Round-trips to the backing store.
    async fn ping(&self) -> Result<(), AppError>;
}
