//! Postgres-backed [`SecurityStore`]: one database transaction per unit of work.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Postgres, Transaction};

use crate::db::connection::DbPool;
use crate::error::AppError;
use crate::models::permission::{Actor, NewRolePermission, RolePermission};
use crate::models::security::{AccountLockout, NewLoginAttempt, NewSecurityEvent};
use crate::models::session::{NewSession, Session};
use crate::models::token::{BlacklistedToken, NewRefreshToken, RefreshRevocation, RefreshToken};
use crate::models::user::{PasswordUpdate, User};
use crate::repositories::unit_of_work::{
    CredentialStore, PermissionStore, SecurityLedger, SecurityStore, SessionStore, TokenStore,
    UnitOfWork,
};
use crate::repositories::{permissions, security_ledger, sessions, tokens, users};
use crate::types::{RoleId, SessionId, UserId};

#[derive(Clone)]
pub struct PgSecurityStore {
    pool: DbPool,
}

impl PgSecurityStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }
}

#[async_trait]
impl SecurityStore for PgSecurityStore {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, AppError> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgUnitOfWork { tx }))
    }

    async fn ping(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1").execute(&*self.pool).await?;
        Ok(())
    }
}

pub struct PgUnitOfWork {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl CredentialStore for PgUnitOfWork {
    async fn find_user_by_username(&mut self, username: &str) -> Result<Option<User>, AppError> {
        Ok(users::find_user_by_username(&mut self.tx, username).await?)
    }

    async fn find_user_by_id(&mut self, id: UserId) -> Result<Option<User>, AppError> {
        Ok(users::find_user_by_id(&mut self.tx, id).await?)
    }

    async fn update_password(
        &mut self,
        id: UserId,
        expected_version: i32,
        update: &PasswordUpdate,
    ) -> Result<bool, AppError> {
        Ok(users::update_password(&mut self.tx, id, expected_version, update).await?)
    }

    async fn set_user_enabled(
        &mut self,
        id: UserId,
        expected_version: i32,
        enabled: bool,
    ) -> Result<bool, AppError> {
        Ok(users::set_user_enabled(&mut self.tx, id, expected_version, enabled).await?)
    }
}

#[async_trait]
impl SecurityLedger for PgUnitOfWork {
    async fn is_ip_blacklisted(&mut self, ip: &str, now: DateTime<Utc>) -> Result<bool, AppError> {
        Ok(security_ledger::is_ip_blacklisted(&mut self.tx, ip, now).await?)
    }

    async fn is_ip_whitelisted(&mut self, ip: &str, now: DateTime<Utc>) -> Result<bool, AppError> {
        Ok(security_ledger::is_ip_whitelisted(&mut self.tx, ip, now).await?)
    }

    async fn record_login_attempt(
        &mut self,
        attempt: &NewLoginAttempt,
        at: DateTime<Utc>,
    ) -> Result<(), AppError> {
        Ok(security_ledger::insert_login_attempt(&mut self.tx, attempt, at).await?)
    }

    async fn last_successful_login(
        &mut self,
        username: &str,
    ) -> Result<Option<DateTime<Utc>>, AppError> {
        Ok(security_ledger::last_successful_login(&mut self.tx, username).await?)
    }

    async fn count_failed_attempts_since(
        &mut self,
        username: &str,
        since: DateTime<Utc>,
    ) -> Result<i64, AppError> {
        Ok(security_ledger::count_failed_attempts_since(&mut self.tx, username, since).await?)
    }

    async fn find_active_lockout(
        &mut self,
        username: &str,
    ) -> Result<Option<AccountLockout>, AppError> {
        Ok(security_ledger::find_active_lockout(&mut self.tx, username).await?)
    }

    async fn latest_lockout_end(
        &mut self,
        username: &str,
    ) -> Result<Option<DateTime<Utc>>, AppError> {
        Ok(security_ledger::latest_lockout_end(&mut self.tx, username).await?)
    }

    async fn open_lockout(
        &mut self,
        username: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        failed_attempts: i32,
        reason: &str,
    ) -> Result<(), AppError> {
        Ok(security_ledger::insert_lockout(
            &mut self.tx,
            username,
            start,
            end,
            failed_attempts,
            reason,
        )
        .await?)
    }

    async fn extend_lockout(
        &mut self,
        lockout_id: i64,
        end: DateTime<Utc>,
        failed_attempts: i32,
    ) -> Result<(), AppError> {
        Ok(security_ledger::extend_lockout(&mut self.tx, lockout_id, end, failed_attempts).await?)
    }

    async fn deactivate_lockouts(
        &mut self,
        username: &str,
        now: DateTime<Utc>,
    ) -> Result<u64, AppError> {
        Ok(security_ledger::deactivate_lockouts(&mut self.tx, username, now).await?)
    }

    async fn record_security_event(
        &mut self,
        event: &NewSecurityEvent,
        at: DateTime<Utc>,
    ) -> Result<(), AppError> {
        Ok(security_ledger::insert_security_event(&mut self.tx, event, at).await?)
    }
}

#[async_trait]
impl TokenStore for PgUnitOfWork {
    async fn insert_refresh_token(
        &mut self,
        token: &NewRefreshToken,
        created_at: DateTime<Utc>,
    ) -> Result<(), AppError> {
        Ok(tokens::insert_refresh_token(&mut self.tx, token, created_at).await?)
    }

    async fn find_refresh_token(
        &mut self,
        token_hash: &str,
    ) -> Result<Option<RefreshToken>, AppError> {
        Ok(tokens::find_refresh_token(&mut self.tx, token_hash).await?)
    }

    async fn revoke_refresh_token(
        &mut self,
        token_hash: &str,
        revocation: &RefreshRevocation,
        now: DateTime<Utc>,
    ) -> Result<bool, AppError> {
        Ok(tokens::revoke_refresh_token(&mut self.tx, token_hash, revocation, now).await?)
    }

    async fn revoke_refresh_tokens_for_user(
        &mut self,
        user_id: UserId,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<u64, AppError> {
        Ok(tokens::revoke_refresh_tokens_for_user(&mut self.tx, user_id, reason, now).await?)
    }

    async fn blacklist_token(&mut self, token: &BlacklistedToken) -> Result<(), AppError> {
        Ok(tokens::insert_blacklisted_token(&mut self.tx, token).await?)
    }

    async fn is_token_blacklisted(&mut self, jti: &str) -> Result<bool, AppError> {
        Ok(tokens::is_token_blacklisted(&mut self.tx, jti).await?)
    }

    async fn purge_expired_blacklist(&mut self, now: DateTime<Utc>) -> Result<u64, AppError> {
        Ok(tokens::cleanup_expired_blacklist(&mut self.tx, now).await?)
    }

    async fn purge_refresh_tokens(&mut self, cutoff: DateTime<Utc>) -> Result<u64, AppError> {
        Ok(tokens::cleanup_refresh_tokens(&mut self.tx, cutoff).await?)
    }
}

#[async_trait]
impl SessionStore for PgUnitOfWork {
    async fn open_session(
        &mut self,
        session: &NewSession,
        now: DateTime<Utc>,
    ) -> Result<SessionId, AppError> {
        Ok(sessions::insert_session(&mut self.tx, session, now).await?)
    }

    async fn find_session(&mut self, id: SessionId) -> Result<Option<Session>, AppError> {
        Ok(sessions::find_session(&mut self.tx, id).await?)
    }

    async fn end_session(
        &mut self,
        id: SessionId,
        user_id: UserId,
        now: DateTime<Utc>,
    ) -> Result<bool, AppError> {
        Ok(sessions::end_session(&mut self.tx, id, user_id, now).await?)
    }

    async fn end_sessions_for_user(
        &mut self,
        user_id: UserId,
        now: DateTime<Utc>,
    ) -> Result<u64, AppError> {
        Ok(sessions::end_sessions_for_user(&mut self.tx, user_id, now).await?)
    }
}

#[async_trait]
impl PermissionStore for PgUnitOfWork {
    async fn list_role_permissions(
        &mut self,
        role_id: RoleId,
    ) -> Result<Vec<RolePermission>, AppError> {
        Ok(permissions::list_role_permissions(&mut self.tx, role_id).await?)
    }

    async fn delete_role_permission(
        &mut self,
        id: i64,
        expected_version: i32,
    ) -> Result<bool, AppError> {
        Ok(permissions::delete_role_permission(&mut self.tx, id, expected_version).await?)
    }

    async fn insert_role_permission(
        &mut self,
        grant: &NewRolePermission,
        now: DateTime<Utc>,
    ) -> Result<(), AppError> {
        Ok(permissions::insert_role_permission(&mut self.tx, grant, now).await?)
    }

    async fn archive_role_permission(
        &mut self,
        grant: &RolePermission,
        archived_by: &Actor,
        now: DateTime<Utc>,
    ) -> Result<(), AppError> {
        Ok(permissions::insert_permission_history(&mut self.tx, grant, archived_by, now).await?)
    }

    async fn role_has_permission(
        &mut self,
        role_id: RoleId,
        path: &str,
    ) -> Result<bool, AppError> {
        Ok(permissions::role_has_permission(&mut self.tx, role_id, path).await?)
    }
}

#[async_trait]
impl UnitOfWork for PgUnitOfWork {
    async fn commit(self: Box<Self>) -> Result<(), AppError> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), AppError> {
        self.tx.rollback().await?;
        Ok(())
    }
}
