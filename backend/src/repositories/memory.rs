//! In-process [`SecurityStore`] for tests, compiled only with `test-utils`.
//!
//! A unit of work takes the ledger lock for its whole lifetime and mutates a
//! private copy, which replaces the shared ledger only on commit. Units of work
//! are therefore fully serialized and a rollback discards every write.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::error::AppError;
use crate::models::permission::{
    Actor, NewRolePermission, RolePermission, RolePermissionHistory,
};
use crate::models::security::{
    AccountLockout, IpRule, LoginAttempt, NewLoginAttempt, NewSecurityEvent, SecurityEvent,
    SecurityEventType,
};
use crate::models::session::{NewSession, Session};
use crate::models::token::{BlacklistedToken, NewRefreshToken, RefreshRevocation, RefreshToken};
use crate::models::user::{PasswordUpdate, User};
use crate::repositories::unit_of_work::{
    CredentialStore, PermissionStore, SecurityLedger, SecurityStore, SessionStore, TokenStore,
    UnitOfWork,
};
use crate::types::{RoleId, SessionId, UserId};

/// Every table of the ledger, held in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryLedger {
    pub users: Vec<User>,
    pub ip_blacklist: Vec<IpRule>,
    pub ip_whitelist: Vec<IpRule>,
    pub login_attempts: Vec<LoginAttempt>,
    pub lockouts: Vec<AccountLockout>,
    pub security_events: Vec<SecurityEvent>,
    pub refresh_tokens: Vec<RefreshToken>,
    pub blacklisted_tokens: Vec<BlacklistedToken>,
    pub sessions: Vec<Session>,
    pub role_permissions: Vec<RolePermission>,
    pub permission_history: Vec<RolePermissionHistory>,
    next_id: i64,
}

impl MemoryLedger {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    pub fn events_of(&self, kind: SecurityEventType) -> Vec<&SecurityEvent> {
        self.security_events
            .iter()
            .filter(|event| event.event_type == kind.as_str())
            .collect()
    }

    pub fn active_lockout(&self, username: &str) -> Option<&AccountLockout> {
        self.lockouts
            .iter()
            .find(|lockout| lockout.username == username && lockout.is_active)
    }

    pub fn role_paths(&self, role_id: RoleId) -> Vec<String> {
        let mut paths: Vec<String> = self
            .role_permissions
            .iter()
            .filter(|grant| grant.role_level_id == role_id)
            .map(|grant| grant.permission_path.clone())
            .collect();
        paths.sort();
        paths
    }
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    ledger: Arc<Mutex<MemoryLedger>>,
    fail_on: Arc<std::sync::Mutex<HashSet<&'static str>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the committed state.
    pub async fn snapshot(&self) -> MemoryLedger {
        self.ledger.lock().await.clone()
    }

    /// Applies `f` to the committed state outside any unit of work.
    pub async fn seed<F>(&self, f: F)
    where
        F: FnOnce(&mut MemoryLedger),
    {
        let mut ledger = self.ledger.lock().await;
        f(&mut ledger);
    }

    pub async fn insert_user(&self, user: User) {
        self.seed(|ledger| ledger.users.push(user)).await;
    }

    pub async fn block_ip(&self, ip: &str, expires_at: Option<DateTime<Utc>>) {
        self.seed(|ledger| {
            let id = ledger.next_id();
            ledger.ip_blacklist.push(ip_rule(id, ip, expires_at));
        })
        .await;
    }

    pub async fn allow_ip(&self, ip: &str, expires_at: Option<DateTime<Utc>>) {
        self.seed(|ledger| {
            let id = ledger.next_id();
            ledger.ip_whitelist.push(ip_rule(id, ip, expires_at));
        })
        .await;
    }

    /// Makes the named store operation fail with an internal error until cleared.
    /// `delete_role_permission:stale` instead makes version-checked deletes miss.
    pub fn fail_on(&self, operation: &'static str) {
        if let Ok(mut set) = self.fail_on.lock() {
            set.insert(operation);
        }
    }

    pub fn clear_failures(&self) {
        if let Ok(mut set) = self.fail_on.lock() {
            set.clear();
        }
    }
}

fn ip_rule(id: i64, ip: &str, expires_at: Option<DateTime<Utc>>) -> IpRule {
    IpRule {
        id,
        ip_address: ip.to_string(),
        description: None,
        is_active: true,
        created_at: Utc::now(),
        expires_at,
    }
}

#[async_trait]
impl SecurityStore for MemoryStore {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, AppError> {
        let guard = self.ledger.clone().lock_owned().await;
        let working = guard.clone();
        Ok(Box::new(MemoryUnitOfWork {
            guard,
            working,
            fail_on: self.fail_on.clone(),
        }))
    }

    async fn ping(&self) -> Result<(), AppError> {
        if self.should_fail("ping") {
            return Err(injected("ping"));
        }
        Ok(())
    }
}

impl MemoryStore {
    fn should_fail(&self, operation: &str) -> bool {
        self.fail_on
            .lock()
            .map(|set| set.contains(operation))
            .unwrap_or(false)
    }
}

fn injected(operation: &str) -> AppError {
    AppError::InternalServerError(anyhow::anyhow!("injected failure in {operation}"))
}

pub struct MemoryUnitOfWork {
    guard: OwnedMutexGuard<MemoryLedger>,
    working: MemoryLedger,
    fail_on: Arc<std::sync::Mutex<HashSet<&'static str>>>,
}

impl MemoryUnitOfWork {
    fn flagged(&self, operation: &str) -> bool {
        self.fail_on
            .lock()
            .map(|set| set.contains(operation))
            .unwrap_or(false)
    }

    fn check(&self, operation: &str) -> Result<(), AppError> {
        if self.flagged(operation) {
            Err(injected(operation))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl CredentialStore for MemoryUnitOfWork {
    async fn find_user_by_username(&mut self, username: &str) -> Result<Option<User>, AppError> {
        self.check("find_user_by_username")?;
        Ok(self
            .working
            .users
            .iter()
            .find(|user| user.username == username)
            .cloned())
    }

    async fn find_user_by_id(&mut self, id: UserId) -> Result<Option<User>, AppError> {
        self.check("find_user_by_id")?;
        Ok(self.working.users.iter().find(|user| user.id == id).cloned())
    }

    async fn update_password(
        &mut self,
        id: UserId,
        expected_version: i32,
        update: &PasswordUpdate,
    ) -> Result<bool, AppError> {
        self.check("update_password")?;
        let Some(user) = self
            .working
            .users
            .iter_mut()
            .find(|user| user.id == id && user.version == expected_version)
        else {
            return Ok(false);
        };
        user.password_hash = update.password_hash.clone();
        user.must_change_password = update.must_change_password;
        user.change_password_required_before = update.change_password_required_before;
        user.version += 1;
        Ok(true)
    }

    async fn set_user_enabled(
        &mut self,
        id: UserId,
        expected_version: i32,
        enabled: bool,
    ) -> Result<bool, AppError> {
        self.check("set_user_enabled")?;
        let Some(user) = self
            .working
            .users
            .iter_mut()
            .find(|user| user.id == id && user.version == expected_version)
        else {
            return Ok(false);
        };
        user.is_enabled = enabled;
        user.version += 1;
        Ok(true)
    }
}

#[async_trait]
impl SecurityLedger for MemoryUnitOfWork {
    async fn is_ip_blacklisted(&mut self, ip: &str, now: DateTime<Utc>) -> Result<bool, AppError> {
        self.check("is_ip_blacklisted")?;
        Ok(self
            .working
            .ip_blacklist
            .iter()
            .any(|rule| rule.applies_at(ip, now)))
    }

    async fn is_ip_whitelisted(&mut self, ip: &str, now: DateTime<Utc>) -> Result<bool, AppError> {
        self.check("is_ip_whitelisted")?;
        Ok(self
            .working
            .ip_whitelist
            .iter()
            .any(|rule| rule.applies_at(ip, now)))
    }

    async fn record_login_attempt(
        &mut self,
        attempt: &NewLoginAttempt,
        at: DateTime<Utc>,
    ) -> Result<(), AppError> {
        self.check("record_login_attempt")?;
        let id = self.working.next_id();
        self.working.login_attempts.push(LoginAttempt {
            id,
            username: attempt.username.clone(),
            ip_address: attempt.client.ip.clone(),
            user_agent: attempt.client.user_agent.clone(),
            attempted_at: at,
            success: attempt.success,
            failure_reason: attempt.failure_reason.clone(),
        });
        Ok(())
    }

    async fn last_successful_login(
        &mut self,
        username: &str,
    ) -> Result<Option<DateTime<Utc>>, AppError> {
        self.check("last_successful_login")?;
        Ok(self
            .working
            .login_attempts
            .iter()
            .filter(|attempt| attempt.username == username && attempt.success)
            .map(|attempt| attempt.attempted_at)
            .max())
    }

    async fn count_failed_attempts_since(
        &mut self,
        username: &str,
        since: DateTime<Utc>,
    ) -> Result<i64, AppError> {
        self.check("count_failed_attempts_since")?;
        Ok(self
            .working
            .login_attempts
            .iter()
            .filter(|attempt| {
                attempt.username == username && !attempt.success && attempt.attempted_at > since
            })
            .count() as i64)
    }

    async fn find_active_lockout(
        &mut self,
        username: &str,
    ) -> Result<Option<AccountLockout>, AppError> {
        self.check("find_active_lockout")?;
        Ok(self.working.active_lockout(username).cloned())
    }

    async fn latest_lockout_end(
        &mut self,
        username: &str,
    ) -> Result<Option<DateTime<Utc>>, AppError> {
        self.check("latest_lockout_end")?;
        Ok(self
            .working
            .lockouts
            .iter()
            .filter(|lockout| lockout.username == username)
            .map(|lockout| lockout.lockout_end)
            .max())
    }

    async fn open_lockout(
        &mut self,
        username: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        failed_attempts: i32,
        reason: &str,
    ) -> Result<(), AppError> {
        self.check("open_lockout")?;
        if let Some(active) = self
            .working
            .lockouts
            .iter_mut()
            .find(|lockout| lockout.is_active && lockout.username == username)
        {
            active.lockout_end = active.lockout_end.max(end);
            active.failed_attempts = active.failed_attempts.max(failed_attempts);
            return Ok(());
        }
        let id = self.working.next_id();
        self.working.lockouts.push(AccountLockout {
            id,
            username: username.to_string(),
            lockout_start: start,
            lockout_end: end,
            failed_attempts,
            is_active: true,
            reason: Some(reason.to_string()),
        });
        Ok(())
    }

    async fn extend_lockout(
        &mut self,
        lockout_id: i64,
        end: DateTime<Utc>,
        failed_attempts: i32,
    ) -> Result<(), AppError> {
        self.check("extend_lockout")?;
        if let Some(lockout) = self
            .working
            .lockouts
            .iter_mut()
            .find(|lockout| lockout.id == lockout_id && lockout.is_active)
        {
            lockout.lockout_end = lockout.lockout_end.max(end);
            lockout.failed_attempts = failed_attempts;
        }
        Ok(())
    }

    async fn deactivate_lockouts(
        &mut self,
        username: &str,
        now: DateTime<Utc>,
    ) -> Result<u64, AppError> {
        self.check("deactivate_lockouts")?;
        let mut count = 0;
        for lockout in self
            .working
            .lockouts
            .iter_mut()
            .filter(|lockout| lockout.username == username && lockout.is_active)
        {
            lockout.is_active = false;
            lockout.lockout_end = lockout.lockout_end.min(now);
            count += 1;
        }
        Ok(count)
    }

    async fn record_security_event(
        &mut self,
        event: &NewSecurityEvent,
        at: DateTime<Utc>,
    ) -> Result<(), AppError> {
        self.check("record_security_event")?;
        let id = self.working.next_id();
        self.working.security_events.push(SecurityEvent {
            id,
            event_type: event.event_type.as_str().to_string(),
            username: event.username.clone(),
            ip_address: event.client.ip.clone(),
            user_agent: event.client.user_agent.clone(),
            user_id: event.user_id,
            details: event.details.clone(),
            created_at: at,
        });
        Ok(())
    }
}

#[async_trait]
impl TokenStore for MemoryUnitOfWork {
    async fn insert_refresh_token(
        &mut self,
        token: &NewRefreshToken,
        created_at: DateTime<Utc>,
    ) -> Result<(), AppError> {
        self.check("insert_refresh_token")?;
        if self
            .working
            .refresh_tokens
            .iter()
            .any(|existing| existing.token_hash == token.token_hash)
        {
            return Err(AppError::Conflict("Refresh token already exists".to_string()));
        }
        let id = self.working.next_id();
        self.working.refresh_tokens.push(RefreshToken {
            id,
            token_hash: token.token_hash.clone(),
            user_id: token.user_id,
            session_id: token.session_id,
            created_at,
            expires_at: token.expires_at,
            is_revoked: false,
            revoked_at: None,
            revoked_reason: None,
            replaced_by: None,
        });
        Ok(())
    }

    async fn find_refresh_token(
        &mut self,
        token_hash: &str,
    ) -> Result<Option<RefreshToken>, AppError> {
        self.check("find_refresh_token")?;
        Ok(self
            .working
            .refresh_tokens
            .iter()
            .find(|token| token.token_hash == token_hash)
            .cloned())
    }

    async fn revoke_refresh_token(
        &mut self,
        token_hash: &str,
        revocation: &RefreshRevocation,
        now: DateTime<Utc>,
    ) -> Result<bool, AppError> {
        self.check("revoke_refresh_token")?;
        let Some(token) = self
            .working
            .refresh_tokens
            .iter_mut()
            .find(|token| token.token_hash == token_hash && !token.is_revoked)
        else {
            return Ok(false);
        };
        token.is_revoked = true;
        token.revoked_at = Some(now);
        token.revoked_reason = Some(revocation.reason.clone());
        token.replaced_by = revocation.replaced_by.clone();
        Ok(true)
    }

    async fn revoke_refresh_tokens_for_user(
        &mut self,
        user_id: UserId,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<u64, AppError> {
        self.check("revoke_refresh_tokens_for_user")?;
        let mut count = 0;
        for token in self
            .working
            .refresh_tokens
            .iter_mut()
            .filter(|token| token.user_id == user_id && token.is_active(now))
        {
            token.is_revoked = true;
            token.revoked_at = Some(now);
            token.revoked_reason = Some(reason.to_string());
            count += 1;
        }
        Ok(count)
    }

    async fn blacklist_token(&mut self, token: &BlacklistedToken) -> Result<(), AppError> {
        self.check("blacklist_token")?;
        if !self
            .working
            .blacklisted_tokens
            .iter()
            .any(|existing| existing.jti == token.jti)
        {
            self.working.blacklisted_tokens.push(token.clone());
        }
        Ok(())
    }

    async fn is_token_blacklisted(&mut self, jti: &str) -> Result<bool, AppError> {
        self.check("is_token_blacklisted")?;
        Ok(self
            .working
            .blacklisted_tokens
            .iter()
            .any(|token| token.jti == jti))
    }

    async fn purge_expired_blacklist(&mut self, now: DateTime<Utc>) -> Result<u64, AppError> {
        self.check("purge_expired_blacklist")?;
        let before = self.working.blacklisted_tokens.len();
        self.working
            .blacklisted_tokens
            .retain(|token| token.expires_at > now);
        Ok((before - self.working.blacklisted_tokens.len()) as u64)
    }

    async fn purge_refresh_tokens(&mut self, cutoff: DateTime<Utc>) -> Result<u64, AppError> {
        self.check("purge_refresh_tokens")?;
        let before = self.working.refresh_tokens.len();
        self.working.refresh_tokens.retain(|token| {
            let revoked_long_ago = token.is_revoked
                && token
                    .revoked_at
                    .map(|revoked_at| revoked_at <= cutoff)
                    .unwrap_or(false);
            token.expires_at > cutoff && !revoked_long_ago
        });
        Ok((before - self.working.refresh_tokens.len()) as u64)
    }
}

#[async_trait]
impl SessionStore for MemoryUnitOfWork {
    async fn open_session(
        &mut self,
        session: &NewSession,
        now: DateTime<Utc>,
    ) -> Result<SessionId, AppError> {
        self.check("open_session")?;
        let id = SessionId(self.working.next_id());
        self.working.sessions.push(Session {
            id,
            user_id: session.user_id,
            branch_id: session.branch_id,
            start_time: now,
            end_time: None,
            last_action: Some("Login".to_string()),
            ip_address: session.ip_address.clone(),
            user_agent: session.user_agent.clone(),
        });
        Ok(id)
    }

    async fn find_session(&mut self, id: SessionId) -> Result<Option<Session>, AppError> {
        self.check("find_session")?;
        Ok(self
            .working
            .sessions
            .iter()
            .find(|session| session.id == id)
            .cloned())
    }

    async fn end_session(
        &mut self,
        id: SessionId,
        user_id: UserId,
        now: DateTime<Utc>,
    ) -> Result<bool, AppError> {
        self.check("end_session")?;
        let Some(session) = self
            .working
            .sessions
            .iter_mut()
            .find(|session| session.id == id && session.user_id == user_id && session.is_open())
        else {
            return Ok(false);
        };
        session.end_time = Some(now.max(session.start_time));
        session.last_action = Some("Logout".to_string());
        Ok(true)
    }

    async fn end_sessions_for_user(
        &mut self,
        user_id: UserId,
        now: DateTime<Utc>,
    ) -> Result<u64, AppError> {
        self.check("end_sessions_for_user")?;
        let mut count = 0;
        for session in self
            .working
            .sessions
            .iter_mut()
            .filter(|session| session.user_id == user_id && session.is_open())
        {
            session.end_time = Some(now.max(session.start_time));
            session.last_action = Some("ForcedEnd".to_string());
            count += 1;
        }
        Ok(count)
    }
}

#[async_trait]
impl PermissionStore for MemoryUnitOfWork {
    async fn list_role_permissions(
        &mut self,
        role_id: RoleId,
    ) -> Result<Vec<RolePermission>, AppError> {
        self.check("list_role_permissions")?;
        let mut grants: Vec<RolePermission> = self
            .working
            .role_permissions
            .iter()
            .filter(|grant| grant.role_level_id == role_id)
            .cloned()
            .collect();
        grants.sort_by(|a, b| a.permission_path.cmp(&b.permission_path));
        Ok(grants)
    }

    async fn delete_role_permission(
        &mut self,
        id: i64,
        expected_version: i32,
    ) -> Result<bool, AppError> {
        self.check("delete_role_permission")?;
        // Simulates a concurrent writer bumping the row version.
        if self.flagged("delete_role_permission:stale") {
            return Ok(false);
        }
        let before = self.working.role_permissions.len();
        self.working
            .role_permissions
            .retain(|grant| !(grant.id == id && grant.version == expected_version));
        Ok(self.working.role_permissions.len() < before)
    }

    async fn insert_role_permission(
        &mut self,
        grant: &NewRolePermission,
        now: DateTime<Utc>,
    ) -> Result<(), AppError> {
        self.check("insert_role_permission")?;
        if self.working.role_permissions.iter().any(|existing| {
            existing.role_level_id == grant.role_level_id
                && existing.permission_path == grant.permission_path
        }) {
            return Err(AppError::Conflict(
                "Permission already granted to this role".to_string(),
            ));
        }
        let id = self.working.next_id();
        self.working.role_permissions.push(RolePermission {
            id,
            role_level_id: grant.role_level_id,
            permission_path: grant.permission_path.clone(),
            value: None,
            added_at: now,
            user_id: grant.actor.user_id,
            branch_id: grant.actor.branch_id,
            session_id: grant.actor.session_id,
            version: 1,
        });
        Ok(())
    }

    async fn archive_role_permission(
        &mut self,
        grant: &RolePermission,
        archived_by: &Actor,
        now: DateTime<Utc>,
    ) -> Result<(), AppError> {
        self.check("archive_role_permission")?;
        let id = self.working.next_id();
        self.working.permission_history.push(RolePermissionHistory {
            id,
            role_level_id: grant.role_level_id,
            permission_path: grant.permission_path.clone(),
            value: grant.value.clone(),
            permission_added_at: grant.added_at,
            permission_added_by: grant.user_id,
            archived_at: now,
            user_id: archived_by.user_id,
            branch_id: archived_by.branch_id,
            session_id: archived_by.session_id,
        });
        Ok(())
    }

    async fn role_has_permission(
        &mut self,
        role_id: RoleId,
        path: &str,
    ) -> Result<bool, AppError> {
        self.check("role_has_permission")?;
        Ok(self
            .working
            .role_permissions
            .iter()
            .any(|grant| grant.role_level_id == role_id && grant.permission_path == path))
    }
}

#[async_trait]
impl UnitOfWork for MemoryUnitOfWork {
    async fn commit(self: Box<Self>) -> Result<(), AppError> {
        self.check("commit")?;
        let MemoryUnitOfWork {
            mut guard, working, ..
        } = *self;
        *guard = working;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), AppError> {
        Ok(())
    }
}
