//! Login, token refresh, logout and password changes.
//!
//! A login walks `Start → IpChecked → LockoutChecked → CredentialsVerified →
//! SessionOpened → TokensIssued → Logged` inside one unit of work. Expected
//! rejections keep their ledger writes; internal failures roll everything back.

use std::sync::Arc;

use axum::http::StatusCode;
use chrono::{DateTime, Duration, Utc};
use validator::Validate;

use crate::config::Config;
use crate::error::AppError;
use crate::models::auth::{LoginOutcome, LoginRequest, TokenPair};
use crate::models::security::{ClientInfo, NewLoginAttempt, NewSecurityEvent, SecurityEventType};
use crate::models::token::RefreshRevocation;
use crate::models::user::{PasswordUpdate, User};
use crate::repositories::{finish, CommitPolicy, SecurityStore, UnitOfWork};
use crate::services::credentials::{self, CredentialCheck};
use crate::services::ip_gate::{self, IpDecision};
use crate::services::lockout::{self, LockoutPolicy, LockoutStatus};
use crate::services::password_policy::{self, PasswordPolicy};
use crate::services::sessions;
use crate::services::tokens::{self, RefreshLookup};
use crate::types::UserId;
use crate::utils::jwt::{decode_access_token_ignoring_expiry, Claims};
use crate::utils::password::{hash_password, verify_password};
use crate::utils::refresh::hash_refresh_token;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginStage {
    Start,
    IpChecked,
    LockoutChecked,
    CredentialsVerified,
    SessionOpened,
    TokensIssued,
    Logged,
}

const INVALID_REFRESH_TOKEN: &str = "Invalid refresh token";

#[derive(Clone)]
pub struct AuthService {
    store: Arc<dyn SecurityStore>,
    config: Arc<Config>,
    policy: Arc<dyn PasswordPolicy>,
}

impl AuthService {
    pub fn new(
        store: Arc<dyn SecurityStore>,
        config: Arc<Config>,
        policy: Arc<dyn PasswordPolicy>,
    ) -> Self {
        Self {
            store,
            config,
            policy,
        }
    }

    pub async fn login(
        &self,
        request: &LoginRequest,
        client: &ClientInfo,
    ) -> Result<LoginOutcome, AppError> {
        let mut tx = self.store.begin().await?;
        let mut stage = LoginStage::Start;
        let outcome = self
            .login_steps(tx.as_mut(), request, client, &mut stage)
            .await;

        match &outcome {
            Ok(result) => tracing::info!(
                username = %request.username,
                user_id = %result.user_id,
                session_id = %result.session_id,
                "Login succeeded"
            ),
            Err(err) if err.is_internal() => tracing::error!(
                username = %request.username,
                stage = ?stage,
                error = ?err,
                "Login failed unexpectedly"
            ),
            Err(err) => tracing::info!(
                username = %request.username,
                ip = %client.ip,
                stage = ?stage,
                reason = %err,
                "Login rejected"
            ),
        }

        finish(tx, outcome, CommitPolicy::UnlessInternal).await
    }

    async fn login_steps(
        &self,
        tx: &mut dyn UnitOfWork,
        request: &LoginRequest,
        client: &ClientInfo,
        stage: &mut LoginStage,
    ) -> Result<LoginOutcome, AppError> {
        let now = Utc::now();
        let username = request.username.as_str();

        if let IpDecision::Denied { reason } =
            ip_gate::check(tx, &client.ip, self.config.ip_allowlist_enforced, now).await?
        {
            tx.record_security_event(
                &NewSecurityEvent::new(SecurityEventType::UnauthorizedAccess, client)
                    .username(username)
                    .details(format!("IP address not allowed: {reason}")),
                now,
            )
            .await?;
            return Err(AppError::rejected(
                StatusCode::UNAUTHORIZED,
                "Access denied",
                "IP address not allowed",
            ));
        }
        *stage = LoginStage::IpChecked;

        request.validate()?;

        if let LockoutStatus::Locked {
            remaining_minutes, ..
        } = lockout::status(tx, username, now).await?
        {
            return Err(AppError::rejected(
                StatusCode::BAD_REQUEST,
                "Account locked",
                format!("Account locked. {remaining_minutes} minutes remaining"),
            ));
        }
        *stage = LoginStage::LockoutChecked;

        let user = match credentials::verify(tx, username, &request.password).await? {
            CredentialCheck::Verified(user) => *user,
            CredentialCheck::Rejected(failure) => {
                tx.record_login_attempt(
                    &NewLoginAttempt {
                        username: username.to_string(),
                        client: client.clone(),
                        success: false,
                        failure_reason: Some(failure.reason().to_string()),
                    },
                    now,
                )
                .await?;

                let policy = LockoutPolicy::from_config(&self.config);
                if let Some(until) = lockout::register_failure(tx, &policy, username, now).await? {
                    tx.record_security_event(
                        &NewSecurityEvent::new(SecurityEventType::AccountLocked, client)
                            .username(username)
                            .details(format!("Locked until {}", until.to_rfc3339())),
                        now,
                    )
                    .await?;
                }

                tx.record_security_event(
                    &NewSecurityEvent::new(SecurityEventType::LoginFailure, client)
                        .username(username)
                        .details(failure.reason()),
                    now,
                )
                .await?;

                return Err(AppError::rejected(
                    StatusCode::UNAUTHORIZED,
                    "Authentication failed",
                    "Invalid username or password",
                ));
            }
        };

        tx.record_login_attempt(
            &NewLoginAttempt {
                username: username.to_string(),
                client: client.clone(),
                success: true,
                failure_reason: None,
            },
            now,
        )
        .await?;
        lockout::clear(tx, username, now).await?;
        *stage = LoginStage::CredentialsVerified;

        let branch_id = user.branch_id;
        let session_id = sessions::open(tx, &user, branch_id, client, now).await?;
        *stage = LoginStage::SessionOpened;

        let minted = tokens::issue(tx, &self.config, &user, branch_id, session_id, now).await?;
        *stage = LoginStage::TokensIssued;

        tx.record_security_event(
            &NewSecurityEvent::new(SecurityEventType::LoginSuccess, client)
                .username(username)
                .user_id(user.id)
                .details(format!("Session {session_id} opened")),
            now,
        )
        .await?;
        *stage = LoginStage::Logged;

        Ok(LoginOutcome {
            access_token: minted.access_token,
            refresh_token: minted.refresh_token,
            expires_in: minted.expires_in,
            branch_id,
            user_id: user.id,
            session_id,
            rule_id: user.role_id.get(),
            branch_name: request.branch_name.clone(),
            must_change_password: requires_password_change(&user, now),
        })
    }

    pub async fn refresh_token(
        &self,
        presented: &str,
        client: &ClientInfo,
    ) -> Result<TokenPair, AppError> {
        let mut tx = self.store.begin().await?;
        let outcome = self.refresh_steps(tx.as_mut(), presented, client).await;
        if let Err(err) = &outcome {
            if !err.is_internal() {
                tracing::info!(ip = %client.ip, reason = %err, "Refresh token rejected");
            }
        }
        finish(tx, outcome, CommitPolicy::UnlessInternal).await
    }

    async fn refresh_steps(
        &self,
        tx: &mut dyn UnitOfWork,
        presented: &str,
        client: &ClientInfo,
    ) -> Result<TokenPair, AppError> {
        let now = Utc::now();

        let lookup = tokens::lookup_refresh(tx, presented, now).await?;
        let record = match lookup {
            RefreshLookup::Active(record) => record,
            rejected => {
                let reason = rejected.rejection_reason().unwrap_or("Refresh token rejected");
                let mut event = NewSecurityEvent::new(SecurityEventType::TokenRejected, client)
                    .details(reason);
                if let RefreshLookup::Expired(record) | RefreshLookup::Revoked(record) = &rejected
                {
                    event = event.user_id(record.user_id);
                }
                tx.record_security_event(&event, now).await?;
                return Err(AppError::Unauthorized(INVALID_REFRESH_TOKEN.to_string()));
            }
        };

        let user = match tx.find_user_by_id(record.user_id).await? {
            Some(user) if user.is_enabled => user,
            _ => {
                return self
                    .reject_refresh(tx, client, record.user_id, "Token owner missing or disabled", now)
                    .await;
            }
        };

        let session = match tx.find_session(record.session_id).await? {
            Some(session) if session.is_open() => session,
            _ => {
                return self
                    .reject_refresh(tx, client, user.id, "Session already ended", now)
                    .await;
            }
        };

        let minted = tokens::mint(&self.config, &user, session.branch_id, session.id, now)?;
        let rotated = tx
            .revoke_refresh_token(
                &record.token_hash,
                &RefreshRevocation {
                    reason: "Rotated".to_string(),
                    replaced_by: Some(minted.refresh_hash.clone()),
                },
                now,
            )
            .await?;
        if !rotated {
            return self
                .reject_refresh(tx, client, user.id, "Refresh token already rotated", now)
                .await;
        }
        tokens::persist_refresh(tx, &minted, &user, session.id, now).await?;

        tx.record_security_event(
            &NewSecurityEvent::new(SecurityEventType::TokenRefreshed, client)
                .username(&user.username)
                .user_id(user.id),
            now,
        )
        .await?;

        Ok(TokenPair {
            access_token: minted.access_token,
            refresh_token: minted.refresh_token,
            expires_in: minted.expires_in,
        })
    }

    async fn reject_refresh<T>(
        &self,
        tx: &mut dyn UnitOfWork,
        client: &ClientInfo,
        user_id: UserId,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<T, AppError> {
        tx.record_security_event(
            &NewSecurityEvent::new(SecurityEventType::TokenRejected, client)
                .user_id(user_id)
                .details(reason),
            now,
        )
        .await?;
        Err(AppError::Unauthorized(INVALID_REFRESH_TOKEN.to_string()))
    }

    /// Best effort: every sub-step runs in its own unit of work and a failing
    /// step is logged without affecting the others or the caller.
    pub async fn logout(
        &self,
        bearer: Option<&str>,
        refresh_token: Option<&str>,
        client: &ClientInfo,
    ) {
        let Some(bearer) = bearer else {
            tracing::debug!("Logout without access token, nothing to revoke");
            return;
        };
        let claims = match decode_access_token_ignoring_expiry(bearer, &self.config.jwt_secret) {
            Ok(claims) => claims,
            Err(err) => {
                tracing::debug!(error = %err, "Logout with undecodable access token");
                return;
            }
        };
        let now = Utc::now();

        if let Err(err) = self.blacklist_access_token(&claims, now).await {
            tracing::error!(error = ?err, jti = %claims.jti, "Failed to blacklist access token");
        }

        let Some(user_id) = claims.user_id() else {
            tracing::warn!(sub = %claims.sub, "Logout token carries a non-numeric subject");
            return;
        };

        if let Some(refresh_token) = refresh_token.filter(|token| !token.is_empty()) {
            if let Err(err) = self.revoke_own_refresh_token(user_id, refresh_token, now).await {
                tracing::error!(error = ?err, %user_id, "Failed to revoke refresh token");
            }
        }

        if let Err(err) = self.end_session(&claims, user_id, client, now).await {
            tracing::error!(
                error = ?err,
                %user_id,
                session_id = %claims.session_id,
                "Failed to end session"
            );
        }
    }

    async fn blacklist_access_token(
        &self,
        claims: &Claims,
        now: DateTime<Utc>,
    ) -> Result<bool, AppError> {
        let mut tx = self.store.begin().await?;
        let outcome = tokens::blacklist(tx.as_mut(), claims, "Logout", now).await;
        finish(tx, outcome, CommitPolicy::OnSuccess).await
    }

    async fn revoke_own_refresh_token(
        &self,
        user_id: UserId,
        presented: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, AppError> {
        let mut tx = self.store.begin().await?;
        let outcome = async {
            let hash = hash_refresh_token(presented);
            match tx.find_refresh_token(&hash).await? {
                Some(record) if record.user_id == user_id => {
                    tx.revoke_refresh_token(
                        &hash,
                        &RefreshRevocation {
                            reason: "Logout".to_string(),
                            replaced_by: None,
                        },
                        now,
                    )
                    .await
                }
                _ => Ok(false),
            }
        }
        .await;
        finish(tx, outcome, CommitPolicy::OnSuccess).await
    }

    async fn end_session(
        &self,
        claims: &Claims,
        user_id: UserId,
        client: &ClientInfo,
        now: DateTime<Utc>,
    ) -> Result<bool, AppError> {
        let mut tx = self.store.begin().await?;
        let outcome = async {
            let closed = sessions::close(tx.as_mut(), claims.session_id, user_id, now).await?;
            tx.record_security_event(
                &NewSecurityEvent::new(SecurityEventType::Logout, client)
                    .username(&claims.username)
                    .user_id(user_id)
                    .details(format!("Session {}", claims.session_id)),
                now,
            )
            .await?;
            Ok::<bool, AppError>(closed)
        }
        .await;
        finish(tx, outcome, CommitPolicy::OnSuccess).await
    }

    /// Sets a new password for `target` on behalf of an authorised caller.
    pub async fn change_password(
        &self,
        caller: &Claims,
        target: UserId,
        new_password: &str,
        client: &ClientInfo,
    ) -> Result<(), AppError> {
        password_policy::enforce(self.policy.as_ref(), new_password)?;

        let mut tx = self.store.begin().await?;
        let outcome = async {
            let user = tx
                .find_user_by_id(target)
                .await?
                .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;
            self.store_new_password(tx.as_mut(), &user, new_password, caller, client)
                .await
        }
        .await;
        finish(tx, outcome, CommitPolicy::OnSuccess).await
    }

    /// Lets the caller replace their own password after re-entering the current one.
    pub async fn secure_change_password(
        &self,
        caller: &Claims,
        current_password: &str,
        new_password: &str,
        client: &ClientInfo,
    ) -> Result<(), AppError> {
        let user_id = caller
            .user_id()
            .ok_or_else(|| AppError::Unauthorized("Invalid user".to_string()))?;

        let mut tx = self.store.begin().await?;
        let outcome = async {
            let user = tx
                .find_user_by_id(user_id)
                .await?
                .ok_or_else(|| AppError::Unauthorized("Invalid user".to_string()))?;
            if !verify_password(current_password, &user.password_hash)? {
                return Err(AppError::Unauthorized(
                    "Current password is incorrect".to_string(),
                ));
            }
            password_policy::enforce(self.policy.as_ref(), new_password)?;
            self.store_new_password(tx.as_mut(), &user, new_password, caller, client)
                .await
        }
        .await;
        finish(tx, outcome, CommitPolicy::OnSuccess).await
    }

    async fn store_new_password(
        &self,
        tx: &mut dyn UnitOfWork,
        user: &User,
        new_password: &str,
        caller: &Claims,
        client: &ClientInfo,
    ) -> Result<(), AppError> {
        let now = Utc::now();
        let update = PasswordUpdate {
            password_hash: hash_password(new_password)?,
            must_change_password: false,
            change_password_required_before: None,
        };
        if !tx.update_password(user.id, user.version, &update).await? {
            return Err(AppError::Conflict(
                "User was modified concurrently, retry".to_string(),
            ));
        }

        let revoked = tx
            .revoke_refresh_tokens_for_user(user.id, "Password changed", now)
            .await?;
        tx.record_security_event(
            &NewSecurityEvent::new(SecurityEventType::PasswordChanged, client)
                .username(&user.username)
                .user_id(user.id)
                .details(format!("Changed by {}", caller.username)),
            now,
        )
        .await?;

        tracing::info!(user_id = %user.id, revoked, "Password changed");
        Ok(())
    }
}

/// The flag, or a reset deadline that has already passed.
fn requires_password_change(user: &User, now: DateTime<Utc>) -> bool {
    user.must_change_password
        || user
            .change_password_required_before
            .map(|deadline| deadline <= now)
            .unwrap_or(false)
}

/// Deadline handed out with an administrator-issued password.
pub fn reset_deadline(config: &Config, now: DateTime<Utc>) -> DateTime<Utc> {
    now + Duration::hours(config.password_reset_deadline_hours as i64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BranchId, RoleId};

    #[test]
    fn password_change_required_by_flag_or_elapsed_deadline() {
        let now = Utc::now();
        let mut user = User::new(UserId(2), "u", "h", RoleId(2), BranchId(1));
        assert!(!requires_password_change(&user, now));

        user.change_password_required_before = Some(now + Duration::hours(1));
        assert!(!requires_password_change(&user, now));

        user.change_password_required_before = Some(now - Duration::hours(1));
        assert!(requires_password_change(&user, now));

        user.change_password_required_before = None;
        user.must_change_password = true;
        assert!(requires_password_change(&user, now));
    }

    #[test]
    fn reset_deadline_uses_configured_hours() {
        let config = Config::default();
        let now = Utc::now();
        assert_eq!(reset_deadline(&config, now) - now, Duration::hours(48));
    }
}
