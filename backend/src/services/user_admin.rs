//! Administrative user operations: lock/unlock and password reset.

use std::sync::Arc;

use chrono::Utc;

use crate::config::Config;
use crate::error::AppError;
use crate::models::permission::Actor;
use crate::models::security::{ClientInfo, NewSecurityEvent, SecurityEventType};
use crate::models::user::{PasswordUpdate, UserStatusResponse};
use crate::repositories::{finish, CommitPolicy, SecurityStore};
use crate::services::auth::reset_deadline;
use crate::services::password_policy::{self, PasswordPolicy};
use crate::types::UserId;
use crate::utils::password::hash_password;

/// Hash the schema seeds for the root admin; no password verifies against it.
pub const UNUSABLE_PASSWORD_HASH: &str = "!";

#[derive(Clone)]
pub struct UserAdminService {
    store: Arc<dyn SecurityStore>,
    config: Arc<Config>,
    policy: Arc<dyn PasswordPolicy>,
}

impl UserAdminService {
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

    /// Enables or disables `target`.
    ///
    /// Disabling revokes every refresh token and ends every open session of
    /// the user. Enabling also clears any active lockout.
    pub async fn set_user_active(
        &self,
        actor: &Actor,
        target: UserId,
        is_active: bool,
        client: &ClientInfo,
    ) -> Result<UserStatusResponse, AppError> {
        if target == self.config.root_admin_user_id {
            return Err(AppError::BadRequest(
                "The root administrator cannot be locked".to_string(),
            ));
        }

        let mut tx = self.store.begin().await?;
        let outcome = async {
            let now = Utc::now();
            let user = tx
                .find_user_by_id(target)
                .await?
                .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

            if !tx.set_user_enabled(user.id, user.version, is_active).await? {
                return Err(AppError::Conflict(
                    "User was modified concurrently, retry".to_string(),
                ));
            }

            let event = if is_active {
                let cleared = tx.deactivate_lockouts(&user.username, now).await?;
                tracing::debug!(user_id = %user.id, cleared, "Cleared lockouts on unlock");
                SecurityEventType::AccountUnlocked
            } else {
                let revoked = tx
                    .revoke_refresh_tokens_for_user(user.id, "Account locked", now)
                    .await?;
                let ended = tx.end_sessions_for_user(user.id, now).await?;
                tracing::debug!(user_id = %user.id, revoked, ended, "Revoked access on lock");
                SecurityEventType::AccountLocked
            };

            tx.record_security_event(
                &NewSecurityEvent::new(event, client)
                    .username(&user.username)
                    .user_id(user.id)
                    .details(format!("Changed by user {}", actor.user_id)),
                now,
            )
            .await?;

            Ok(UserStatusResponse {
                user_id: user.id,
                is_enabled: is_active,
            })
        }
        .await;

        let status = finish(tx, outcome, CommitPolicy::OnSuccess).await?;
        tracing::info!(
            actor = %actor.user_id,
            target = %target,
            is_active,
            "User status changed"
        );
        Ok(status)
    }

    /// Sets a temporary password that must be replaced before the reset
    /// deadline.
    pub async fn reset_password(
        &self,
        actor: &Actor,
        target: UserId,
        new_password: &str,
        client: &ClientInfo,
    ) -> Result<(), AppError> {
        if actor.role_id != self.config.system_admin_role_id {
            return Err(AppError::BadRequest(
                "Only system administrators can reset passwords".to_string(),
            ));
        }
        if target == self.config.root_admin_user_id {
            return Err(AppError::BadRequest(
                "The root administrator password cannot be reset".to_string(),
            ));
        }
        password_policy::enforce(self.policy.as_ref(), new_password)?;

        let mut tx = self.store.begin().await?;
        let outcome = async {
            let now = Utc::now();
            let user = tx
                .find_user_by_id(target)
                .await?
                .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

            if user.role_id == self.config.system_admin_role_id
                && actor.user_id != self.config.root_admin_user_id
            {
                return Err(AppError::BadRequest(
                    "Only the root administrator can reset another administrator's password"
                        .to_string(),
                ));
            }

            let update = PasswordUpdate {
                password_hash: hash_password(new_password)?,
                must_change_password: true,
                change_password_required_before: Some(reset_deadline(&self.config, now)),
            };
            if !tx.update_password(user.id, user.version, &update).await? {
                return Err(AppError::Conflict(
                    "User was modified concurrently, retry".to_string(),
                ));
            }

            tx.revoke_refresh_tokens_for_user(user.id, "Password reset", now)
                .await?;
            tx.record_security_event(
                &NewSecurityEvent::new(SecurityEventType::PasswordReset, client)
                    .username(&user.username)
                    .user_id(user.id)
                    .details(format!("Reset by user {}", actor.user_id)),
                now,
            )
            .await?;
            Ok(())
        }
        .await;

        finish(tx, outcome, CommitPolicy::OnSuccess).await?;
        tracing::info!(actor = %actor.user_id, target = %target, "Password reset");
        Ok(())
    }
}

/// Replaces the seeded root admin's unusable hash with `ADMIN_INITIAL_PASSWORD`.
///
/// Returns `true` when a password was installed. The admin still has to
/// change it at first login.
pub async fn ensure_root_admin_password(
    store: &dyn SecurityStore,
    config: &Config,
) -> Result<bool, AppError> {
    let Some(initial) = config.admin_initial_password.as_deref() else {
        return Ok(false);
    };

    let mut tx = store.begin().await?;
    let outcome = async {
        let Some(admin) = tx.find_user_by_id(config.root_admin_user_id).await? else {
            tracing::warn!(user_id = %config.root_admin_user_id, "Root admin not found");
            return Ok(false);
        };
        if admin.password_hash != UNUSABLE_PASSWORD_HASH {
            return Ok(false);
        }
        let update = PasswordUpdate {
            password_hash: hash_password(initial)?,
            must_change_password: true,
            change_password_required_before: None,
        };
        tx.update_password(admin.id, admin.version, &update).await
    }
    .await;
    finish(tx, outcome, CommitPolicy::OnSuccess).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::user::User;
    use crate::repositories::MemoryStore;
    use crate::services::password_policy::ConfiguredPasswordPolicy;
    use crate::types::{BranchId, RoleId};

    fn config_with_admin_password(password: Option<&str>) -> Config {
        let password = password.map(str::to_string);
        Config::from_lookup(move |key| match key {
            "ADMIN_INITIAL_PASSWORD" => password.clone(),
            _ => None,
        })
    }

    #[tokio::test]
    async fn bootstrap_replaces_only_the_unusable_hash() {
        let store = MemoryStore::new();
        store
            .insert_user(User::new(
                UserId(1),
                "admin",
                UNUSABLE_PASSWORD_HASH,
                RoleId(1),
                BranchId(1),
            ))
            .await;
        let config = config_with_admin_password(Some("Initial1Pass"));

        assert!(ensure_root_admin_password(&store, &config).await.unwrap());
        assert!(!ensure_root_admin_password(&store, &config).await.unwrap());

        let ledger = store.snapshot().await;
        let admin = &ledger.users[0];
        assert_ne!(admin.password_hash, UNUSABLE_PASSWORD_HASH);
        assert!(admin.must_change_password);
    }

    #[tokio::test]
    async fn bootstrap_is_skipped_without_a_configured_password() {
        let store = MemoryStore::new();
        let config = config_with_admin_password(None);
        assert!(!ensure_root_admin_password(&store, &config).await.unwrap());
    }

    #[tokio::test]
    async fn root_admin_cannot_be_locked() {
        let config = Arc::new(Config::default());
        let service = UserAdminService::new(
            Arc::new(MemoryStore::new()),
            config.clone(),
            Arc::new(ConfiguredPasswordPolicy::from_config(&config)),
        );
        let actor = Actor {
            user_id: UserId(1),
            branch_id: BranchId(1),
            session_id: crate::types::SessionId(1),
            role_id: RoleId(1),
        };
        let err = service
            .set_user_active(&actor, UserId(1), false, &ClientInfo::new("127.0.0.1", None))
            .await
            .unwrap_err();
        assert_eq!(err.status(), axum::http::StatusCode::BAD_REQUEST);
    }
}
