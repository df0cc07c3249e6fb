//! Role permission assignment: diff, archive, insert, all in one unit of work.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use chrono::Utc;

use crate::config::Config;
use crate::error::AppError;
use crate::models::permission::{
    Actor, NewRolePermission, PermissionChangeSummary, PermissionDescriptor,
};
use crate::models::security::{ClientInfo, NewSecurityEvent, SecurityEventType};
use crate::repositories::{finish, CommitPolicy, SecurityStore, UnitOfWork};
use crate::services::permission_registry::PermissionRegistry;
use crate::types::RoleId;

#[derive(Clone)]
pub struct PermissionService {
    store: Arc<dyn SecurityStore>,
    config: Arc<Config>,
    registry: Arc<PermissionRegistry>,
}

impl PermissionService {
    pub fn new(
        store: Arc<dyn SecurityStore>,
        config: Arc<Config>,
        registry: Arc<PermissionRegistry>,
    ) -> Self {
        Self {
            store,
            config,
            registry,
        }
    }

    /// Replaces the grant set of `role_id` with `requested`.
    ///
    /// Grants no longer requested are archived then deleted; new paths are
    /// inserted once each. A concurrent writer surfaces as `Conflict`.
    pub async fn save(
        &self,
        actor: &Actor,
        role_id: RoleId,
        requested: &[String],
        client: &ClientInfo,
    ) -> Result<PermissionChangeSummary, AppError> {
        if role_id == self.config.system_admin_role_id {
            return Err(AppError::BadRequest(
                "System administrator permissions cannot be modified".to_string(),
            ));
        }
        let requested = self.validate_paths(requested)?;

        let mut tx = self.store.begin().await?;
        let outcome = self
            .apply_diff(tx.as_mut(), actor, role_id, &requested, client)
            .await;
        let summary = finish(tx, outcome, CommitPolicy::OnSuccess).await?;

        if summary.is_empty() {
            tracing::debug!(%role_id, "Permission save left the role unchanged");
        } else {
            tracing::info!(
                %role_id,
                actor = %actor.user_id,
                added = summary.added.len(),
                removed = summary.removed.len(),
                "Role permissions updated"
            );
        }
        Ok(summary)
    }

    /// Distinct, registered paths in sorted order; anything else is a 400.
    fn validate_paths<'a>(&self, requested: &'a [String]) -> Result<BTreeSet<&'a str>, AppError> {
        let unknown: BTreeMap<String, String> = requested
            .iter()
            .enumerate()
            .filter(|(_, path)| !self.registry.contains_path(path))
            .map(|(index, path)| {
                (
                    format!("permissions[{index}]"),
                    format!("Unknown permission path '{path}'"),
                )
            })
            .collect();

        if !unknown.is_empty() {
            return Err(AppError::Validation {
                message: "Unknown permission paths".to_string(),
                errors: unknown,
            });
        }

        Ok(requested.iter().map(String::as_str).collect())
    }

    async fn apply_diff(
        &self,
        tx: &mut dyn UnitOfWork,
        actor: &Actor,
        role_id: RoleId,
        requested: &BTreeSet<&str>,
        client: &ClientInfo,
    ) -> Result<PermissionChangeSummary, AppError> {
        let now = Utc::now();
        let current = tx.list_role_permissions(role_id).await?;
        let mut summary = PermissionChangeSummary {
            role_id: role_id.get(),
            ..Default::default()
        };

        for grant in current
            .iter()
            .filter(|grant| !requested.contains(grant.permission_path.as_str()))
        {
            tx.archive_role_permission(grant, actor, now).await?;
            if !tx.delete_role_permission(grant.id, grant.version).await? {
                return Err(AppError::Conflict(format!(
                    "Permissions of role {role_id} changed concurrently, retry"
                )));
            }
            summary.removed.push(grant.permission_path.clone());
        }

        let existing: BTreeSet<&str> = current
            .iter()
            .map(|grant| grant.permission_path.as_str())
            .collect();
        for path in requested.difference(&existing) {
            tx.insert_role_permission(
                &NewRolePermission {
                    role_level_id: role_id,
                    permission_path: path.to_string(),
                    actor: *actor,
                },
                now,
            )
            .await?;
            summary.added.push(path.to_string());
        }

        if !summary.is_empty() {
            tx.record_security_event(
                &NewSecurityEvent::new(SecurityEventType::PermissionsChanged, client)
                    .user_id(actor.user_id)
                    .details(format!(
                        "Role {role_id}: added [{}], removed [{}]",
                        summary.added.join(", "),
                        summary.removed.join(", ")
                    )),
                now,
            )
            .await?;
        }

        Ok(summary)
    }

    /// Live paths of `role_id`, sorted. Read straight from the store.
    pub async fn role_permissions(&self, role_id: RoleId) -> Result<Vec<String>, AppError> {
        let mut tx = self.store.begin().await?;
        let outcome = tx
            .list_role_permissions(role_id)
            .await
            .map(|grants| {
                let mut paths: Vec<String> =
                    grants.into_iter().map(|grant| grant.permission_path).collect();
                paths.sort();
                paths
            });
        finish(tx, outcome, CommitPolicy::OnSuccess).await
    }

    pub async fn own_permissions(&self, actor: &Actor) -> Result<Vec<String>, AppError> {
        self.role_permissions(actor.role_id).await
    }

    pub fn registered(&self) -> Vec<PermissionDescriptor> {
        self.registry.all()
    }

    /// Lets system administrators through; everyone else needs the
    /// operation's path granted to their role.
    pub async fn authorize(
        &self,
        actor: &Actor,
        operation: &str,
        client: &ClientInfo,
    ) -> Result<(), AppError> {
        if actor.role_id == self.config.system_admin_role_id {
            return Ok(());
        }
        let path = self.registry.path_for(operation).ok_or_else(|| {
            AppError::InternalServerError(anyhow::anyhow!(
                "operation {operation} is not registered"
            ))
        })?;

        let mut tx = self.store.begin().await?;
        let outcome = async {
            let granted = tx.role_has_permission(actor.role_id, path).await?;
            if !granted {
                tx.record_security_event(
                    &NewSecurityEvent::new(SecurityEventType::UnauthorizedAccess, client)
                        .user_id(actor.user_id)
                        .details(format!("Permission denied for {path}")),
                    Utc::now(),
                )
                .await?;
            }
            Ok::<bool, AppError>(granted)
        }
        .await;

        if finish(tx, outcome, CommitPolicy::OnSuccess).await? {
            Ok(())
        } else {
            tracing::info!(actor = %actor.user_id, operation, "Permission denied");
            Err(AppError::Unauthorized("Permission denied".to_string()))
        }
    }
}
