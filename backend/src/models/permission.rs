//! Role permission grants, their archive, and the request/response payloads.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

use crate::types::{BranchId, RoleId, SessionId, UserId};

/// Longest permission path the ledger stores.
pub const MAX_PERMISSION_PATH_LEN: usize = 1000;

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct RolePermission {
    pub id: i64,
    pub role_level_id: RoleId,
    pub permission_path: String,
    pub value: Option<String>,
    pub added_at: DateTime<Utc>,
    pub user_id: UserId,
    pub branch_id: BranchId,
    pub session_id: SessionId,
    pub version: i32,
}

#[derive(Debug, Clone)]
pub struct NewRolePermission {
    pub role_level_id: RoleId,
    pub permission_path: String,
    pub actor: Actor,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct RolePermissionHistory {
    pub id: i64,
    pub role_level_id: RoleId,
    pub permission_path: String,
    pub value: Option<String>,
    /// When and by whom the archived grant was originally made.
    pub permission_added_at: DateTime<Utc>,
    pub permission_added_by: UserId,
    pub archived_at: DateTime<Utc>,
    pub user_id: UserId,
    pub branch_id: BranchId,
    pub session_id: SessionId,
}

/// The authenticated caller performing a change, taken from token claims.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Actor {
    pub user_id: UserId,
    pub branch_id: BranchId,
    pub session_id: SessionId,
    pub role_id: RoleId,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SavePermissionsRequest {
    #[validate(range(min = 1, message = "roleId must be positive"))]
    pub role_id: i32,
    #[serde(default)]
    pub permissions: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PermissionChangeSummary {
    pub role_id: i32,
    pub added: Vec<String>,
    pub removed: Vec<String>,
}

impl PermissionChangeSummary {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// One operation declared in the permission registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PermissionDescriptor {
    pub operation: String,
    pub path: String,
    pub title: String,
}
