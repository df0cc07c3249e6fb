//! Models that represent user accounts and the payloads that mutate them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

use crate::types::{BranchId, RoleId, UserId};

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
/// Database representation of a user account.
pub struct User {
    pub id: UserId,
    /// Unique login name.
    pub username: String,
    /// Argon2 PHC string.
    #[serde(skip_serializing)]
    pub password_hash: String,
    /// Role level sharing one permission set.
    pub role_id: RoleId,
    /// Branch the user signs into by default.
    pub branch_id: BranchId,
    /// Disabled users never authenticate.
    pub is_enabled: bool,
    pub must_change_password: bool,
    pub change_password_required_before: Option<DateTime<Utc>>,
    /// Compare-and-swap counter bumped on every update.
    pub version: i32,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn new(
        id: UserId,
        username: impl Into<String>,
        password_hash: impl Into<String>,
        role_id: RoleId,
        branch_id: BranchId,
    ) -> Self {
        Self {
            id,
            username: username.into(),
            password_hash: password_hash.into(),
            role_id,
            branch_id,
            is_enabled: true,
            must_change_password: false,
            change_password_required_before: None,
            version: 1,
            created_at: Utc::now(),
        }
    }
}

/// New password state written together with a version check.
#[derive(Debug, Clone)]
pub struct PasswordUpdate {
    pub password_hash: String,
    pub must_change_password: bool,
    pub change_password_required_before: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
/// Enables or disables a user account.
pub struct LockUserRequest {
    #[validate(range(min = 1, message = "targetUserId must be positive"))]
    pub target_user_id: i32,
    pub is_active: bool,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
/// Administrator-issued password for another account.
pub struct ResetPasswordRequest {
    #[validate(range(min = 1, message = "userId must be positive"))]
    pub user_id: i32,
    #[validate(length(min = 1, message = "newPassword is required"))]
    pub new_password: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
/// Account state returned by the lock endpoint.
pub struct UserStatusResponse {
    pub user_id: UserId,
    pub is_enabled: bool,
}
