//! Postgres queries for role permission grants and their history.

use chrono::{DateTime, Utc};
use sqlx::PgConnection;

use crate::models::permission::{Actor, NewRolePermission, RolePermission};
use crate::types::RoleId;

pub async fn list_role_permissions(
    conn: &mut PgConnection,
    role_id: RoleId,
) -> Result<Vec<RolePermission>, sqlx::Error> {
    sqlx::query_as::<_, RolePermission>(
        "SELECT id, role_level_id, permission_path, value, added_at, user_id, branch_id, \
         session_id, version FROM user_role_permissions WHERE role_level_id = $1 \
         ORDER BY permission_path",
    )
    .bind(role_id)
    .fetch_all(&mut *conn)
    .await
}

pub async fn delete_role_permission(
    conn: &mut PgConnection,
    id: i64,
    expected_version: i32,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM user_role_permissions WHERE id = $1 AND version = $2")
        .bind(id)
        .bind(expected_version)
        .execute(&mut *conn)
        .await?;
    Ok(result.rows_affected() == 1)
}

pub async fn insert_role_permission(
    conn: &mut PgConnection,
    grant: &NewRolePermission,
    now: DateTime<Utc>,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO user_role_permissions (role_level_id, permission_path, added_at, user_id, \
         branch_id, session_id) VALUES ($1, $2, $3, $4, $5, $6)",
    )
    .bind(grant.role_level_id)
    .bind(&grant.permission_path)
    .bind(now)
    .bind(grant.actor.user_id)
    .bind(grant.actor.branch_id)
    .bind(grant.actor.session_id)
    .execute(&mut *conn)
    .await
    .map(|_| ())
}

pub async fn insert_permission_history(
    conn: &mut PgConnection,
    grant: &RolePermission,
    archived_by: &Actor,
    now: DateTime<Utc>,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO user_role_permission_history (role_level_id, permission_path, value, \
         permission_added_at, permission_added_by, archived_at, user_id, branch_id, session_id) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
    )
    .bind(grant.role_level_id)
    .bind(&grant.permission_path)
    .bind(&grant.value)
    .bind(grant.added_at)
    .bind(grant.user_id)
    .bind(now)
    .bind(archived_by.user_id)
    .bind(archived_by.branch_id)
    .bind(archived_by.session_id)
    .execute(&mut *conn)
    .await
    .map(|_| ())
}

pub async fn role_has_permission(
    conn: &mut PgConnection,
    role_id: RoleId,
    path: &str,
) -> Result<bool, sqlx::Error> {
    sqlx::query_scalar::<_, bool>(
        "SELECT EXISTS (SELECT 1 FROM user_role_permissions WHERE role_level_id = $1 \
         AND permission_path = $2)",
    )
    .bind(role_id)
    .bind(path)
    .fetch_one(&mut *conn)
    .await
}
