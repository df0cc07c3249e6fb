//! Postgres queries for the `users` table.

use sqlx::PgConnection;

use crate::models::user::{PasswordUpdate, User};
use crate::types::UserId;

const USER_COLUMNS: &str = "id, username, password_hash, role_id, branch_id, is_enabled, \
     must_change_password, change_password_required_before, version, created_at";

/// Finds a user by their username.
pub async fn find_user_by_username(
    conn: &mut PgConnection,
    username: &str,
) -> Result<Option<User>, sqlx::Error> {
    sqlx::query_as::<_, User>(&format!(
        "SELECT {USER_COLUMNS} FROM users WHERE username = $1"
    ))
    .bind(username)
    .fetch_optional(&mut *conn)
    .await
}

/// Finds a user by their ID.
pub async fn find_user_by_id(
    conn: &mut PgConnection,
    user_id: UserId,
) -> Result<Option<User>, sqlx::Error> {
    sqlx::query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
        .bind(user_id)
        .fetch_optional(&mut *conn)
        .await
}

pub async fn update_password(
    conn: &mut PgConnection,
    user_id: UserId,
    expected_version: i32,
    update: &PasswordUpdate,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE users SET password_hash = $1, must_change_password = $2, \
         change_password_required_before = $3, version = version + 1 \
         WHERE id = $4 AND version = $5",
    )
    .bind(&update.password_hash)
    .bind(update.must_change_password)
    .bind(update.change_password_required_before)
    .bind(user_id)
    .bind(expected_version)
    .execute(&mut *conn)
    .await?;
    Ok(result.rows_affected() == 1)
}

pub async fn set_user_enabled(
    conn: &mut PgConnection,
    user_id: UserId,
    expected_version: i32,
    enabled: bool,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE users SET is_enabled = $1, version = version + 1 WHERE id = $2 AND version = $3",
    )
    .bind(enabled)
    .bind(user_id)
    .bind(expected_version)
    .execute(&mut *conn)
    .await?;
    Ok(result.rows_affected() == 1)
}
