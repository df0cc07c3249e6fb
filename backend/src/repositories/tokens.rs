//! Postgres queries for refresh tokens and the access-token blacklist.

use chrono::{DateTime, Utc};
use sqlx::PgConnection;

use crate::models::token::{BlacklistedToken, NewRefreshToken, RefreshRevocation, RefreshToken};
use crate::types::UserId;

/// Inserts a new refresh token into the database.
pub async fn insert_refresh_token(
    conn: &mut PgConnection,
    token: &NewRefreshToken,
    created_at: DateTime<Utc>,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO refresh_tokens (token_hash, user_id, session_id, created_at, expires_at) \
         VALUES ($1, $2, $3, $4, $5)",
    )
    .bind(&token.token_hash)
    .bind(token.user_id)
    .bind(token.session_id)
    .bind(created_at)
    .bind(token.expires_at)
    .execute(&mut *conn)
    .await
    .map(|_| ())
}

pub async fn find_refresh_token(
    conn: &mut PgConnection,
    token_hash: &str,
) -> Result<Option<RefreshToken>, sqlx::Error> {
    sqlx::query_as::<_, RefreshToken>(
        "SELECT id, token_hash, user_id, session_id, created_at, expires_at, is_revoked, \
         revoked_at, revoked_reason, replaced_by FROM refresh_tokens WHERE token_hash = $1",
    )
    .bind(token_hash)
    .fetch_optional(&mut *conn)
    .await
}

pub async fn revoke_refresh_token(
    conn: &mut PgConnection,
    token_hash: &str,
    revocation: &RefreshRevocation,
    now: DateTime<Utc>,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE refresh_tokens SET is_revoked = TRUE, revoked_at = $2, revoked_reason = $3, \
         replaced_by = $4 WHERE token_hash = $1 AND NOT is_revoked",
    )
    .bind(token_hash)
    .bind(now)
    .bind(&revocation.reason)
    .bind(&revocation.replaced_by)
    .execute(&mut *conn)
    .await?;
    Ok(result.rows_affected() == 1)
}

/// Revokes every still-active refresh token of a user.
pub async fn revoke_refresh_tokens_for_user(
    conn: &mut PgConnection,
    user_id: UserId,
    reason: &str,
    now: DateTime<Utc>,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE refresh_tokens SET is_revoked = TRUE, revoked_at = $2, revoked_reason = $3 \
         WHERE user_id = $1 AND NOT is_revoked AND expires_at > $2",
    )
    .bind(user_id)
    .bind(now)
    .bind(reason)
    .execute(&mut *conn)
    .await?;
    Ok(result.rows_affected())
}

pub async fn insert_blacklisted_token(
    conn: &mut PgConnection,
    token: &BlacklistedToken,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO blacklisted_tokens (jti, expires_at, blacklisted_at, reason) \
         VALUES ($1, $2, $3, $4) ON CONFLICT (jti) DO NOTHING",
    )
    .bind(&token.jti)
    .bind(token.expires_at)
    .bind(token.blacklisted_at)
    .bind(&token.reason)
    .execute(&mut *conn)
    .await
    .map(|_| ())
}

pub async fn is_token_blacklisted(conn: &mut PgConnection, jti: &str) -> Result<bool, sqlx::Error> {
    sqlx::query_scalar::<_, bool>("SELECT EXISTS (SELECT 1 FROM blacklisted_tokens WHERE jti = $1)")
        .bind(jti)
        .fetch_one(&mut *conn)
        .await
}

/// Deletes blacklist rows whose token would already fail expiry validation.
pub async fn cleanup_expired_blacklist(
    conn: &mut PgConnection,
    now: DateTime<Utc>,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("DELETE FROM blacklisted_tokens WHERE expires_at <= $1")
        .bind(now)
        .execute(&mut *conn)
        .await?;
    Ok(result.rows_affected())
}

pub async fn cleanup_refresh_tokens(
    conn: &mut PgConnection,
    cutoff: DateTime<Utc>,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        "DELETE FROM refresh_tokens WHERE expires_at <= $1 OR (is_revoked AND revoked_at <= $1)",
    )
    .bind(cutoff)
    .execute(&mut *conn)
    .await?;
    Ok(result.rows_affected())
}
