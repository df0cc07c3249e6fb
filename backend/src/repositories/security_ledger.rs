//! Postgres queries for IP lists, login attempts, lockouts and security events.

use chrono::{DateTime, Utc};
use sqlx::PgConnection;

use crate::models::security::{AccountLockout, NewLoginAttempt, NewSecurityEvent};

pub async fn is_ip_blacklisted(
    conn: &mut PgConnection,
    ip: &str,
    now: DateTime<Utc>,
) -> Result<bool, sqlx::Error> {
    sqlx::query_scalar::<_, bool>(
        "SELECT EXISTS (SELECT 1 FROM ip_blacklist WHERE ip_address = $1 AND is_active \
         AND (expires_at IS NULL OR expires_at > $2))",
    )
    .bind(ip)
    .bind(now)
    .fetch_one(&mut *conn)
    .await
}

pub async fn is_ip_whitelisted(
    conn: &mut PgConnection,
    ip: &str,
    now: DateTime<Utc>,
) -> Result<bool, sqlx::Error> {
    sqlx::query_scalar::<_, bool>(
        "SELECT EXISTS (SELECT 1 FROM ip_whitelist WHERE ip_address = $1 AND is_active \
         AND (expires_at IS NULL OR expires_at > $2))",
    )
    .bind(ip)
    .bind(now)
    .fetch_one(&mut *conn)
    .await
}

pub async fn insert_login_attempt(
    conn: &mut PgConnection,
    attempt: &NewLoginAttempt,
    at: DateTime<Utc>,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO login_attempts (username, ip_address, user_agent, attempted_at, success, \
         failure_reason) VALUES ($1, $2, $3, $4, $5, $6)",
    )
    .bind(&attempt.username)
    .bind(&attempt.client.ip)
    .bind(&attempt.client.user_agent)
    .bind(at)
    .bind(attempt.success)
    .bind(&attempt.failure_reason)
    .execute(&mut *conn)
    .await
    .map(|_| ())
}

pub async fn last_successful_login(
    conn: &mut PgConnection,
    username: &str,
) -> Result<Option<DateTime<Utc>>, sqlx::Error> {
    sqlx::query_scalar::<_, Option<DateTime<Utc>>>(
        "SELECT MAX(attempted_at) FROM login_attempts WHERE username = $1 AND success",
    )
    .bind(username)
    .fetch_one(&mut *conn)
    .await
}

pub async fn count_failed_attempts_since(
    conn: &mut PgConnection,
    username: &str,
    since: DateTime<Utc>,
) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM login_attempts WHERE username = $1 AND NOT success \
         AND attempted_at > $2",
    )
    .bind(username)
    .bind(since)
    .fetch_one(&mut *conn)
    .await
}

pub async fn find_active_lockout(
    conn: &mut PgConnection,
    username: &str,
) -> Result<Option<AccountLockout>, sqlx::Error> {
    sqlx::query_as::<_, AccountLockout>(
        "SELECT id, username, lockout_start, lockout_end, failed_attempts, is_active, reason \
         FROM account_lockouts WHERE username = $1 AND is_active",
    )
    .bind(username)
    .fetch_optional(&mut *conn)
    .await
}

pub async fn latest_lockout_end(
    conn: &mut PgConnection,
    username: &str,
) -> Result<Option<DateTime<Utc>>, sqlx::Error> {
    sqlx::query_scalar::<_, Option<DateTime<Utc>>>(
        "SELECT MAX(lockout_end) FROM account_lockouts WHERE username = $1",
    )
    .bind(username)
    .fetch_one(&mut *conn)
    .await
}

/// Opens a lockout, or widens the active one when a concurrent failure already
/// opened it.
pub async fn insert_lockout(
    conn: &mut PgConnection,
    username: &str,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    failed_attempts: i32,
    reason: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO account_lockouts (username, lockout_start, lockout_end, failed_attempts, \
         is_active, reason) VALUES ($1, $2, $3, $4, TRUE, $5) \
         ON CONFLICT (username) WHERE is_active DO UPDATE SET \
         lockout_end = GREATEST(account_lockouts.lockout_end, EXCLUDED.lockout_end), \
         failed_attempts = GREATEST(account_lockouts.failed_attempts, EXCLUDED.failed_attempts)",
    )
    .bind(username)
    .bind(start)
    .bind(end)
    .bind(failed_attempts)
    .bind(reason)
    .execute(&mut *conn)
    .await
    .map(|_| ())
}

pub async fn extend_lockout(
    conn: &mut PgConnection,
    lockout_id: i64,
    end: DateTime<Utc>,
    failed_attempts: i32,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE account_lockouts SET lockout_end = GREATEST(lockout_end, $1), \
         failed_attempts = $2 WHERE id = $3 AND is_active",
    )
    .bind(end)
    .bind(failed_attempts)
    .bind(lockout_id)
    .execute(&mut *conn)
    .await
    .map(|_| ())
}

pub async fn deactivate_lockouts(
    conn: &mut PgConnection,
    username: &str,
    now: DateTime<Utc>,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE account_lockouts SET is_active = FALSE, lockout_end = LEAST(lockout_end, $2) \
         WHERE username = $1 AND is_active",
    )
    .bind(username)
    .bind(now)
    .execute(&mut *conn)
    .await?;
    Ok(result.rows_affected())
}

pub async fn insert_security_event(
    conn: &mut PgConnection,
    event: &NewSecurityEvent,
    at: DateTime<Utc>,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO security_events (event_type, username, ip_address, user_agent, user_id, \
         details, created_at) VALUES ($1, $2, $3, $4, $5, $6, $7)",
    )
    .bind(event.event_type.as_str())
    .bind(&event.username)
    .bind(&event.client.ip)
    .bind(&event.client.user_agent)
    .bind(event.user_id)
    .bind(&event.details)
    .bind(at)
    .execute(&mut *conn)
    .await
    .map(|_| ())
}
