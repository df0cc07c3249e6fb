//! Postgres queries for login sessions.

use chrono::{DateTime, Utc};
use sqlx::PgConnection;

use crate::models::session::{NewSession, Session};
use crate::types::{SessionId, UserId};

pub async fn insert_session(
    conn: &mut PgConnection,
    session: &NewSession,
    now: DateTime<Utc>,
) -> Result<SessionId, sqlx::Error> {
    sqlx::query_scalar::<_, SessionId>(
        "INSERT INTO sessions (user_id, branch_id, start_time, last_action, ip_address, user_agent) \
         VALUES ($1, $2, $3, 'Login', $4, $5) RETURNING id",
    )
    .bind(session.user_id)
    .bind(session.branch_id)
    .bind(now)
    .bind(&session.ip_address)
    .bind(&session.user_agent)
    .fetch_one(&mut *conn)
    .await
}

pub async fn find_session(
    conn: &mut PgConnection,
    id: SessionId,
) -> Result<Option<Session>, sqlx::Error> {
    sqlx::query_as::<_, Session>(
        "SELECT id, user_id, branch_id, start_time, end_time, last_action, ip_address, user_agent \
         FROM sessions WHERE id = $1",
    )
    .bind(id)
    .fetch_optional(&mut *conn)
    .await
}

pub async fn end_session(
    conn: &mut PgConnection,
    id: SessionId,
    user_id: UserId,
    now: DateTime<Utc>,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE sessions SET end_time = GREATEST($3, start_time), last_action = 'Logout' \
         WHERE id = $1 AND user_id = $2 AND end_time IS NULL",
    )
    .bind(id)
    .bind(user_id)
    .bind(now)
    .execute(&mut *conn)
    .await?;
    Ok(result.rows_affected() == 1)
}

pub async fn end_sessions_for_user(
    conn: &mut PgConnection,
    user_id: UserId,
    now: DateTime<Utc>,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE sessions SET end_time = GREATEST($2, start_time), last_action = 'ForcedEnd' \
         WHERE user_id = $1 AND end_time IS NULL",
    )
    .bind(user_id)
    .bind(now)
    .execute(&mut *conn)
    .await?;
    Ok(result.rows_affected())
}
