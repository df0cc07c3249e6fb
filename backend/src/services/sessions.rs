//! Opening and closing login sessions.

use chrono::{DateTime, Utc};

use crate::error::AppError;
use crate::models::security::ClientInfo;
use crate::models::session::NewSession;
use crate::models::user::User;
use crate::repositories::UnitOfWork;
use crate::types::{BranchId, SessionId, UserId};

pub async fn open(
    tx: &mut dyn UnitOfWork,
    user: &User,
    branch_id: BranchId,
    client: &ClientInfo,
    now: DateTime<Utc>,
) -> Result<SessionId, AppError> {
    tx.open_session(
        &NewSession {
            user_id: user.id,
            branch_id,
            ip_address: client.ip.clone(),
            user_agent: client.user_agent.clone(),
        },
        now,
    )
    .await
}

/// Sets the end time once; a session that is already closed or belongs to
/// someone else is left untouched.
pub async fn close(
    tx: &mut dyn UnitOfWork,
    session_id: SessionId,
    user_id: UserId,
    now: DateTime<Utc>,
) -> Result<bool, AppError> {
    tx.end_session(session_id, user_id, now).await
}

pub async fn is_open(tx: &mut dyn UnitOfWork, session_id: SessionId) -> Result<bool, AppError> {
    Ok(tx
        .find_session(session_id)
        .await?
        .map(|session| session.is_open())
        .unwrap_or(false))
}
