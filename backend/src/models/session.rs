//! Login sessions opened at sign-in and closed at logout.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;

use crate::types::{BranchId, SessionId, UserId};

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Session {
    pub id: SessionId,
    pub user_id: UserId,
    pub branch_id: BranchId,
    pub start_time: DateTime<Utc>,
    /// Set exactly once, never before `start_time`.
    pub end_time: Option<DateTime<Utc>>,
    pub last_action: Option<String>,
    pub ip_address: String,
    pub user_agent: Option<String>,
}

impl Session {
    pub fn is_open(&self) -> bool {
        self.end_time.is_none()
    }
}

#[derive(Debug, Clone)]
pub struct NewSession {
    pub user_id: UserId,
    pub branch_id: BranchId,
    pub ip_address: String,
    pub user_agent: Option<String>,
}
