//! Ledger records: login attempts, lockouts, IP lists and security events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use std::str::FromStr;

use crate::types::UserId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SecurityEventType {
    LoginSuccess,
    LoginFailure,
    UnauthorizedAccess,
    AccountLocked,
    AccountUnlocked,
    PasswordChanged,
    PasswordReset,
    TokenRefreshed,
    TokenRejected,
    Logout,
    PermissionsChanged,
}

impl SecurityEventType {
    pub const ALL: [SecurityEventType; 11] = [
        SecurityEventType::LoginSuccess,
        SecurityEventType::LoginFailure,
        SecurityEventType::UnauthorizedAccess,
        SecurityEventType::AccountLocked,
        SecurityEventType::AccountUnlocked,
        SecurityEventType::PasswordChanged,
        SecurityEventType::PasswordReset,
        SecurityEventType::TokenRefreshed,
        SecurityEventType::TokenRejected,
        SecurityEventType::Logout,
        SecurityEventType::PermissionsChanged,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SecurityEventType::LoginSuccess => "LoginSuccess",
            SecurityEventType::LoginFailure => "LoginFailure",
            SecurityEventType::UnauthorizedAccess => "UnauthorizedAccess",
            SecurityEventType::AccountLocked => "AccountLocked",
            SecurityEventType::AccountUnlocked => "AccountUnlocked",
            SecurityEventType::PasswordChanged => "PasswordChanged",
            SecurityEventType::PasswordReset => "PasswordReset",
            SecurityEventType::TokenRefreshed => "TokenRefreshed",
            SecurityEventType::TokenRejected => "TokenRejected",
            SecurityEventType::Logout => "Logout",
            SecurityEventType::PermissionsChanged => "PermissionsChanged",
        }
    }
}

impl fmt::Display for SecurityEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SecurityEventType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| format!("unknown security event type: {s}"))
    }
}

/// Address and agent of the caller, captured once per request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientInfo {
    pub ip: String,
    pub user_agent: Option<String>,
}

impl ClientInfo {
    pub fn new(ip: impl Into<String>, user_agent: Option<String>) -> Self {
        Self {
            ip: ip.into(),
            user_agent,
        }
    }
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct SecurityEvent {
    pub id: i64,
    pub event_type: String,
    pub username: Option<String>,
    pub ip_address: String,
    pub user_agent: Option<String>,
    pub user_id: Option<UserId>,
    pub details: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewSecurityEvent {
    pub event_type: SecurityEventType,
    pub username: Option<String>,
    pub user_id: Option<UserId>,
    pub client: ClientInfo,
    pub details: Option<String>,
}

impl NewSecurityEvent {
    pub fn new(event_type: SecurityEventType, client: &ClientInfo) -> Self {
        Self {
            event_type,
            username: None,
            user_id: None,
            client: client.clone(),
            details: None,
        }
    }

    pub fn username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    pub fn user_id(mut self, user_id: UserId) -> Self {
        self.user_id = Some(user_id);
        self
    }

    pub fn details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct LoginAttempt {
    pub id: i64,
    pub username: String,
    pub ip_address: String,
    pub user_agent: Option<String>,
    pub attempted_at: DateTime<Utc>,
    pub success: bool,
    pub failure_reason: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewLoginAttempt {
    pub username: String,
    pub client: ClientInfo,
    pub success: bool,
    pub failure_reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct AccountLockout {
    pub id: i64,
    pub username: String,
    pub lockout_start: DateTime<Utc>,
    pub lockout_end: DateTime<Utc>,
    pub failed_attempts: i32,
    pub is_active: bool,
    pub reason: Option<String>,
}

/// Row of either the IP allow list or the IP deny list.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct IpRule {
    pub id: i64,
    pub ip_address: String,
    pub description: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl IpRule {
    pub fn applies_at(&self, ip: &str, now: DateTime<Utc>) -> bool {
        self.is_active
            && self.ip_address == ip
            && self.expires_at.map(|expires| expires > now).unwrap_or(true)
    }
}
