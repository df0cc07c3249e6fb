//! Consecutive-failure tracking and account lockouts.

use chrono::{DateTime, Duration, Utc};

use crate::config::Config;
use crate::error::AppError;
use crate::repositories::UnitOfWork;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockoutStatus {
    Clear,
    Locked {
        until: DateTime<Utc>,
        remaining_minutes: i64,
    },
}

#[derive(Debug, Clone, Copy)]
pub struct LockoutPolicy {
    pub threshold: u32,
    pub window: Duration,
    pub duration: Duration,
}

impl LockoutPolicy {
    pub fn from_config(config: &Config) -> Self {
        Self {
            threshold: config.login_failure_threshold,
            window: Duration::minutes(config.login_failure_window_minutes as i64),
            duration: Duration::minutes(config.account_lockout_duration_minutes as i64),
        }
    }
}

/// Whole minutes left, rounded half away from zero and never negative.
pub fn remaining_minutes(remaining: Duration) -> i64 {
    let seconds = remaining.num_seconds().max(0) as f64;
    (seconds / 60.0).round() as i64
}

/// An elapsed lockout that is still flagged active is deactivated here.
pub async fn status(
    tx: &mut dyn UnitOfWork,
    username: &str,
    now: DateTime<Utc>,
) -> Result<LockoutStatus, AppError> {
    match tx.find_active_lockout(username).await? {
        Some(lockout) if lockout.lockout_end > now => Ok(LockoutStatus::Locked {
            until: lockout.lockout_end,
            remaining_minutes: remaining_minutes(lockout.lockout_end - now),
        }),
        Some(_) => {
            tx.deactivate_lockouts(username, now).await?;
            tracing::debug!(username, "Expired lockout deactivated");
            Ok(LockoutStatus::Clear)
        }
        None => Ok(LockoutStatus::Clear),
    }
}

/// Counts failures after the latest success, after the end of the latest
/// lockout, and inside the observation window. Opens or extends a lockout when
/// the count reaches the threshold and returns its end.
pub async fn register_failure(
    tx: &mut dyn UnitOfWork,
    policy: &LockoutPolicy,
    username: &str,
    now: DateTime<Utc>,
) -> Result<Option<DateTime<Utc>>, AppError> {
    let mut since = now - policy.window;
    if let Some(success) = tx.last_successful_login(username).await? {
        since = since.max(success);
    }
    if let Some(lockout_end) = tx.latest_lockout_end(username).await? {
        since = since.max(lockout_end);
    }

    let failures = tx.count_failed_attempts_since(username, since).await?;
    if failures < i64::from(policy.threshold) {
        return Ok(None);
    }

    let end = now + policy.duration;
    let failed_attempts = i32::try_from(failures).unwrap_or(i32::MAX);
    match tx.find_active_lockout(username).await? {
        Some(active) => {
            tx.extend_lockout(active.id, end, failed_attempts).await?;
        }
        None => {
            tx.open_lockout(
                username,
                now,
                end,
                failed_attempts,
                "Too many failed login attempts",
            )
            .await?;
        }
    }

    tracing::warn!(username, failures, until = %end, "Account locked");
    Ok(Some(end))
}

/// Clears lockouts after a successful login or an administrative unlock.
pub async fn clear(
    tx: &mut dyn UnitOfWork,
    username: &str,
    now: DateTime<Utc>,
) -> Result<u64, AppError> {
    tx.deactivate_lockouts(username, now).await
}
