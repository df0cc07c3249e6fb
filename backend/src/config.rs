use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;

use crate::types::{RoleId, UserId};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub database_url: String,
    pub bind_address: String,
    pub jwt_secret: String,
    pub access_token_expiration_minutes: u64,
    pub refresh_token_expiration_days: u64,
    /// Consecutive failures that open a lockout.
    pub login_failure_threshold: u32,
    /// Failures older than this window no longer count toward the threshold.
    pub login_failure_window_minutes: u64,
    pub account_lockout_duration_minutes: u64,
    /// When false only the deny list is consulted.
    pub ip_allowlist_enforced: bool,
    /// Trust the first `X-Forwarded-For` entry as the client address.
    pub behind_proxy: bool,
    pub password_min_length: usize,
    pub password_require_uppercase: bool,
    pub password_require_lowercase: bool,
    pub password_require_numbers: bool,
    pub password_require_symbols: bool,
    /// How long a user has to replace an administrator-issued password.
    pub password_reset_deadline_hours: u64,
    pub system_admin_role_id: RoleId,
    pub root_admin_user_id: UserId,
    /// Replaces the unusable seeded hash of the root administrator at startup.
    #[serde(skip_serializing)]
    pub admin_initial_password: Option<String>,
    pub token_retention_days: u64,
    pub rate_limit_enabled: bool,
    pub rate_limit_auth_max_requests: u32,
    pub rate_limit_auth_window_seconds: u64,
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self::from_lookup(|key| env::var(key).ok());
        if config.login_failure_threshold == 0 {
            anyhow::bail!("LOGIN_FAILURE_THRESHOLD must be at least 1");
        }
        if config.jwt_secret.is_empty() {
            anyhow::bail!("JWT_SECRET must not be empty");
        }

        Ok(config)
    }

    /// Builds a config from `lookup`, falling back to defaults for missing or
    /// unparsable values.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let text = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());
        let number = |key: &str, default: u64| parse_or(lookup(key).as_deref(), default);
        let flag = |key: &str, default: bool| parse_flag(lookup(key).as_deref(), default);

        Config {
            database_url: text("DATABASE_URL", "postgres://localhost/gatekeeper"),
            bind_address: text("BIND_ADDRESS", "0.0.0.0:3000"),
            jwt_secret: text("JWT_SECRET", "your-secret-key-change-this-in-production"),
            access_token_expiration_minutes: number("ACCESS_TOKEN_EXPIRATION_MINUTES", 300),
            refresh_token_expiration_days: number("REFRESH_TOKEN_EXPIRATION_DAYS", 7),
            login_failure_threshold: parse_or(lookup("LOGIN_FAILURE_THRESHOLD").as_deref(), 5),
            login_failure_window_minutes: number("LOGIN_FAILURE_WINDOW_MINUTES", 15),
            account_lockout_duration_minutes: number("LOCKOUT_DURATION_MINUTES", 15),
            ip_allowlist_enforced: flag("IP_ALLOWLIST_ENFORCED", false),
            behind_proxy: flag("BEHIND_PROXY", false),
            password_min_length: parse_or(lookup("PASSWORD_MIN_LENGTH").as_deref(), 8),
            password_require_uppercase: flag("PASSWORD_REQUIRE_UPPERCASE", true),
            password_require_lowercase: flag("PASSWORD_REQUIRE_LOWERCASE", true),
            password_require_numbers: flag("PASSWORD_REQUIRE_NUMBERS", true),
            password_require_symbols: flag("PASSWORD_REQUIRE_SYMBOLS", false),
            password_reset_deadline_hours: number("PASSWORD_RESET_DEADLINE_HOURS", 48),
            system_admin_role_id: RoleId(parse_or(lookup("SYSTEM_ADMIN_ROLE_ID").as_deref(), 1)),
            root_admin_user_id: UserId(parse_or(lookup("ROOT_ADMIN_USER_ID").as_deref(), 1)),
            admin_initial_password: lookup("ADMIN_INITIAL_PASSWORD").filter(|v| !v.is_empty()),
            token_retention_days: number("TOKEN_RETENTION_DAYS", 30),
            rate_limit_enabled: flag("RATE_LIMIT_ENABLED", true),
            rate_limit_auth_max_requests: parse_or(
                lookup("RATE_LIMIT_AUTH_MAX_REQUESTS").as_deref(),
                15,
            ),
            rate_limit_auth_window_seconds: number("RATE_LIMIT_AUTH_WINDOW_SECONDS", 60),
        }
    }

    pub fn access_token_ttl(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.access_token_expiration_minutes as i64)
    }

    pub fn refresh_token_ttl(&self) -> chrono::Duration {
        chrono::Duration::days(self.refresh_token_expiration_days as i64)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}

fn parse_or<T: FromStr>(raw: Option<&str>, default: T) -> T {
    raw.and_then(|value| value.trim().parse().ok())
        .unwrap_or(default)
}

fn parse_flag(raw: Option<&str>, default: bool) -> bool {
    match raw.map(|value| value.trim().to_ascii_lowercase()) {
        Some(value) if matches!(value.as_str(), "1" | "true" | "yes" | "on") => true,
        Some(value) if matches!(value.as_str(), "0" | "false" | "no" | "off") => false,
        _ => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_or_falls_back_on_missing_or_garbage() {
        assert_eq!(parse_or::<u64>(None, 7), 7);
        assert_eq!(parse_or::<u64>(Some("abc"), 7), 7);
        assert_eq!(parse_or::<u64>(Some(" 12 "), 7), 12);
    }

    #[test]
    fn parse_flag_accepts_common_spellings() {
        assert!(parse_flag(Some("TRUE"), false));
        assert!(parse_flag(Some("1"), false));
        assert!(!parse_flag(Some("off"), true));
        assert!(parse_flag(Some("maybe"), true));
        assert!(!parse_flag(None, false));
    }

    #[test]
    fn from_lookup_overrides_defaults() {
        let config = Config::from_lookup(|key| match key {
            "LOGIN_FAILURE_THRESHOLD" => Some("3".to_string()),
            "IP_ALLOWLIST_ENFORCED" => Some("true".to_string()),
            "ROOT_ADMIN_USER_ID" => Some("9".to_string()),
            _ => None,
        });
        assert_eq!(config.login_failure_threshold, 3);
        assert!(config.ip_allowlist_enforced);
        assert_eq!(config.root_admin_user_id, UserId(9));
        assert_eq!(config.access_token_expiration_minutes, 300);
        assert_eq!(config.access_token_ttl().num_seconds(), 300 * 60);
        assert!(config.admin_initial_password.is_none());
    }
}
