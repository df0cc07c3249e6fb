//! Common validation rules shared across request payloads.

use std::borrow::Cow;

use validator::ValidationError;

use crate::models::permission::MAX_PERMISSION_PATH_LEN;

/// Validates username shape: 1-100 characters, not blank.
///
/// Any character set is accepted.
pub fn validate_username(username: &str) -> Result<(), ValidationError> {
    if username.trim().is_empty() || username.chars().count() > 100 {
        return Err(ValidationError::new("username_invalid_length")
            .with_message(Cow::Borrowed("username must be 1-100 characters")));
    }

    Ok(())
}

/// A permission path is a non-empty slash separated route with no whitespace.
pub fn is_well_formed_permission_path(path: &str) -> bool {
    !path.is_empty()
        && path.len() <= MAX_PERMISSION_PATH_LEN
        && !path.chars().any(char::is_whitespace)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn username_rejects_empty() {
        assert!(validate_username("").is_err());
        assert!(validate_username("   ").is_err());
    }

    #[test]
    fn username_rejects_overlong() {
        assert!(validate_username(&"u".repeat(101)).is_err());
        assert!(validate_username(&"u".repeat(100)).is_ok());
    }

    #[test]
    fn username_accepts_valid() {
        assert!(validate_username("valid_user123").is_ok());
        assert!(validate_username("first.last@branch").is_ok());
        assert!(validate_username("Mary Ann").is_ok());
    }

    #[test]
    fn permission_path_rules() {
        assert!(is_well_formed_permission_path("/api/user/v1/lock"));
        assert!(!is_well_formed_permission_path(""));
        assert!(!is_well_formed_permission_path("/api/user v1"));
        assert!(!is_well_formed_permission_path(&"a".repeat(MAX_PERMISSION_PATH_LEN + 1)));
    }
}
