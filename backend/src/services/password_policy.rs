//! Composition rules a new password must satisfy.

use std::collections::BTreeMap;

use crate::config::Config;
use crate::error::AppError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyViolation {
    /// Stable rule name used as the key of the error map.
    pub rule: &'static str,
    pub message: String,
}

#[cfg_attr(test, mockall::automock)]
pub trait PasswordPolicy: Send + Sync {
    /// Returns every violated rule, empty when the password is acceptable.
    fn validate(&self, password: &str) -> Vec<PolicyViolation>;
}

#[derive(Debug, Clone)]
pub struct ConfiguredPasswordPolicy {
    pub min_length: usize,
    pub require_uppercase: bool,
    pub require_lowercase: bool,
    pub require_numbers: bool,
    pub require_symbols: bool,
}

impl ConfiguredPasswordPolicy {
    pub fn from_config(config: &Config) -> Self {
        Self {
            min_length: config.password_min_length,
            require_uppercase: config.password_require_uppercase,
            require_lowercase: config.password_require_lowercase,
            require_numbers: config.password_require_numbers,
            require_symbols: config.password_require_symbols,
        }
    }
}

impl PasswordPolicy for ConfiguredPasswordPolicy {
    fn validate(&self, password: &str) -> Vec<PolicyViolation> {
        let mut violations = Vec::new();

        if password.chars().count() < self.min_length {
            violations.push(PolicyViolation {
                rule: "MinLength",
                message: format!(
                    "Password must be at least {} characters long",
                    self.min_length
                ),
            });
        }
        if self.require_uppercase && !password.chars().any(|c| c.is_uppercase()) {
            violations.push(PolicyViolation {
                rule: "RequireUppercase",
                message: "Password must contain an uppercase letter".to_string(),
            });
        }
        if self.require_lowercase && !password.chars().any(|c| c.is_lowercase()) {
            violations.push(PolicyViolation {
                rule: "RequireLowercase",
                message: "Password must contain a lowercase letter".to_string(),
            });
        }
        if self.require_numbers && !password.chars().any(|c| c.is_ascii_digit()) {
            violations.push(PolicyViolation {
                rule: "RequireDigit",
                message: "Password must contain a digit".to_string(),
            });
        }
        if self.require_symbols && !password.chars().any(|c| !c.is_alphanumeric()) {
            violations.push(PolicyViolation {
                rule: "RequireSymbol",
                message: "Password must contain a symbol".to_string(),
            });
        }

        violations
    }
}

/// Runs `policy` and turns any violation into a 400 keyed by rule name.
pub fn enforce(policy: &dyn PasswordPolicy, password: &str) -> Result<(), AppError> {
    let violations = policy.validate(password);
    if violations.is_empty() {
        return Ok(());
    }

    let errors: BTreeMap<String, String> = violations
        .into_iter()
        .map(|violation| (violation.rule.to_string(), violation.message))
        .collect();
    Err(AppError::Validation {
        message: "Password validation failed".to_string(),
        errors,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn default_policy() -> ConfiguredPasswordPolicy {
        ConfiguredPasswordPolicy {
            min_length: 8,
            require_uppercase: true,
            require_lowercase: true,
            require_numbers: true,
            require_symbols: false,
        }
    }

    #[test]
    fn accepts_a_compliant_password() {
        assert!(default_policy().validate("Str0ngPass").is_empty());
    }

    #[test]
    fn reports_each_violated_rule_once() {
        let rules: Vec<&str> = default_policy()
            .validate("short")
            .into_iter()
            .map(|v| v.rule)
            .collect();
        assert_eq!(rules, vec!["MinLength", "RequireUppercase", "RequireDigit"]);
    }

    #[test]
    fn symbols_only_checked_when_required() {
        let mut policy = default_policy();
        assert!(policy.validate("Str0ngPass").is_empty());
        policy.require_symbols = true;
        let violations = policy.validate("Str0ngPass");
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].rule, "RequireSymbol");
        assert!(policy.validate("Str0ng!Pass").is_empty());
    }

    #[test]
    fn enforce_maps_mocked_violations_to_one_error_per_rule() {
        let mut policy = MockPasswordPolicy::new();
        policy.expect_validate().times(1).returning(|_| {
            vec![
                PolicyViolation {
                    rule: "MinLength",
                    message: "too short".to_string(),
                },
                PolicyViolation {
                    rule: "RequireDigit",
                    message: "needs a digit".to_string(),
                },
            ]
        });

        match enforce(&policy, "weak") {
            Err(AppError::Validation { message, errors }) => {
                assert_eq!(message, "Password validation failed");
                assert_eq!(errors.len(), 2);
                assert_eq!(errors["MinLength"], "too short");
                assert_eq!(errors["RequireDigit"], "needs a digit");
            }
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn enforce_passes_when_mock_reports_nothing() {
        let mut policy = MockPasswordPolicy::new();
        policy.expect_validate().returning(|_| Vec::new());
        assert!(enforce(&policy, "whatever").is_ok());
    }
}
