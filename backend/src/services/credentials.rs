//! Username, password and enabled-flag verification.

use crate::error::AppError;
use crate::models::user::User;
use crate::repositories::UnitOfWork;
use crate::utils::password::{burn_verification, verify_password};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialFailure {
    UnknownUser,
    Disabled,
    WrongPassword,
    UnusableHash,
}

impl CredentialFailure {
    /// Reason stored on the login attempt row. Never shown to the client.
    pub fn reason(&self) -> &'static str {
        match self {
            CredentialFailure::UnknownUser => "Unknown username",
            CredentialFailure::Disabled => "Account disabled",
            CredentialFailure::WrongPassword => "Invalid password",
            CredentialFailure::UnusableHash => "Stored password hash unusable",
        }
    }
}

#[derive(Debug, Clone)]
pub enum CredentialCheck {
    Verified(Box<User>),
    Rejected(CredentialFailure),
}

pub async fn verify(
    tx: &mut dyn UnitOfWork,
    username: &str,
    password: &str,
) -> Result<CredentialCheck, AppError> {
    let Some(user) = tx.find_user_by_username(username).await? else {
        burn_verification(password);
        return Ok(CredentialCheck::Rejected(CredentialFailure::UnknownUser));
    };

    if !user.is_enabled {
        burn_verification(password);
        return Ok(CredentialCheck::Rejected(CredentialFailure::Disabled));
    }

    match verify_password(password, &user.password_hash) {
        Ok(true) => Ok(CredentialCheck::Verified(Box::new(user))),
        Ok(false) => Ok(CredentialCheck::Rejected(CredentialFailure::WrongPassword)),
        Err(err) => {
            tracing::warn!(user_id = %user.id, error = %err, "Stored password hash rejected");
            Ok(CredentialCheck::Rejected(CredentialFailure::UnusableHash))
        }
    }
}
