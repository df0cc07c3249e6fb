use axum::extract::FromRequest;

use crate::{error::AppError, models::permission::Actor, utils::jwt::Claims};

pub mod auth;
pub mod health;
pub mod permissions;
pub mod users;

/// `Json` whose rejections are rendered as the error envelope.
#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct AppJson<T>(pub T);

/// The caller as recorded on audit rows, taken from verified claims.
pub(crate) fn actor_of(claims: &Claims) -> Result<Actor, AppError> {
    claims
        .actor()
        .ok_or_else(|| AppError::Unauthorized("Invalid user".to_string()))
}
