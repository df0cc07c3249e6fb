use axum::extract::{Extension, State};
use validator::Validate;

use crate::{
    error::AppError,
    handlers::{actor_of, AppJson},
    models::{
        envelope::ReturnResult,
        security::ClientInfo,
        user::{LockUserRequest, ResetPasswordRequest, UserStatusResponse},
    },
    state::AppState,
    types::UserId,
    utils::jwt::Claims,
};

pub async fn lock_user(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    client: ClientInfo,
    AppJson(payload): AppJson<LockUserRequest>,
) -> Result<ReturnResult<UserStatusResponse>, AppError> {
    payload.validate()?;
    let actor = actor_of(&claims)?;
    state
        .permission_service()
        .authorize(&actor, "users.lock", &client)
        .await?;
    let status = state
        .user_admin_service()
        .set_user_active(
            &actor,
            UserId(payload.target_user_id),
            payload.is_active,
            &client,
        )
        .await?;
    let message = if status.is_enabled {
        "User unlocked"
    } else {
        "User locked"
    };
    Ok(ReturnResult::success(status).with_message(message))
}

pub async fn reset_password(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    client: ClientInfo,
    AppJson(payload): AppJson<ResetPasswordRequest>,
) -> Result<ReturnResult<()>, AppError> {
    payload.validate()?;
    let actor = actor_of(&claims)?;
    state
        .user_admin_service()
        .reset_password(
            &actor,
            UserId(payload.user_id),
            &payload.new_password,
            &client,
        )
        .await?;
    Ok(ReturnResult::message("Password reset successfully"))
}
