use axum::{
    body::Bytes,
    extract::{Extension, State},
    http::HeaderMap,
};
use validator::Validate;

use crate::{
    error::AppError,
    handlers::{actor_of, AppJson},
    middleware::auth::bearer_token,
    models::{
        auth::{
            ChangePasswordRequest, LoginOutcome, LoginRequest, LogoutRequest,
            RefreshTokenRequest, SecureChangePasswordRequest, TokenPair,
        },
        envelope::ReturnResult,
        security::ClientInfo,
    },
    state::AppState,
    types::UserId,
    utils::jwt::Claims,
};

pub async fn login(
    State(state): State<AppState>,
    client: ClientInfo,
    AppJson(payload): AppJson<LoginRequest>,
) -> Result<ReturnResult<LoginOutcome>, AppError> {
    let outcome = state.auth_service().login(&payload, &client).await?;
    Ok(ReturnResult::success(outcome))
}

pub async fn refresh(
    State(state): State<AppState>,
    client: ClientInfo,
    AppJson(payload): AppJson<RefreshTokenRequest>,
) -> Result<ReturnResult<TokenPair>, AppError> {
    if payload.refresh_token.trim().is_empty() {
        return Err(AppError::Unauthorized("Invalid refresh token".to_string()));
    }
    let pair = state
        .auth_service()
        .refresh_token(&payload.refresh_token, &client)
        .await?;
    Ok(ReturnResult::success(pair))
}

/// Always answers 200; each cleanup step logs its own failure.
pub async fn logout(
    State(state): State<AppState>,
    client: ClientInfo,
    headers: HeaderMap,
    body: Bytes,
) -> ReturnResult<()> {
    let payload: LogoutRequest = if body.is_empty() {
        LogoutRequest::default()
    } else {
        serde_json::from_slice(&body).unwrap_or_else(|err| {
            tracing::debug!(error = %err, "Ignoring unreadable logout body");
            LogoutRequest::default()
        })
    };
    state
        .auth_service()
        .logout(
            bearer_token(&headers),
            payload.refresh_token.as_deref(),
            &client,
        )
        .await;
    ReturnResult::message("Logged out successfully")
}

pub async fn change_password(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    client: ClientInfo,
    AppJson(payload): AppJson<ChangePasswordRequest>,
) -> Result<ReturnResult<()>, AppError> {
    payload.validate()?;
    let actor = actor_of(&claims)?;
    state
        .permission_service()
        .authorize(&actor, "users.change-password", &client)
        .await?;
    state
        .auth_service()
        .change_password(
            &claims,
            UserId(payload.user_id),
            &payload.new_password,
            &client,
        )
        .await?;
    Ok(ReturnResult::message("Password changed successfully"))
}

pub async fn secure_change_password(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    client: ClientInfo,
    AppJson(payload): AppJson<SecureChangePasswordRequest>,
) -> Result<ReturnResult<()>, AppError> {
    state
        .auth_service()
        .secure_change_password(
            &claims,
            &payload.current_password,
            &payload.new_password,
            &client,
        )
        .await?;
    Ok(ReturnResult::message("Password changed successfully"))
}
