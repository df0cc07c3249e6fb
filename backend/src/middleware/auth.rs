use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use thiserror::Error;

use crate::{
    error::AppError,
    repositories::{finish, CommitPolicy, UnitOfWork},
    services::sessions,
    state::AppState,
    utils::jwt::{verify_access_token, Claims},
};

/// Why a bearer token was refused.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthRejection {
    #[error("Missing bearer token")]
    MissingToken,
    #[error("Invalid or expired token")]
    InvalidToken,
    #[error("Token has been revoked")]
    Revoked,
    #[error("Session has ended")]
    SessionEnded,
}

impl From<AuthRejection> for AppError {
    fn from(rejection: AuthRejection) -> Self {
        AppError::Unauthorized(rejection.to_string())
    }
}

/// Verifies the bearer token, rejects blacklisted tokens and ended sessions,
/// then hands the claims to the handler through request extensions.
pub async fn auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = bearer_token(request.headers()).ok_or(AuthRejection::MissingToken)?;
    let claims = verify_access_token(token, &state.config.jwt_secret).map_err(|err| {
        tracing::debug!(error = %err, "Rejected bearer token");
        AuthRejection::InvalidToken
    })?;

    let mut tx = state.store.begin().await?;
    let outcome = check_token_state(tx.as_mut(), &claims).await;
    finish(tx, outcome, CommitPolicy::OnSuccess).await??;

    request.extensions_mut().insert(claims);
    Ok(next.run(request).await)
}

async fn check_token_state(
    tx: &mut dyn UnitOfWork,
    claims: &Claims,
) -> Result<Result<(), AuthRejection>, AppError> {
    if tx.is_token_blacklisted(&claims.jti).await? {
        return Ok(Err(AuthRejection::Revoked));
    }
    if !sessions::is_open(tx, claims.session_id).await? {
        return Ok(Err(AuthRejection::SessionEnded));
    }
    Ok(Ok(()))
}

/// Extracts the token from an `Authorization: Bearer <token>` header.
pub fn bearer_token(headers: &axum::http::HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(parse_bearer_token)
}

fn parse_bearer_token(header: &str) -> Option<&str> {
    let (scheme, rest) = header.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = rest.trim();
    (!token.is_empty()).then_some(token)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_bearer_scheme_case_insensitively() {
        assert_eq!(parse_bearer_token("Bearer abc"), Some("abc"));
        assert_eq!(parse_bearer_token("bearer  abc "), Some("abc"));
        assert_eq!(parse_bearer_token("Basic abc"), None);
        assert_eq!(parse_bearer_token("Bearer "), None);
        assert_eq!(parse_bearer_token("abc"), None);
    }

    #[test]
    fn rejections_become_unauthorized_errors() {
        let err: AppError = AuthRejection::SessionEnded.into();
        assert_eq!(err.status(), axum::http::StatusCode::UNAUTHORIZED);
        assert_eq!(err.to_string(), "Session has ended");
    }
}
