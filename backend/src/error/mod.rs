use std::collections::BTreeMap;

use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
};

use crate::models::envelope::ReturnResult;

#[derive(Debug)]
pub enum AppError {
    NotFound(String),
    Unauthorized(String),
    Conflict(String),
    BadRequest(String),
    /// Carries a title plus one message per violated rule or field.
    Validation {
        message: String,
        errors: BTreeMap<String, String>,
    },
    /// A rejection with its own title, e.g. "Account locked".
    Rejected {
        status: StatusCode,
        title: String,
        message: String,
    },
    InternalServerError(anyhow::Error),
}

impl AppError {
    pub fn rejected(status: StatusCode, title: &str, message: impl Into<String>) -> Self {
        AppError::Rejected {
            status,
            title: title.to_string(),
            message: message.into(),
        }
    }

    pub fn is_internal(&self) -> bool {
        matches!(self, AppError::InternalServerError(_))
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::BadRequest(_) | AppError::Validation { .. } => StatusCode::BAD_REQUEST,
            AppError::Rejected { status, .. } => *status,
            AppError::InternalServerError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AppError::NotFound(msg)
            | AppError::Unauthorized(msg)
            | AppError::Conflict(msg)
            | AppError::BadRequest(msg) => write!(f, "{}", msg),
            AppError::Validation { message, .. } => write!(f, "{}", message),
            AppError::Rejected { title, message, .. } => write!(f, "{}: {}", title, message),
            AppError::InternalServerError(err) => write!(f, "internal error: {}", err),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let envelope = match self {
            AppError::NotFound(msg) => ReturnResult::<()>::failed(status, "Not found", msg),
            AppError::Unauthorized(msg) => ReturnResult::failed(status, "Unauthorized", msg),
            AppError::Conflict(msg) => ReturnResult::failed(status, "Conflict", msg),
            AppError::BadRequest(msg) => ReturnResult::failed(status, "Bad request", msg),
            AppError::Validation { message, errors } => {
                ReturnResult::failed(status, &message, message.clone()).with_errors(errors)
            }
            AppError::Rejected { title, message, .. } => {
                ReturnResult::failed(status, &title, message)
            }
            AppError::InternalServerError(err) => {
                tracing::error!("Internal server error: {:?}", err);
                ReturnResult::failed(
                    status,
                    "Internal server error",
                    "An unexpected error occurred",
                )
            }
        };

        envelope.into_response()
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::InternalServerError(err)
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => AppError::NotFound("Resource not found".to_string()),
            sqlx::Error::Database(ref db) if db.is_unique_violation() => {
                AppError::Conflict("Resource was modified concurrently, retry".to_string())
            }
            _ => AppError::InternalServerError(err.into()),
        }
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let errors = errors
            .field_errors()
            .into_iter()
            .map(|(field, errs)| {
                let message = errs
                    .iter()
                    .map(|e| {
                        e.message
                            .as_ref()
                            .map(|m| m.to_string())
                            .unwrap_or_else(|| e.code.to_string())
                    })
                    .collect::<Vec<_>>()
                    .join(", ");
                (field.to_string(), message)
            })
            .collect();
        AppError::Validation {
            message: "Validation failed".to_string(),
            errors,
        }
    }
}
