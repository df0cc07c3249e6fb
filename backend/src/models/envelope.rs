//! Uniform response envelope returned by every JSON endpoint.

use std::collections::BTreeMap;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResultStatus {
    Success,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReturnResult<T> {
    pub code: u16,
    pub status: ResultStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<BTreeMap<String, String>>,
}

/// Statuses outside 200..=500 are pinned to the nearest bound before being written.
pub fn clamp_status(status: StatusCode) -> StatusCode {
    let code = status.as_u16().clamp(200, 500);
    StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
}

impl<T> ReturnResult<T> {
    pub fn success(data: T) -> Self {
        Self {
            code: StatusCode::OK.as_u16(),
            status: ResultStatus::Success,
            title: None,
            message: None,
            data: Some(data),
            errors: None,
        }
    }

    pub fn failed(status: StatusCode, title: &str, message: impl Into<String>) -> Self {
        Self {
            code: clamp_status(status).as_u16(),
            status: ResultStatus::Failed,
            title: Some(title.to_string()),
            message: Some(message.into()),
            data: None,
            errors: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_errors(mut self, errors: BTreeMap<String, String>) -> Self {
        self.errors = Some(errors);
        self
    }
}

impl ReturnResult<()> {
    /// A success envelope carrying only a message.
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            code: StatusCode::OK.as_u16(),
            status: ResultStatus::Success,
            title: None,
            message: Some(message.into()),
            data: None,
            errors: None,
        }
    }
}

impl<T: Serialize> IntoResponse for ReturnResult<T> {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.code)
            .map(clamp_status)
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self)).into_response()
    }
}
