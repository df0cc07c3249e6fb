use axum::body::Body;
use axum::http::{HeaderValue, Response, StatusCode};
use axum::response::IntoResponse;
use governor::middleware::StateInformationMiddleware;
use std::sync::Arc;
use std::time::Duration;
use tower_governor::{
    governor::GovernorConfigBuilder, key_extractor::PeerIpKeyExtractor, GovernorError,
    GovernorLayer,
};

use crate::config::Config;
use crate::models::envelope::ReturnResult;

/// Per-peer-IP limiter shared by every `/api/secure-auth` route.
///
/// Returns `None` when rate limiting is disabled or the configured quota is
/// rejected by governor.
pub fn create_auth_rate_limiter(
    config: &Config,
) -> Option<GovernorLayer<PeerIpKeyExtractor, StateInformationMiddleware, Body>> {
    if !config.rate_limit_enabled {
        return None;
    }
    let burst_size = config.rate_limit_auth_max_requests.max(1);
    let window_seconds = config.rate_limit_auth_window_seconds.max(1);
    // governor replenishes one cell per period, so spread the window over the burst.
    let period = Duration::from_secs(window_seconds) / burst_size;
    let governor_conf = GovernorConfigBuilder::default()
        .period(period.max(Duration::from_millis(1)))
        .burst_size(burst_size)
        .key_extractor(PeerIpKeyExtractor)
        .use_headers()
        .finish();

    let Some(governor_conf) = governor_conf else {
        tracing::warn!(burst_size, window_seconds, "Invalid rate limit quota, limiter disabled");
        return None;
    };

    Some(GovernorLayer::new(Arc::new(governor_conf)).error_handler(rate_limit_error_handler))
}

fn rate_limit_error_handler(error: GovernorError) -> Response<Body> {
    match error {
        GovernorError::TooManyRequests { wait_time, headers } => {
            tracing::warn!(wait_time, "Rate limit exceeded");
            let mut response = envelope_response(
                StatusCode::TOO_MANY_REQUESTS,
                "Too many requests",
                "Too many requests. Please try again later.",
            );
            if let Some(headers) = headers {
                response.headers_mut().extend(headers);
            }
            if let Ok(value) = HeaderValue::from_str(&wait_time.to_string()) {
                response.headers_mut().insert("retry-after", value);
            }
            response
        }
        GovernorError::UnableToExtractKey => envelope_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Rate limit error",
            "Unable to determine request identity.",
        ),
        GovernorError::Other { code, msg, headers } => {
            let mut response = envelope_response(
                code,
                "Rate limit error",
                &msg.unwrap_or_else(|| "Rate limit error".to_string()),
            );
            if let Some(headers) = headers {
                response.headers_mut().extend(headers);
            }
            response
        }
    }
}

fn envelope_response(status: StatusCode, title: &str, message: &str) -> Response<Body> {
    ReturnResult::<()>::failed(status, title, message).into_response()
}
