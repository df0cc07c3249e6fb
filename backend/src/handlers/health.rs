use axum::extract::State;

use crate::{error::AppError, models::envelope::ReturnResult, state::AppState};

pub async fn liveness() -> &'static str {
    "service is running."
}

pub async fn database(State(state): State<AppState>) -> Result<ReturnResult<()>, AppError> {
    state.store.ping().await.map_err(|err| {
        tracing::error!(error = %err, "Database health check failed");
        AppError::InternalServerError(anyhow::anyhow!("database unreachable"))
    })?;
    Ok(ReturnResult::message("Database connection is healthy"))
}
