use axum::extract::{Extension, Path, State};
use validator::Validate;

use crate::{
    error::AppError,
    handlers::{actor_of, AppJson},
    models::{
        envelope::ReturnResult,
        permission::{PermissionChangeSummary, PermissionDescriptor, SavePermissionsRequest},
        security::ClientInfo,
    },
    state::AppState,
    types::RoleId,
    utils::jwt::Claims,
};

pub async fn list_registered(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    client: ClientInfo,
) -> Result<ReturnResult<Vec<PermissionDescriptor>>, AppError> {
    let service = state.permission_service();
    service
        .authorize(&actor_of(&claims)?, "permissions.list", &client)
        .await?;
    Ok(ReturnResult::success(service.registered()))
}

pub async fn save(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    client: ClientInfo,
    AppJson(payload): AppJson<SavePermissionsRequest>,
) -> Result<ReturnResult<PermissionChangeSummary>, AppError> {
    payload.validate()?;
    let actor = actor_of(&claims)?;
    let service = state.permission_service();
    service
        .authorize(&actor, "permissions.save", &client)
        .await?;
    let summary = service
        .save(&actor, RoleId(payload.role_id), &payload.permissions, &client)
        .await?;
    Ok(ReturnResult::success(summary))
}

pub async fn role_permissions(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    client: ClientInfo,
    Path(role_id): Path<i32>,
) -> Result<ReturnResult<Vec<String>>, AppError> {
    let service = state.permission_service();
    service
        .authorize(&actor_of(&claims)?, "permissions.role", &client)
        .await?;
    let paths = service.role_permissions(RoleId(role_id)).await?;
    Ok(ReturnResult::success(paths))
}

pub async fn own_permissions(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<ReturnResult<Vec<String>>, AppError> {
    let actor = actor_of(&claims)?;
    let paths = state.permission_service().own_permissions(&actor).await?;
    Ok(ReturnResult::success(paths))
}
