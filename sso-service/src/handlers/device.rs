use axum::{
    extract::{Path, State},
    Json,
};
use service_core::error::AppError;

use crate::{
    dtos::{auth::StatusResponse, device::RenameDeviceRequest},
    middleware::AuthUser,
    models::Device,
    services::ServiceError,
    utils::ValidatedJson,
    AppState,
};

/// Devices the caller has logged in from
#[utoipa::path(
    get,
    path = "/device",
    responses(
        (status = 200, description = "Caller's devices", body = [Device]),
        (status = 401, description = "Not authenticated", body = ErrorResponse)
    ),
    tag = "Device",
    security(("bearer_auth" = []))
)]
pub async fn list_devices(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
) -> Result<Json<Vec<Device>>, AppError> {
    Ok(Json(state.store.list_devices(caller.uid).await?))
}

/// One of the caller's devices
#[utoipa::path(
    get,
    path = "/device/{id}",
    params(("id" = String, Path, description = "Device id")),
    responses(
        (status = 200, description = "Device", body = Device),
        (status = 404, description = "No such device for this caller", body = ErrorResponse)
    ),
    tag = "Device",
    security(("bearer_auth" = []))
)]
pub async fn get_device(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
    Path(id): Path<String>,
) -> Result<Json<Device>, AppError> {
    let device = state
        .store
        .find_device(&id)
        .await?
        .filter(|d| d.user_id == caller.uid)
        .ok_or(ServiceError::NotFound)?;
    Ok(Json(device))
}

/// Rename a device
#[utoipa::path(
    put,
    path = "/device/{id}",
    params(("id" = String, Path, description = "Device id")),
    request_body = RenameDeviceRequest,
    responses(
        (status = 200, description = "Updated device", body = Device),
        (status = 403, description = "Not the owner", body = ErrorResponse),
        (status = 404, description = "No such device", body = ErrorResponse)
    ),
    tag = "Device",
    security(("bearer_auth" = []))
)]
pub async fn rename_device(
    State(state): State<AppState>,
    Path(id): Path<String>,
    ValidatedJson(req): ValidatedJson<RenameDeviceRequest>,
) -> Result<Json<Device>, AppError> {
    let device = state
        .store
        .rename_device(&id, req.name.trim())
        .await?
        .ok_or(ServiceError::NotFound)?;
    Ok(Json(device))
}

/// Forget a device. Refresh tokens bound to it stop working.
#[utoipa::path(
    delete,
    path = "/device/{id}",
    params(("id" = String, Path, description = "Device id")),
    responses(
        (status = 200, description = "Device removed", body = StatusResponse),
        (status = 403, description = "Not the owner", body = ErrorResponse),
        (status = 404, description = "No such device", body = ErrorResponse)
    ),
    tag = "Device",
    security(("bearer_auth" = []))
)]
pub async fn delete_device(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
    Path(id): Path<String>,
) -> Result<Json<StatusResponse>, AppError> {
    if !state.store.delete_device(&id).await? {
        return Err(ServiceError::NotFound.into());
    }
    tracing::info!(user_id = %caller.uid, device_id = %id, "Device removed");
    Ok(Json(StatusResponse::ok()))
}
