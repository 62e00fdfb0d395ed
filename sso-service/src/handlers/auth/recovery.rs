use axum::{extract::State, Json};
use service_core::error::AppError;

use crate::{
    dtos::auth::{RecoveryCheckRequest, RecoverySendRequest, StatusResponse},
    utils::ValidatedJson,
    AppState,
};

/// Mail a password recovery code
#[utoipa::path(
    post,
    path = "/auth/recovery/send",
    request_body = RecoverySendRequest,
    responses(
        (status = 200, description = "Code sent", body = StatusResponse),
        (status = 401, description = "Captcha rejected", body = ErrorResponse),
        (status = 404, description = "Unknown user", body = ErrorResponse)
    ),
    tag = "Recovery"
)]
#[tracing::instrument(skip_all, fields(email = %req.email))]
pub async fn send_code(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<RecoverySendRequest>,
) -> Result<Json<StatusResponse>, AppError> {
    state.auth.send_recovery_code(&req.email, &req.captcha).await?;
    Ok(Json(StatusResponse::ok()))
}

/// Set a new password with a recovery code
#[utoipa::path(
    post,
    path = "/auth/recovery/check",
    request_body = RecoveryCheckRequest,
    responses(
        (status = 200, description = "Password replaced, sessions revoked", body = StatusResponse),
        (status = 404, description = "Code is not valid", body = ErrorResponse)
    ),
    tag = "Recovery"
)]
#[tracing::instrument(skip_all, fields(email = %req.email))]
pub async fn check_code(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<RecoveryCheckRequest>,
) -> Result<Json<StatusResponse>, AppError> {
    state
        .auth
        .check_recovery_code(&req.email, &req.code, &req.new_password)
        .await?;
    Ok(Json(StatusResponse::ok()))
}
