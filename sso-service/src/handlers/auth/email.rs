use axum::{extract::State, Json};
use axum_extra::extract::cookie::CookieJar;
use service_core::error::AppError;

use super::session_jar;
use crate::{
    dtos::auth::{CodeCheckRequest, PasswordLoginRequest, StatusResponse},
    middleware::ClientDevice,
    utils::ValidatedJson,
    AppState,
};

/// Check the password and mail a login code
#[utoipa::path(
    post,
    path = "/auth/email/send",
    request_body = PasswordLoginRequest,
    responses(
        (status = 200, description = "Code sent, session cookies set", body = StatusResponse),
        (status = 401, description = "Invalid credentials or captcha", body = ErrorResponse),
        (status = 404, description = "Unknown user", body = ErrorResponse)
    ),
    tag = "Authentication"
)]
#[tracing::instrument(skip_all, fields(email = %req.email))]
pub async fn send_code(
    State(state): State<AppState>,
    ClientDevice(device): ClientDevice,
    jar: CookieJar,
    ValidatedJson(req): ValidatedJson<PasswordLoginRequest>,
) -> Result<(CookieJar, Json<StatusResponse>), AppError> {
    let pair = state
        .auth
        .send_login_code(&req.email, &req.password, &req.captcha, &device)
        .await?;
    Ok((session_jar(&state, jar, &pair), Json(StatusResponse::ok())))
}

/// Log in with an emailed code
#[utoipa::path(
    post,
    path = "/auth/email/check",
    request_body = CodeCheckRequest,
    responses(
        (status = 200, description = "Session cookies set", body = StatusResponse),
        (status = 404, description = "Code is not valid", body = ErrorResponse)
    ),
    tag = "Authentication"
)]
#[tracing::instrument(skip_all, fields(email = %req.email))]
pub async fn check_code(
    State(state): State<AppState>,
    ClientDevice(device): ClientDevice,
    jar: CookieJar,
    ValidatedJson(req): ValidatedJson<CodeCheckRequest>,
) -> Result<(CookieJar, Json<StatusResponse>), AppError> {
    let pair = state
        .auth
        .check_login_code(&req.email, &req.code, &device)
        .await?;
    Ok((session_jar(&state, jar, &pair), Json(StatusResponse::ok())))
}
