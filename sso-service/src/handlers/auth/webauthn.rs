use axum::{extract::State, http::HeaderMap, Json};
use axum_extra::extract::cookie::CookieJar;
use service_core::error::AppError;
use webauthn_rs::prelude::{
    CreationChallengeResponse, PublicKeyCredential, RegisterPublicKeyCredential,
    RequestChallengeResponse,
};

use super::session_jar;
use crate::{
    dtos::auth::{StatusResponse, WebauthnLoginStartRequest},
    middleware::{AuthUser, ClientDevice},
    utils::{JsonBody, ValidatedJson},
    AppState,
};

pub const USER_EMAIL_HEADER: &str = "x-user-email";

/// Begin passkey registration for the caller
#[utoipa::path(
    post,
    path = "/auth/webauthn/register/start",
    responses(
        (status = 200, description = "Registration challenge"),
        (status = 401, description = "Not authenticated", body = ErrorResponse)
    ),
    tag = "WebAuthn",
    security(("bearer_auth" = []))
)]
pub async fn register_start(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
) -> Result<Json<CreationChallengeResponse>, AppError> {
    Ok(Json(state.auth.webauthn_register_start(caller.uid).await?))
}

/// Finish passkey registration
#[utoipa::path(
    post,
    path = "/auth/webauthn/register/finish",
    responses(
        (status = 200, description = "Passkey stored", body = StatusResponse),
        (status = 401, description = "Attestation rejected", body = ErrorResponse),
        (status = 404, description = "No pending registration", body = ErrorResponse)
    ),
    tag = "WebAuthn",
    security(("bearer_auth" = []))
)]
pub async fn register_finish(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
    JsonBody(credential): JsonBody<RegisterPublicKeyCredential>,
) -> Result<Json<StatusResponse>, AppError> {
    state
        .auth
        .webauthn_register_finish(caller.uid, &credential)
        .await?;
    Ok(Json(StatusResponse::ok()))
}

/// Begin passkey login
#[utoipa::path(
    post,
    path = "/auth/webauthn/login/start",
    request_body = WebauthnLoginStartRequest,
    responses(
        (status = 200, description = "Assertion challenge"),
        (status = 401, description = "Captcha rejected", body = ErrorResponse),
        (status = 404, description = "Unknown user or no passkeys", body = ErrorResponse)
    ),
    tag = "WebAuthn"
)]
#[tracing::instrument(skip_all, fields(email = %req.email))]
pub async fn login_start(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<WebauthnLoginStartRequest>,
) -> Result<Json<RequestChallengeResponse>, AppError> {
    Ok(Json(
        state
            .auth
            .webauthn_login_start(&req.email, &req.captcha)
            .await?,
    ))
}

/// Finish passkey login. The email travels in `X-User-Email`.
#[utoipa::path(
    post,
    path = "/auth/webauthn/login/finish",
    params(("X-User-Email" = String, Header, description = "Email the ceremony was started for")),
    responses(
        (status = 200, description = "Session cookies set", body = StatusResponse),
        (status = 400, description = "Missing email header", body = ErrorResponse),
        (status = 401, description = "Assertion rejected", body = ErrorResponse),
        (status = 404, description = "No pending assertion", body = ErrorResponse)
    ),
    tag = "WebAuthn"
)]
pub async fn login_finish(
    State(state): State<AppState>,
    ClientDevice(device): ClientDevice,
    headers: HeaderMap,
    jar: CookieJar,
    JsonBody(credential): JsonBody<PublicKeyCredential>,
) -> Result<(CookieJar, Json<StatusResponse>), AppError> {
    let email = headers
        .get(USER_EMAIL_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| AppError::BadRequest(anyhow::anyhow!("X-User-Email header is required")))?;

    let pair = state
        .auth
        .webauthn_login_finish(email, &credential, &device)
        .await?;
    Ok((session_jar(&state, jar, &pair), Json(StatusResponse::ok())))
}
