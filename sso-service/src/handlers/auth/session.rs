use axum::{extract::State, Json};
use axum_extra::extract::cookie::CookieJar;
use service_core::error::AppError;

use super::session_jar;
use crate::{
    dtos::auth::{ParseTokenRequest, PasswordLoginRequest, StatusResponse},
    middleware::{AuthUser, ClientDevice},
    services::{AccessTokenClaims, ServiceError},
    utils::{cookies, ValidatedJson},
    AppState,
};

/// Log in with email and password
#[utoipa::path(
    post,
    path = "/auth/jwt",
    request_body = PasswordLoginRequest,
    responses(
        (status = 200, description = "Session cookies set", body = StatusResponse),
        (status = 400, description = "Malformed body or no device info", body = ErrorResponse),
        (status = 401, description = "Invalid credentials or captcha", body = ErrorResponse),
        (status = 404, description = "Unknown user", body = ErrorResponse),
        (status = 500, description = "Internal error", body = ErrorResponse)
    ),
    tag = "Authentication"
)]
#[tracing::instrument(skip_all, fields(email = %req.email))]
pub async fn login(
    State(state): State<AppState>,
    ClientDevice(device): ClientDevice,
    jar: CookieJar,
    ValidatedJson(req): ValidatedJson<PasswordLoginRequest>,
) -> Result<(CookieJar, Json<StatusResponse>), AppError> {
    let pair = state
        .auth
        .password_login(&req.email, &req.password, &req.captcha, &device)
        .await?;
    Ok((session_jar(&state, jar, &pair), Json(StatusResponse::ok())))
}

/// Exchange the refresh cookie for a new session
#[utoipa::path(
    post,
    path = "/auth/jwt/refresh",
    responses(
        (status = 200, description = "Session cookies reset", body = StatusResponse),
        (status = 401, description = "Refresh token revoked, expired or bound elsewhere", body = ErrorResponse)
    ),
    tag = "Authentication"
)]
pub async fn refresh(
    State(state): State<AppState>,
    ClientDevice(device): ClientDevice,
    jar: CookieJar,
) -> Result<(CookieJar, Json<StatusResponse>), AppError> {
    let token = jar
        .get(cookies::REFRESH_COOKIE)
        .map(|c| c.value().to_string())
        .filter(|v| !v.is_empty())
        .ok_or(ServiceError::TokenInvalid)?;

    let pair = state.auth.refresh(&token, &device).await?;
    Ok((session_jar(&state, jar, &pair), Json(StatusResponse::ok())))
}

/// Verify an access token and return its claims
#[utoipa::path(
    post,
    path = "/auth/jwt/parse",
    request_body = ParseTokenRequest,
    responses(
        (status = 200, description = "Token is valid", body = AccessTokenClaims),
        (status = 401, description = "Token invalid or expired", body = ErrorResponse),
        (status = 404, description = "Signing key not found", body = ErrorResponse)
    ),
    tag = "Authentication"
)]
pub async fn parse(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<ParseTokenRequest>,
) -> Result<Json<AccessTokenClaims>, AppError> {
    Ok(Json(state.auth.tokens().parse(&req.token)?))
}

/// Revoke every session of the caller and clear the cookies
#[utoipa::path(
    post,
    path = "/auth/logout",
    responses(
        (status = 200, description = "Logged out", body = StatusResponse),
        (status = 401, description = "Not authenticated", body = ErrorResponse)
    ),
    tag = "Authentication",
    security(("bearer_auth" = []))
)]
pub async fn logout(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
    jar: CookieJar,
) -> Result<(CookieJar, Json<StatusResponse>), AppError> {
    state.auth.logout(caller.uid).await?;
    tracing::info!(user_id = %caller.uid, "Logged out");
    Ok((cookies::cleared(jar), Json(StatusResponse::ok())))
}
