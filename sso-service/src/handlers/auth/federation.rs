use axum::{
    extract::{Path, Query, State},
    response::Redirect,
    Form,
};
use axum_extra::extract::cookie::CookieJar;
use service_core::error::AppError;

use super::session_jar;
use crate::{
    middleware::ClientDevice,
    services::{CallbackParams, Protocol},
    AppState,
};

async fn start(state: &AppState, protocol: Protocol, provider: &str) -> Result<Redirect, AppError> {
    let url = state.auth.federation_start(protocol, provider).await?;
    Ok(Redirect::temporary(&url))
}

async fn callback(
    state: &AppState,
    protocol: Protocol,
    provider: &str,
    params: &CallbackParams,
    device: &crate::models::DeviceFingerprint,
    jar: CookieJar,
) -> Result<(CookieJar, Redirect), AppError> {
    let (pair, success_url) = state
        .auth
        .federation_callback(protocol, provider, params, device)
        .await?;
    Ok((
        session_jar(state, jar, &pair),
        Redirect::temporary(&success_url),
    ))
}

/// Redirect to the provider's OAuth2 consent page
#[utoipa::path(
    get,
    path = "/auth/oauth2/{provider}/start",
    params(("provider" = String, Path, description = "Provider name, e.g. google or github")),
    responses(
        (status = 307, description = "Redirect to provider"),
        (status = 404, description = "Unknown provider", body = ErrorResponse)
    ),
    tag = "Federation"
)]
pub async fn oauth2_start(
    State(state): State<AppState>,
    Path(provider): Path<String>,
) -> Result<Redirect, AppError> {
    start(&state, Protocol::OAuth2, &provider).await
}

/// OAuth2 redirect target
#[utoipa::path(
    get,
    path = "/auth/oauth2/{provider}/callback",
    params(
        ("provider" = String, Path, description = "Provider name"),
        ("code" = Option<String>, Query, description = "Authorization code"),
        ("state" = Option<String>, Query, description = "State issued by start")
    ),
    responses(
        (status = 307, description = "Redirect to the success URL with session cookies"),
        (status = 401, description = "Provider denied the login", body = ErrorResponse),
        (status = 404, description = "Unknown provider or state", body = ErrorResponse)
    ),
    tag = "Federation"
)]
#[tracing::instrument(skip_all, fields(provider = %provider))]
pub async fn oauth2_callback(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    ClientDevice(device): ClientDevice,
    jar: CookieJar,
    Query(params): Query<CallbackParams>,
) -> Result<(CookieJar, Redirect), AppError> {
    callback(&state, Protocol::OAuth2, &provider, &params, &device, jar).await
}

/// Redirect to the provider's OpenID Connect consent page
#[utoipa::path(
    get,
    path = "/auth/oidc/{provider}/start",
    params(("provider" = String, Path, description = "Provider name")),
    responses(
        (status = 307, description = "Redirect to provider"),
        (status = 404, description = "Unknown provider", body = ErrorResponse)
    ),
    tag = "Federation"
)]
pub async fn oidc_start(
    State(state): State<AppState>,
    Path(provider): Path<String>,
) -> Result<Redirect, AppError> {
    start(&state, Protocol::Oidc, &provider).await
}

/// OpenID Connect redirect target (query response mode)
#[utoipa::path(
    get,
    path = "/auth/oidc/{provider}/callback",
    params(
        ("provider" = String, Path, description = "Provider name"),
        ("code" = Option<String>, Query, description = "Authorization code"),
        ("state" = Option<String>, Query, description = "State issued by start")
    ),
    responses(
        (status = 307, description = "Redirect to the success URL with session cookies"),
        (status = 401, description = "Provider denied the login or ID token rejected", body = ErrorResponse),
        (status = 404, description = "Unknown provider or state", body = ErrorResponse)
    ),
    tag = "Federation"
)]
#[tracing::instrument(skip_all, fields(provider = %provider))]
pub async fn oidc_callback(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    ClientDevice(device): ClientDevice,
    jar: CookieJar,
    Query(params): Query<CallbackParams>,
) -> Result<(CookieJar, Redirect), AppError> {
    callback(&state, Protocol::Oidc, &provider, &params, &device, jar).await
}

/// OpenID Connect redirect target (form_post response mode)
#[tracing::instrument(skip_all, fields(provider = %provider))]
pub async fn oidc_callback_form(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    ClientDevice(device): ClientDevice,
    jar: CookieJar,
    Form(params): Form<CallbackParams>,
) -> Result<(CookieJar, Redirect), AppError> {
    callback(&state, Protocol::Oidc, &provider, &params, &device, jar).await
}
