use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts, HeaderMap},
    middleware::Next,
    response::Response,
};
use axum_extra::extract::cookie::CookieJar;
use service_core::error::AppError;
use std::sync::Arc;

use crate::{
    models::Caller, services::ServiceError, utils::cookies::ACCESS_COOKIE, AppState,
};

/// Access token from the `access` cookie, else from `Authorization: Bearer`.
pub fn access_token(headers: &HeaderMap) -> Option<String> {
    let jar = CookieJar::from_headers(headers);
    if let Some(cookie) = jar.get(ACCESS_COOKIE).filter(|c| !c.value().is_empty()) {
        return Some(cookie.value().to_string());
    }

    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(str::to_string)
}

/// Require a valid access token and attach the caller to the request.
///
/// Missing or expired tokens are 401; any other parse failure is 403.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = access_token(req.headers())
        .ok_or_else(|| AppError::Unauthorized(anyhow::anyhow!("unauthorized")))?;

    let claims = match state.auth.tokens().parse(&token) {
        Ok(claims) => claims,
        Err(ServiceError::TokenExpired) => {
            return Err(ServiceError::TokenExpired.into());
        }
        Err(e) => {
            tracing::debug!(error = %e, "Access token rejected");
            return Err(AppError::Forbidden(anyhow::anyhow!("forbidden")));
        }
    };

    req.extensions_mut()
        .insert(Arc::new(Caller::new(claims.sub, claims.roles)));
    Ok(next.run(req).await)
}

/// Caller attached by `auth_middleware`.
pub struct AuthUser(pub Arc<Caller>);

#[axum::async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Arc<Caller>>()
            .cloned()
            .map(AuthUser)
            .ok_or_else(|| AppError::Unauthorized(anyhow::anyhow!("unauthorized")))
    }
}
