use axum::{extract::State, Json};
use service_core::error::AppError;

use crate::{
    dtos::user::{UserExistsRequest, UserExistsResponse},
    middleware::AuthUser,
    models::UserResponse,
    services::ServiceError,
    utils::ValidatedJson,
    AppState,
};

/// Whether an account exists for the email
#[utoipa::path(
    post,
    path = "/users/exists",
    request_body = UserExistsRequest,
    responses(
        (status = 200, description = "Lookup result", body = UserExistsResponse),
        (status = 400, description = "Invalid email", body = ErrorResponse)
    ),
    tag = "User"
)]
pub async fn user_exists(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<UserExistsRequest>,
) -> Result<Json<UserExistsResponse>, AppError> {
    let exists = state.store.find_user_by_email(&req.email).await?.is_some();
    Ok(Json(UserExistsResponse { exists }))
}

/// The caller's profile
#[utoipa::path(
    get,
    path = "/users/me",
    responses(
        (status = 200, description = "Profile with role names", body = UserResponse),
        (status = 401, description = "Not authenticated", body = ErrorResponse),
        (status = 404, description = "Account no longer exists", body = ErrorResponse)
    ),
    tag = "User",
    security(("bearer_auth" = []))
)]
pub async fn get_me(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
) -> Result<Json<UserResponse>, AppError> {
    let user = state
        .store
        .find_user_by_id(caller.uid)
        .await?
        .ok_or(ServiceError::NotFound)?;
    Ok(Json(user.sanitized()))
}
