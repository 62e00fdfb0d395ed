use axum::{extract::State, http::header, response::IntoResponse, Json};

use crate::{services::JsonWebKeySet, AppState};

/// Public keys that verify access tokens
#[utoipa::path(
    get,
    path = "/.well-known/jwks.json",
    responses(
        (status = 200, description = "Current verification keys", body = JsonWebKeySet)
    ),
    tag = "Well-Known"
)]
pub async fn jwks(State(state): State<AppState>) -> impl IntoResponse {
    let jwks: JsonWebKeySet = state.keys.snapshot().jwks();
    (
        [(header::CACHE_CONTROL, "public, max-age=300")],
        Json(jwks),
    )
}
