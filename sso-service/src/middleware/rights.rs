use axum::{
    extract::{Path, Request, State},
    middleware::Next,
    response::Response,
};
use service_core::error::AppError;
use std::sync::Arc;

use crate::{models::Caller, AppState};

/// Gate `/device/:id` mutations. Runs after `auth_middleware`.
pub async fn device_rights_middleware(
    State(state): State<AppState>,
    path: Option<Path<String>>,
    req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let device_id = path
        .map(|Path(id)| id)
        .filter(|id| !id.is_empty())
        .ok_or_else(|| AppError::BadRequest(anyhow::anyhow!("device id is required")))?;

    let caller = req
        .extensions()
        .get::<Arc<Caller>>()
        .cloned()
        .ok_or_else(|| AppError::Unauthorized(anyhow::anyhow!("unauthorized")))?;

    state.rights.authorize_device(&caller, &device_id).await?;
    Ok(next.run(req).await)
}
