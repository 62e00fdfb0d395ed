pub mod auth;
pub mod device;
pub mod user;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Documentation mirror of the error envelope every failure is written with.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    #[schema(example = json!(["not found"]))]
    pub errors: Vec<String>,
}
