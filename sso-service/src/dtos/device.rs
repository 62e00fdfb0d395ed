use serde::Deserialize;
use utoipa::ToSchema;
use validator::Validate;

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct RenameDeviceRequest {
    #[validate(length(min = 1, max = 64, message = "name must be 1 to 64 characters"))]
    #[schema(example = "Work laptop")]
    pub name: String,
}
