use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct PasswordLoginRequest {
    #[validate(length(min = 1, message = "email is required"))]
    #[schema(example = "user@example.com")]
    pub email: String,

    #[validate(length(min = 1, message = "password is required"))]
    #[schema(example = "password123")]
    pub password: String,

    #[serde(alias = "captcha_token")]
    #[validate(length(min = 1, message = "captcha is required"))]
    pub captcha: String,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CodeCheckRequest {
    #[validate(length(min = 1, message = "email is required"))]
    #[schema(example = "user@example.com")]
    pub email: String,

    #[validate(length(min = 1, message = "code is required"))]
    #[schema(example = "123456")]
    pub code: String,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct RecoverySendRequest {
    #[validate(length(min = 1, message = "email is required"))]
    #[schema(example = "user@example.com")]
    pub email: String,

    #[serde(alias = "captcha_token")]
    #[validate(length(min = 1, message = "captcha is required"))]
    pub captcha: String,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct RecoveryCheckRequest {
    #[validate(length(min = 1, message = "email is required"))]
    #[schema(example = "user@example.com")]
    pub email: String,

    #[validate(length(min = 1, message = "code is required"))]
    #[schema(example = "4821")]
    pub code: String,

    #[validate(length(min = 8, message = "new_password must be at least 8 characters"))]
    #[schema(min_length = 8)]
    pub new_password: String,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct ParseTokenRequest {
    #[validate(length(min = 1, message = "token is required"))]
    pub token: String,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct WebauthnLoginStartRequest {
    #[validate(length(min = 1, message = "email is required"))]
    #[schema(example = "user@example.com")]
    pub email: String,

    #[serde(alias = "captcha_token")]
    #[validate(length(min = 1, message = "captcha is required"))]
    pub captcha: String,
}

/// Body of endpoints whose real payload travels in cookies.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct StatusResponse {
    #[schema(example = "ok")]
    pub status: String,
}

impl StatusResponse {
    pub fn ok() -> Self {
        Self {
            status: "ok".to_string(),
        }
    }
}
