use service_core::error::AppError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Database error: {0}")]
    Database(anyhow::Error),

    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),

    #[error("not found")]
    NotFound,

    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("CAPTCHA verification failed")]
    CaptchaVerificationFailed,

    #[error("CAPTCHA validation failed")]
    CaptchaInvalid,

    #[error("code is not valid")]
    CodeNotValid,

    #[error("token revoked")]
    TokenRevoked,

    #[error("token expired")]
    TokenExpired,

    #[error("token invalid")]
    TokenInvalid,

    #[error("signing key not found")]
    KeyNotFound,

    #[error("device does not match")]
    DeviceMismatch,

    #[error("forbidden")]
    Forbidden,

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    BadRequest(String),
}

impl From<AppError> for ServiceError {
    fn from(err: AppError) -> Self {
        match err {
            AppError::NotFound(_) => ServiceError::NotFound,
            AppError::Conflict(e) => ServiceError::Conflict(e.to_string()),
            AppError::RedisError(e) => ServiceError::Redis(e),
            AppError::DatabaseError(e) => ServiceError::Database(e),
            other => ServiceError::Internal(anyhow::anyhow!(other.to_string())),
        }
    }
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Database(e) => AppError::DatabaseError(e),
            ServiceError::Redis(e) => AppError::RedisError(e),
            ServiceError::Internal(e) => AppError::InternalError(e),
            ServiceError::CaptchaVerificationFailed => {
                AppError::InternalError(anyhow::anyhow!("CAPTCHA verification failed"))
            }
            ServiceError::NotFound | ServiceError::CodeNotValid | ServiceError::KeyNotFound => {
                AppError::NotFound(anyhow::anyhow!(err.to_string()))
            }
            ServiceError::InvalidCredentials | ServiceError::DeviceMismatch => {
                AppError::Unauthorized(anyhow::anyhow!("invalid credentials"))
            }
            ServiceError::CaptchaInvalid
            | ServiceError::TokenRevoked
            | ServiceError::TokenExpired
            | ServiceError::TokenInvalid => AppError::Unauthorized(anyhow::anyhow!(err.to_string())),
            ServiceError::Forbidden => AppError::Forbidden(anyhow::anyhow!("forbidden")),
            ServiceError::Conflict(msg) => AppError::Conflict(anyhow::anyhow!(msg)),
            ServiceError::BadRequest(msg) => AppError::BadRequest(anyhow::anyhow!(msg)),
        }
    }
}
