use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Message surfaced for every internal failure. Causes stay in the logs.
pub const INTERNAL_ERROR_MESSAGE: &str = "internal error";

/// Classification of a failure, independent of where it was raised.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    BadRequest,
    Unauthorized,
    Forbidden,
    NotFound,
    Conflict,
    Internal,
}

impl ErrorKind {
    pub fn status(self) -> StatusCode {
        match self {
            ErrorKind::BadRequest => StatusCode::BAD_REQUEST,
            ErrorKind::Unauthorized => StatusCode::UNAUTHORIZED,
            ErrorKind::Forbidden => StatusCode::FORBIDDEN,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Conflict => StatusCode::CONFLICT,
            ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Error envelope written for every failed request.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub errors: Vec<String>,
}

impl ErrorResponse {
    pub fn single(message: impl Into<String>) -> Self {
        Self {
            errors: vec![message.into()],
        }
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation error: {0}")]
    ValidationError(#[from] validator::ValidationErrors),

    #[error("{0}")]
    BadRequest(anyhow::Error),

    #[error("{0}")]
    Unauthorized(anyhow::Error),

    #[error("{0}")]
    Forbidden(anyhow::Error),

    #[error("{0}")]
    NotFound(anyhow::Error),

    #[error("{0}")]
    Conflict(anyhow::Error),

    #[error("Internal server error: {0}")]
    InternalError(#[from] anyhow::Error),

    #[error("Database error: {0}")]
    DatabaseError(anyhow::Error),

    #[error("Redis error: {0}")]
    RedisError(#[from] redis::RedisError),

    #[error("Configuration error: {0}")]
    ConfigError(anyhow::Error),
}

impl AppError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::ValidationError(_) | AppError::BadRequest(_) => ErrorKind::BadRequest,
            AppError::Unauthorized(_) => ErrorKind::Unauthorized,
            AppError::Forbidden(_) => ErrorKind::Forbidden,
            AppError::NotFound(_) => ErrorKind::NotFound,
            AppError::Conflict(_) => ErrorKind::Conflict,
            AppError::InternalError(_)
            | AppError::DatabaseError(_)
            | AppError::RedisError(_)
            | AppError::ConfigError(_) => ErrorKind::Internal,
        }
    }

    /// Messages safe to show a client.
    pub fn public_messages(&self) -> Vec<String> {
        match self {
            AppError::ValidationError(errors) => {
                let mut messages: Vec<String> = errors
                    .field_errors()
                    .into_iter()
                    .flat_map(|(field, errs)| {
                        errs.iter().map(move |e| match &e.message {
                            Some(msg) => msg.to_string(),
                            None => format!("{} is invalid", field),
                        })
                    })
                    .collect();
                messages.sort();
                if messages.is_empty() {
                    messages.push("validation failed".to_string());
                }
                messages
            }
            AppError::BadRequest(err)
            | AppError::Unauthorized(err)
            | AppError::Forbidden(err)
            | AppError::NotFound(err)
            | AppError::Conflict(err) => vec![err.to_string()],
            _ => vec![INTERNAL_ERROR_MESSAGE.to_string()],
        }
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::ConfigError(anyhow::Error::new(err))
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::InternalError(anyhow::Error::new(err))
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::RowNotFound => AppError::NotFound(anyhow::anyhow!("not found")),
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                AppError::Conflict(anyhow::anyhow!("already exists"))
            }
            _ => AppError::DatabaseError(anyhow::Error::new(err)),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for AppError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        AppError::DatabaseError(anyhow::Error::new(err))
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let kind = self.kind();
        if kind == ErrorKind::Internal {
            tracing::error!(error = ?self, "Request failed with internal error");
        } else {
            tracing::debug!(error = %self, status = %kind.status(), "Request rejected");
        }

        let body = ErrorResponse {
            errors: self.public_messages(),
        };
        (kind.status(), Json(body)).into_response()
    }
}
