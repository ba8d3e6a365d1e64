//! services/api/src/error.rs
//!
//! Defines the error types for the API service: `ApiError` for startup failures and
//! `PipelineError` for everything a stage request can fail with.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use blog_pipeline_core::{
    gateway::{GatewayError, ParseFailure},
    ports::PortError,
    rate_limit::RateLimitExceeded,
    stage::StageViolation,
    url_guard::UrlRejection,
};
use tracing::error;

use crate::config::ConfigError;

/// Body returned for every failure whose detail must stay server-side.
pub const GENERIC_ERROR_MESSAGE: &str = "An internal error occurred.";

/// The primary error type for starting the `api` service.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Represents an error that occurred during configuration loading.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Represents an error that propagated up from one of the core service ports.
    #[error("Service Port Error: {0}")]
    Port(#[from] PortError),

    /// Represents an error from the underlying database library.
    #[error("Database Error: {0}")]
    Database(#[from] sqlx::Error),

    /// Represents a failure while applying the schema migrations.
    #[error("Migration Error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// Represents a standard Input/Output error (e.g., binding to a network socket).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A catch-all for any other unexpected errors.
    #[error("An unexpected internal error occurred: {0}")]
    Internal(String),
}

/// Everything a pipeline request can fail with.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Missing, expired, or non-user token.
    #[error("{0}")]
    Auth(String),
    #[error(transparent)]
    RateLimit(#[from] RateLimitExceeded),
    /// Missing field, malformed URL, or a precondition the caller can fix.
    #[error("validation failed: {0}")]
    Validation(String),
    /// Upstream non-2xx or transport failure.
    #[error("provider failed: {0}")]
    Provider(String),
    #[error(transparent)]
    Parse(#[from] ParseFailure),
    #[error(transparent)]
    Stage(#[from] StageViolation),
    /// A concurrent invocation won the stage claim.
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("store failed: {0}")]
    Store(String),
}

impl PipelineError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::Auth(_) => StatusCode::UNAUTHORIZED,
            Self::RateLimit(_) => StatusCode::TOO_MANY_REQUESTS,
            Self::Validation(_) | Self::Provider(_) | Self::Parse(_) => StatusCode::BAD_REQUEST,
            Self::Stage(_) | Self::Conflict(_) => StatusCode::CONFLICT,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// The message that is safe to put in a response body.
    pub fn public_message(&self) -> String {
        match self {
            Self::Auth(_) | Self::RateLimit(_) | Self::Stage(_) | Self::Conflict(_) => {
                self.to_string()
            }
            _ => GENERIC_ERROR_MESSAGE.to_string(),
        }
    }
}

impl From<PortError> for PipelineError {
    fn from(e: PortError) -> Self {
        match e {
            PortError::NotFound(what) => Self::NotFound(what),
            PortError::Conflict(what) => Self::Conflict(what),
            PortError::Unauthorized(why) => Self::Auth(why),
            PortError::Unexpected(why) => Self::Store(why),
        }
    }
}

impl From<GatewayError> for PipelineError {
    fn from(e: GatewayError) -> Self {
        match e {
            GatewayError::Provider(source) => Self::Provider(source.to_string()),
            GatewayError::Parse(failure) => Self::Parse(failure),
        }
    }
}

impl From<UrlRejection> for PipelineError {
    fn from(e: UrlRejection) -> Self {
        Self::Validation(e.to_string())
    }
}

impl IntoResponse for PipelineError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = self.public_message();
        if message == GENERIC_ERROR_MESSAGE {
            error!(status = status.as_u16(), "request failed: {}", self);
        }
        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}
