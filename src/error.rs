use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Too many in-flight pipelines")]
    Busy,

    #[error("Service is shutting down")]
    ShuttingDown,

    #[error("Pipeline {request_id} failed: {source}")]
    PipelineFailed {
        request_id: String,
        #[source]
        source: PipelineError,
    },

    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error("Internal server error: {0}")]
    Internal(String),
}

/// Failure taxonomy of a write-operation pipeline.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PipelineError {
    /// Missing or invalid setting. Fatal, never retried.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Node unreachable or timed out.
    #[error("Network error: {0}")]
    Network(String),

    /// The write call was rejected by the node or the contract.
    #[error("Submission error: {0}")]
    Submission(String),

    /// Transient failure while polling for confirmations.
    #[error("Poll error: {0}")]
    Poll(String),
}

impl PipelineError {
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::Configuration(_) => "configuration",
            PipelineError::Network(_) => "network",
            PipelineError::Submission(_) => "rejected",
            PipelineError::Poll(_) => "poll",
        }
    }
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: ErrorDetail,
}

#[derive(Serialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let mut details = None;
        let (status, code, message) = match self {
            AppError::Database(ref e) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "DATABASE_ERROR",
                e.to_string(),
            ),
            AppError::Redis(ref e) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "STORE_ERROR",
                e.to_string(),
            ),
            AppError::NotFound(ref msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg.clone()),
            AppError::BadRequest(ref msg) => {
                (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone())
            }
            AppError::Busy => (
                StatusCode::TOO_MANY_REQUESTS,
                "TOO_MANY_PIPELINES",
                "Too many write operations in flight. Please try again later.".to_string(),
            ),
            AppError::ShuttingDown => (
                StatusCode::SERVICE_UNAVAILABLE,
                "SHUTTING_DOWN",
                "Service is shutting down".to_string(),
            ),
            AppError::PipelineFailed {
                ref request_id,
                ref source,
            } => {
                details = Some(serde_json::json!({
                    "requestId": request_id,
                    "errorKind": source.kind(),
                }));
                (StatusCode::BAD_GATEWAY, "PIPELINE_FAILED", source.to_string())
            }
            AppError::Pipeline(PipelineError::Configuration(ref msg)) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "CONFIGURATION_ERROR",
                msg.clone(),
            ),
            AppError::Pipeline(ref e) => {
                (StatusCode::BAD_GATEWAY, "CHAIN_ERROR", e.to_string())
            }
            _ => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                self.to_string(),
            ),
        };

        let body = Json(ErrorResponse {
            success: false,
            error: ErrorDetail {
                code: code.to_string(),
                message,
                details,
            },
        });

        (status, body).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
