use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::workflow::Stage;

/// Failures of the raw key/value namespace.
/// Never surfaced to end users: the cache layer downgrades these to "absent".
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Storage quota exceeded ({used} of {quota} bytes)")]
    QuotaExceeded { used: usize, quota: usize },

    #[error("Storage lock poisoned")]
    Poisoned,
}

/// Failures talking to the analysis/rewrite backend.
#[derive(Debug, Error)]
pub enum BoundaryError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Backend error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Backend reported a failure: {0}")]
    Rejected(String),

    #[error("Backend returned an empty response")]
    EmptyResponse,
}

impl BoundaryError {
    /// Transport failures, rate limits and 5xx responses are worth another try.
    pub fn is_retryable(&self) -> bool {
        match self {
            BoundaryError::Http(_) | BoundaryError::Rejected(_) | BoundaryError::EmptyResponse => {
                true
            }
            BoundaryError::Api { status, .. } => *status == 429 || *status >= 500,
            BoundaryError::Parse(_) => false,
        }
    }
}

/// Failures of the pipeline driver. Every variant has a safe fallback:
/// either retry the same step or restart from the upload page.
#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("No {stage} run found for id '{id}'; start over")]
    RunMissing { stage: Stage, id: String },

    #[error("A request is already in flight")]
    Busy,

    #[error("No uploaded resume is available; upload it again")]
    DocumentMissing,

    #[error("A target role is required to optimize")]
    MissingTargetRole,

    #[error(transparent)]
    Boundary(#[from] BoundaryError),
}

impl WorkflowError {
    /// True when the caller must send the user back to the beginning.
    pub fn is_restart(&self) -> bool {
        matches!(
            self,
            WorkflowError::RunMissing { .. } | WorkflowError::DocumentMissing
        )
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            WorkflowError::Busy => true,
            WorkflowError::Boundary(e) => e.is_retryable(),
            _ => false,
        }
    }
}

/// HTTP-level error for the proxy routes.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Backend error: {0}")]
    Backend(#[from] BoundaryError),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error, details) = match &self {
            AppError::Validation(msg) => (
                StatusCode::BAD_REQUEST,
                "invalid request".to_string(),
                msg.clone(),
            ),
            AppError::Backend(BoundaryError::Api { status, message }) => {
                tracing::error!("Backend returned {status}: {message}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "backend returned an error".to_string(),
                    message.clone(),
                )
            }
            AppError::Backend(e) => {
                tracing::error!("Backend error: {e}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    e.to_string(),
                    String::new(),
                )
            }
            AppError::Internal(e) => {
                tracing::error!("Internal error: {e:?}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal error".to_string(),
                    e.to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": error,
            "details": details
        }));

        (status, body).into_response()
    }
}
