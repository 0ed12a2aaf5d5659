//! Error types for the gateway surface.

use admission_gate::RejectReason;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use flow_core::{FlowError, ValidationIssue};
use serde_json::json;
use thiserror::Error;
use tracing::error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Everything an AI route can answer with besides a flow output.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{}", .0.message())]
    Rejected(RejectReason),

    #[error("Invalid request")]
    InvalidInput(Vec<ValidationIssue>),

    #[error("Unknown AI capability: {0}")]
    UnknownCapability(String),

    #[error("Internal server error")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Rejected(reason) => StatusCode::from_u16(reason.http_status())
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            ApiError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            ApiError::UnknownCapability(_) => StatusCode::NOT_FOUND,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<FlowError> for ApiError {
    fn from(err: FlowError) -> Self {
        match err {
            FlowError::InvalidInput(issues) => ApiError::InvalidInput(issues),
            FlowError::UnknownFlow(name) => ApiError::UnknownCapability(name),
            FlowError::Encode(detail) => ApiError::Internal(detail),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match &self {
            ApiError::Rejected(reason) => json!({
                "error": self.to_string(),
                "reason": reason.as_str(),
            }),
            ApiError::InvalidInput(issues) => json!({
                "error": self.to_string(),
                "issues": issues,
            }),
            ApiError::UnknownCapability(_) => json!({ "error": self.to_string() }),
            ApiError::Internal(detail) => {
                error!(detail = %detail, "request failed");
                json!({ "error": self.to_string() })
            }
        };
        (status, Json(body)).into_response()
    }
}
