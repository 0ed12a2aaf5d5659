use thiserror::Error;

use crate::validate::ValidationIssue;

/// Failures surfaced to the caller of a flow.
#[derive(Debug, Error)]
pub enum FlowError {
    /// Raised when the request body does not satisfy the flow's input contract.
    #[error("invalid input: {}", summarize(.0))]
    InvalidInput(Vec<ValidationIssue>),

    /// Raised when no flow is registered for the requested capability.
    #[error("unknown flow: {0}")]
    UnknownFlow(String),

    /// Raised when a generated output cannot be re-encoded for the caller.
    #[error("failed to encode flow output: {0}")]
    Encode(String),
}

impl FlowError {
    pub fn issues(&self) -> &[ValidationIssue] {
        match self {
            FlowError::InvalidInput(issues) => issues,
            FlowError::UnknownFlow(_) | FlowError::Encode(_) => &[],
        }
    }
}

/// Failures of the generation step. Never surfaced to end users.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("generation provider unavailable: {0}")]
    Unavailable(String),

    #[error("provider transport failed: {0}")]
    Transport(String),

    #[error("provider returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("provider response malformed: {0}")]
    Malformed(String),

    #[error("provider output rejected: {}", summarize(.0))]
    InvalidOutput(Vec<ValidationIssue>),
}

impl ProviderError {
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable(message.into())
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport(message.into())
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self::Malformed(message.into())
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ProviderError::Unavailable(_) => "unavailable",
            ProviderError::Transport(_) => "transport",
            ProviderError::Status { .. } => "status",
            ProviderError::Malformed(_) => "malformed",
            ProviderError::InvalidOutput(_) => "invalid_output",
        }
    }
}

fn summarize(issues: &[ValidationIssue]) -> String {
    issues
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
