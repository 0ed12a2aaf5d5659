use thiserror::Error;

#[derive(Debug, Error)]
pub enum PolicyError {
    #[error("invalid policy: {0}")]
    Invalid(String),
    #[error("io error: {0}")]
    Io(String),
    #[error("unsupported policy path: {0}")]
    UnsupportedPath(String),
    #[error("invalid value: {0}")]
    InvalidValue(String),
    /// Wraps an error with the file or variable that produced it.
    #[error("{origin}: {error}")]
    Layer {
        origin: String,
        #[source]
        error: Box<PolicyError>,
    },
}

impl PolicyError {
    pub fn within(self, origin: impl Into<String>) -> Self {
        PolicyError::Layer {
            origin: origin.into(),
            error: Box::new(self),
        }
    }

    /// The innermost error, without layer context.
    pub fn root(&self) -> &PolicyError {
        match self {
            PolicyError::Layer { error, .. } => error.root(),
            other => other,
        }
    }
}
