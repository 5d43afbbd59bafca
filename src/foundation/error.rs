/// Convenience result type used across finishview.
pub type PreviewResult<T> = Result<T, PreviewError>;

/// Top-level error taxonomy used by pipeline APIs.
///
/// Session-level code never returns these to the rendering layer directly; they are folded
/// into typed status fields instead.
#[derive(thiserror::Error, Debug)]
pub enum PreviewError {
    /// Undecodable or dimensionless image input. Never retried.
    #[error("decode error: {0}")]
    Decode(String),

    /// Invalid caller-provided data (missing scan, duplicate ids, bad transitions).
    #[error("validation error: {0}")]
    Validation(String),

    /// A scanner, segmentation or synthesis collaborator failed.
    #[error("collaborator error: {0}")]
    Collaborator(String),

    /// A collaborator did not answer within its time bound.
    #[error("timeout: {0}")]
    Timeout(String),

    /// A store record is unknown or expired.
    #[error("not found: {0}")]
    NotFound(String),

    /// Errors when serializing or deserializing data structures.
    #[error("serialization error: {0}")]
    Serde(String),

    /// Wrapped lower-level error from dependencies or IO.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl PreviewError {
    /// Build a [`PreviewError::Decode`] value.
    pub fn decode(msg: impl Into<String>) -> Self {
        Self::Decode(msg.into())
    }

    /// Build a [`PreviewError::Validation`] value.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Build a [`PreviewError::Collaborator`] value.
    pub fn collaborator(msg: impl Into<String>) -> Self {
        Self::Collaborator(msg.into())
    }

    /// Build a [`PreviewError::Timeout`] value.
    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::Timeout(msg.into())
    }

    /// Build a [`PreviewError::NotFound`] value.
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Build a [`PreviewError::Serde`] value.
    pub fn serde(msg: impl Into<String>) -> Self {
        Self::Serde(msg.into())
    }

    /// `true` for failures worth showing as a retryable notice (collaborators, timeouts).
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Collaborator(_) | Self::Timeout(_))
    }
}

impl From<serde_json::Error> for PreviewError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serde(e.to_string())
    }
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/error.rs"]
mod tests;
