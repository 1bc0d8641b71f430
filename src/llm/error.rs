//! Model-specific error types.

use thiserror::Error;

/// Result type for model operations.
pub type ModelResult<T> = Result<T, ModelError>;

/// Errors that can occur during a model call.
#[derive(Error, Debug)]
pub enum ModelError {
    /// The call timed out.
    #[error("model call timed out after {0} seconds")]
    Timeout(u64),

    /// The provider rejected the request due to rate limits.
    #[error("model call was rate limited")]
    RateLimited,

    /// Transport-level failure (connection reset, 5xx, ...).
    #[error("model transport error: {0}")]
    Transport(String),

    /// The response was not valid JSON at all.
    #[error("model returned unparseable output: {0}")]
    Unparseable(String),

    /// The response parsed but cannot be coerced into the expected shape.
    #[error("model output did not match expected shape: {0}")]
    ShapeMismatch(String),

    /// The provider rejected the credentials.
    #[error("model authentication failed: {0}")]
    AuthFailed(String),
}

impl ModelError {
    /// Check if this error is worth retrying at item granularity.
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            Self::Timeout(_) | Self::RateLimited | Self::Transport(_)
        )
    }

    /// Check if this error should fail the whole extraction immediately.
    pub fn is_permanent(&self) -> bool {
        matches!(self, Self::AuthFailed(_))
    }

    /// Whether this is a per-item output problem rather than a call failure.
    ///
    /// Output problems never fail a node: the affected item is recorded as
    /// failed and the batch continues.
    pub fn is_output_problem(&self) -> bool {
        matches!(self, Self::Unparseable(_) | Self::ShapeMismatch(_))
    }
}
