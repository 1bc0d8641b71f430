//! Profiler-specific error types.

use thiserror::Error;

/// Result type for profiler operations.
pub type ProfilerResult<T> = Result<T, ProfilerError>;

/// Errors that can occur while profiling a datasource.
#[derive(Error, Debug)]
pub enum ProfilerError {
    /// Statistics query timed out.
    #[error("profiling query timed out after {0} seconds")]
    Timeout(u64),

    /// Datasource rejected the request due to load.
    #[error("profiling request was rate limited")]
    RateLimited,

    /// A statistics query failed for a transient reason.
    #[error("profiling query failed: {0}")]
    QueryFailed(String),

    /// The datasource could not be reached at all.
    #[error("datasource unreachable: {0}")]
    Unreachable(String),

    /// Authentication against the datasource failed.
    #[error("datasource authentication failed: {0}")]
    AuthFailed(String),

    /// Table or column does not exist.
    #[error("unknown object: {0}")]
    UnknownObject(String),

    /// The adapter does not support this operation for its dialect.
    #[error("unsupported operation: {0}")]
    Unsupported(String),
}

impl ProfilerError {
    /// Check if this error is worth retrying at task granularity.
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            Self::Timeout(_) | Self::RateLimited | Self::QueryFailed(_)
        )
    }

    /// Check if this error should fail the whole extraction immediately.
    pub fn is_permanent(&self) -> bool {
        matches!(self, Self::Unreachable(_) | Self::AuthFailed(_))
    }
}
