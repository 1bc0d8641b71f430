//! ModelClient trait definition.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::error::ModelResult;

/// A structured classification request.
///
/// `schema` is a JSON Schema describing the expected response shape; the
/// transport is responsible for enforcing it as far as the provider allows.
#[derive(Debug, Clone, Serialize)]
pub struct ClassifyRequest {
    /// Short task identifier, used for request/response logging.
    pub task: String,
    /// The full prompt text.
    pub prompt: String,
    /// JSON Schema for the expected response.
    pub schema: Value,
}

impl ClassifyRequest {
    pub fn new(task: impl Into<String>, prompt: impl Into<String>, schema: Value) -> Self {
        Self {
            task: task.into(),
            prompt: prompt.into(),
            schema,
        }
    }
}

/// Token and duration metrics for one model call.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelUsage {
    /// Prompt tokens consumed.
    pub prompt_tokens: u32,
    /// Completion tokens produced.
    pub completion_tokens: u32,
    /// Wall-clock duration of the call.
    pub duration_ms: u64,
    /// Provider status string (e.g. "ok", "length_capped").
    pub status: String,
}

/// A structured model response.
#[derive(Debug, Clone)]
pub struct ModelResponse {
    /// Parsed JSON value. May deviate from the requested schema; callers go
    /// through [`super::coerce`] before trusting field shapes.
    pub value: Value,
    /// Token/duration metrics.
    pub usage: ModelUsage,
}

/// Trait for structured model calls.
///
/// Implementations log request and response verbatim; the core records only
/// the returned usage metrics alongside derived results.
#[async_trait]
pub trait ModelClient: Send + Sync {
    /// Perform one structured classification call.
    async fn classify(&self, request: ClassifyRequest) -> ModelResult<ModelResponse>;
}
