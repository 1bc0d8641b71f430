//! Scripted model client for tests.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;

use super::client::{ClassifyRequest, ModelClient, ModelResponse, ModelUsage};
use super::error::{ModelError, ModelResult};

/// A [`ModelClient`] that returns canned responses keyed by task name.
///
/// Each task holds a queue of responses consumed in order; the last response
/// is repeated once the queue is exhausted. Unknown tasks fall back to a
/// default response when one is set, otherwise the call fails as a shape
/// mismatch so tests notice missing fixtures.
#[derive(Default)]
pub struct StaticModelClient {
    responses: Mutex<HashMap<String, Vec<Value>>>,
    default_response: Option<Value>,
    calls: Mutex<Vec<String>>,
}

impl StaticModelClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a response for `task`.
    pub fn push_response(&self, task: &str, value: Value) {
        self.responses
            .lock()
            .expect("response lock poisoned")
            .entry(task.to_string())
            .or_default()
            .push(value);
    }

    /// Set the fallback response for tasks with no queued values.
    pub fn with_default(mut self, value: Value) -> Self {
        self.default_response = Some(value);
        self
    }

    /// Tasks invoked so far, in call order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().expect("call lock poisoned").clone()
    }
}

#[async_trait]
impl ModelClient for StaticModelClient {
    async fn classify(&self, request: ClassifyRequest) -> ModelResult<ModelResponse> {
        self.calls
            .lock()
            .expect("call lock poisoned")
            .push(request.task.clone());

        let value = {
            let mut responses = self.responses.lock().expect("response lock poisoned");
            match responses.get_mut(&request.task) {
                Some(queue) if queue.len() > 1 => Some(queue.remove(0)),
                Some(queue) => queue.first().cloned(),
                None => None,
            }
        };

        let value = value
            .or_else(|| self.default_response.clone())
            .ok_or_else(|| {
                ModelError::ShapeMismatch(format!("no scripted response for task {}", request.task))
            })?;

        Ok(ModelResponse {
            value,
            usage: ModelUsage {
                prompt_tokens: request.prompt.len() as u32 / 4,
                completion_tokens: 64,
                duration_ms: 1,
                status: "ok".to_string(),
            },
        })
    }
}
