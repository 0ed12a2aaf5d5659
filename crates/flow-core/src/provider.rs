use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;

use crate::contract::RenderedPrompt;
use crate::errors::ProviderError;

/// One generation call: prompt plus the JSON schema the answer must follow.
#[derive(Clone, Debug)]
pub struct GenerationRequest {
    pub flow: &'static str,
    pub prompt: RenderedPrompt,
    pub output_schema: Value,
}

/// Produces a JSON answer for a rendered prompt.
#[async_trait]
pub trait GenerationProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn generate(&self, request: &GenerationRequest) -> Result<Value, ProviderError>;
}

/// Used when no model is configured; every flow answers with its fallback.
#[derive(Clone, Debug, Default)]
pub struct DisabledProvider {
    reason: String,
}

impl DisabledProvider {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl GenerationProvider for DisabledProvider {
    fn name(&self) -> &str {
        "disabled"
    }

    async fn generate(&self, _request: &GenerationRequest) -> Result<Value, ProviderError> {
        let reason = if self.reason.is_empty() {
            "no generation provider configured"
        } else {
            self.reason.as_str()
        };
        Err(ProviderError::unavailable(reason))
    }
}

/// Replays scripted responses in order. An exhausted script reports unavailable.
#[derive(Default)]
pub struct MockProvider {
    script: Mutex<VecDeque<Result<Value, ProviderError>>>,
    requests: Mutex<Vec<GenerationRequest>>,
    calls: AtomicUsize,
}

impl MockProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_response(self, value: Value) -> Self {
        self.script.lock().push_back(Ok(value));
        self
    }

    pub fn with_error(self, error: ProviderError) -> Self {
        self.script.lock().push_back(Err(error));
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_request(&self) -> Option<GenerationRequest> {
        self.requests.lock().last().cloned()
    }
}

#[async_trait]
impl GenerationProvider for MockProvider {
    fn name(&self) -> &str {
        "mock"
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<Value, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().push(request.clone());
        self.script
            .lock()
            .pop_front()
            .unwrap_or_else(|| Err(ProviderError::unavailable("mock script exhausted")))
    }
}
