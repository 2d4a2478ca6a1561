//! Mock generation service for tests and offline simulation.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use genta_core::error::ProviderError;
use genta_core::traits::{Generation, GenerationRequest, GenerationService, ModelInfo};

const MOCK_MODEL: &str = "mock-tutor";

/// A generation service that answers from canned text without network calls.
///
/// Responses are chosen by prompt substring; the first `fail_first` calls
/// fail with a retryable API error so retry paths can be exercised.
pub struct MockProvider {
    responses: HashMap<String, String>,
    default_response: String,
    fail_first: u32,
    call_count: AtomicU32,
    last_request: Mutex<Option<GenerationRequest>>,
}

impl MockProvider {
    pub fn new(responses: HashMap<String, String>) -> Self {
        Self {
            responses,
            default_response: "Perhatikan kembali langkah penyelesaian soal ini.".to_string(),
            fail_first: 0,
            call_count: AtomicU32::new(0),
            last_request: Mutex::new(None),
        }
    }

    /// A mock that always returns the same text.
    pub fn with_fixed_response(response: &str) -> Self {
        let mut mock = Self::new(HashMap::new());
        mock.default_response = response.to_string();
        mock
    }

    /// Fail the first `n` calls with a 503 before answering.
    pub fn failing_first(mut self, n: u32) -> Self {
        self.fail_first = n;
        self
    }

    pub fn call_count(&self) -> u32 {
        self.call_count.load(Ordering::Relaxed)
    }

    pub fn last_request(&self) -> Option<GenerationRequest> {
        self.last_request
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new(HashMap::new())
    }
}

#[async_trait]
impl GenerationService for MockProvider {
    fn name(&self) -> &str {
        "mock"
    }

    async fn generate(&self, request: &GenerationRequest) -> anyhow::Result<Generation> {
        let call = self.call_count.fetch_add(1, Ordering::Relaxed);
        *self
            .last_request
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(request.clone());

        if call < self.fail_first {
            return Err(ProviderError::ApiError {
                status: 503,
                message: format!("mock failure {}", call + 1),
            }
            .into());
        }

        let text = self
            .responses
            .iter()
            .find(|(key, _)| request.user_prompt.contains(key.as_str()))
            .map(|(_, v)| v.clone())
            .unwrap_or_else(|| self.default_response.clone());

        // Rough estimate: four characters per token.
        let tokens_in = ((request.system_prompt.len() + request.user_prompt.len()) / 4) as u32;
        let tokens_out = (text.len() / 4) as u32;

        Ok(Generation {
            text,
            model: MOCK_MODEL.to_string(),
            tokens_in,
            tokens_out,
            latency_ms: 1,
        })
    }

    fn available_models(&self) -> Vec<ModelInfo> {
        vec![ModelInfo {
            id: MOCK_MODEL.into(),
            name: "Mock Tutor".into(),
            provider: "mock".into(),
            max_context: 100_000,
        }]
    }
}
