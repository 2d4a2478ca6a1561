//! Placeholder used when no generation credential is configured.

use async_trait::async_trait;

use genta_core::error::ProviderError;
use genta_core::traits::{Generation, GenerationRequest, GenerationService, ModelInfo};

/// Reports itself as unconfigured and refuses every call.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnconfiguredProvider;

#[async_trait]
impl GenerationService for UnconfiguredProvider {
    fn name(&self) -> &str {
        "unconfigured"
    }

    fn is_configured(&self) -> bool {
        false
    }

    async fn generate(&self, _request: &GenerationRequest) -> anyhow::Result<Generation> {
        Err(ProviderError::NotConfigured("no API key for feedback generation".into()).into())
    }

    fn available_models(&self) -> Vec<ModelInfo> {
        Vec::new()
    }
}
