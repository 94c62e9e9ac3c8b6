// src/provider/mod.rs — Plan provider layer

pub mod openai_compat;
pub mod prompt;

use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::core::types::GenerationInput;
use crate::infra::errors::PlanError;

/// Lazy, finite sequence of raw text fragments.
pub type FragmentStream = Pin<Box<dyn Stream<Item = Result<String, PlanError>> + Send>>;

/// A text-generation backend that can produce plan content.
///
/// Implementations must stop promptly once `options.signal` fires and must
/// fail with `PlanError::ProviderTimeout` when their own budget elapses.
#[async_trait]
pub trait PlanProvider: Send + Sync {
    fn id(&self) -> &str;

    async fn generate(
        &self,
        input: &GenerationInput,
        options: GenerateOptions,
    ) -> Result<ProviderResponse, PlanError>;
}

#[derive(Debug, Clone)]
pub struct GenerateOptions {
    pub signal: CancellationToken,
    pub timeout: Duration,
}

pub struct ProviderResponse {
    pub stream: FragmentStream,
    pub metadata: ProviderMetadata,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProviderMetadata {
    pub provider: String,
    pub model: String,
}

impl ProviderMetadata {
    pub fn new(provider: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            model: model.into(),
        }
    }
}
