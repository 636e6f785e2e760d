//! Text-completion gateway consumed by the router

use super::types::{LlmMessage, LlmRequest, LlmResponse};
use super::{LlmError, LlmService};
use async_trait::async_trait;
use std::sync::Arc;

/// Opaque `complete(system_prompt, history) -> text` capability.
///
/// Performs exactly one provider call per invocation; retry policy belongs to
/// the caller.
pub struct ModelGateway {
    service: Arc<dyn LlmService>,
    max_tokens: Option<u32>,
    temperature: Option<f32>,
}

impl ModelGateway {
    pub fn new(service: Arc<dyn LlmService>) -> Self {
        Self {
            service,
            max_tokens: None,
            temperature: None,
        }
    }

    #[must_use]
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    #[must_use]
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn model_id(&self) -> &str {
        self.service.model_id()
    }

    /// Raw model text; may be empty or malformed
    pub async fn complete(
        &self,
        system_prompt: &str,
        history: &[LlmMessage],
    ) -> Result<String, LlmError> {
        let request = LlmRequest {
            system: system_prompt.to_string(),
            messages: history.to_vec(),
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        };
        let LlmResponse { text, .. } = self.service.complete(&request).await?;
        Ok(text)
    }
}

/// Stand-in used when no API key is configured.
///
/// Every call fails with an auth error so routing falls back to its default.
pub struct UnconfiguredService {
    model_id: String,
}

impl UnconfiguredService {
    pub fn new(model_id: impl Into<String>) -> Self {
        Self {
            model_id: model_id.into(),
        }
    }
}

#[async_trait]
impl LlmService for UnconfiguredService {
    async fn complete(&self, _request: &LlmRequest) -> Result<LlmResponse, LlmError> {
        Err(LlmError::auth("No API key configured. Set GROQ_API_KEY."))
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }
}
