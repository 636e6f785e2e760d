//! LLM provider abstraction
//!
//! The router talks to a single chat model through [`ModelGateway`]; the
//! concrete provider sits behind the [`LlmService`] trait.

mod error;
mod gateway;
mod groq;
mod types;

pub use error::{LlmError, LlmErrorKind};
pub use gateway::{ModelGateway, UnconfiguredService};
pub use groq::GroqService;
pub use types::*;

use crate::config::{env_parse, env_string};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// Common interface for LLM providers
#[async_trait]
pub trait LlmService: Send + Sync {
    /// Make a completion request
    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse, LlmError>;

    /// Get the model ID
    fn model_id(&self) -> &str;
}

/// Configuration for the chat model provider
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub api_key: Option<String>,
    pub model: String,
    pub base_url: String,
    pub timeout: Duration,
    pub temperature: f32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: "llama3-70b-8192".to_string(),
            base_url: groq::DEFAULT_BASE_URL.to_string(),
            timeout: Duration::from_secs(30),
            temperature: 0.1,
        }
    }
}

impl LlmConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            api_key: env_string("GROQ_API_KEY"),
            model: env_string("GROQ_MODEL").unwrap_or(defaults.model),
            base_url: env_string("GROQ_BASE_URL").unwrap_or(defaults.base_url),
            timeout: env_parse("LLM_TIMEOUT_SECS").map_or(defaults.timeout, Duration::from_secs),
            temperature: env_parse("LLM_TEMPERATURE").unwrap_or(defaults.temperature),
        }
    }

    /// Build the logged provider, or the unconfigured stand-in without a key
    pub fn build_service(&self) -> Result<Arc<dyn LlmService>, LlmError> {
        match &self.api_key {
            Some(key) => {
                let groq = GroqService::new(key.clone(), self)?;
                Ok(Arc::new(LoggingService::new(Arc::new(groq))))
            }
            None => {
                tracing::warn!(
                    model = %self.model,
                    "No LLM API key configured. Set GROQ_API_KEY; routing will use the default handler."
                );
                Ok(Arc::new(UnconfiguredService::new(self.model.clone())))
            }
        }
    }
}

/// Logging wrapper for LLM services
pub struct LoggingService {
    inner: Arc<dyn LlmService>,
    model_id: String,
}

impl LoggingService {
    pub fn new(inner: Arc<dyn LlmService>) -> Self {
        let model_id = inner.model_id().to_string();
        Self { inner, model_id }
    }
}

#[async_trait]
impl LlmService for LoggingService {
    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse, LlmError> {
        let start = std::time::Instant::now();
        let result = self.inner.complete(request).await;
        let duration = start.elapsed();

        match &result {
            Ok(response) => {
                tracing::info!(
                    model = %self.model_id,
                    duration_ms = %duration.as_millis(),
                    input_tokens = response.usage.input_tokens,
                    output_tokens = response.usage.output_tokens,
                    "LLM request completed"
                );
            }
            Err(e) => {
                tracing::error!(
                    model = %self.model_id,
                    duration_ms = %duration.as_millis(),
                    kind = e.kind.as_str(),
                    error = %e.message,
                    retryable = e.is_retryable(),
                    "LLM request failed"
                );
            }
        }

        result
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::testing::MockLlmService;

    #[tokio::test]
    async fn test_logging_service_is_transparent() {
        let mock = Arc::new(MockLlmService::new());
        mock.queue_response("hello");
        mock.queue_error(LlmError::rate_limit("slow down"));
        let logged = LoggingService::new(mock.clone());

        let request = LlmRequest {
            system: String::new(),
            messages: vec![LlmMessage::user("hi")],
            max_tokens: None,
            temperature: None,
        };

        assert_eq!(logged.complete(&request).await.unwrap().text, "hello");
        let err = logged.complete(&request).await.unwrap_err();
        assert_eq!(err.kind, LlmErrorKind::RateLimit);
        assert_eq!(logged.model_id(), mock.model_id());
    }

    #[test]
    fn test_missing_key_builds_unconfigured_service() {
        let service = LlmConfig::default().build_service().unwrap();
        assert_eq!(service.model_id(), "llama3-70b-8192");
    }
}
