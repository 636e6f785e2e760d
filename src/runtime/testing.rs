//! Mock implementations for testing
//!
//! These mocks enable testing without a model provider or a working registry.

use super::traits::FraudRegistry;
use crate::db::{DbError, DbResult, FraudReport};
use crate::llm::{LlmError, LlmRequest, LlmResponse, LlmService};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;

// ============================================================================
// Mock LLM Service
// ============================================================================

/// Mock LLM service that returns queued responses
pub struct MockLlmService {
    responses: Mutex<VecDeque<Result<LlmResponse, LlmError>>>,
    /// Returned once the queue is empty
    default_text: Option<String>,
    /// Record of all requests made
    requests: Mutex<Vec<LlmRequest>>,
}

impl MockLlmService {
    pub fn new() -> Self {
        Self {
            responses: Mutex::new(VecDeque::new()),
            default_text: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Answer every unqueued request with `text`
    pub fn with_default(text: &str) -> Self {
        Self {
            default_text: Some(text.to_string()),
            ..Self::new()
        }
    }

    /// Queue a successful response
    pub fn queue_response(&self, text: &str) {
        self.responses.lock().unwrap().push_back(Ok(LlmResponse {
            text: text.to_string(),
            ..LlmResponse::default()
        }));
    }

    /// Queue an error response
    pub fn queue_error(&self, error: LlmError) {
        self.responses.lock().unwrap().push_back(Err(error));
    }

    /// Get recorded requests
    pub fn recorded_requests(&self) -> Vec<LlmRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl LlmService for MockLlmService {
    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse, LlmError> {
        self.requests.lock().unwrap().push(request.clone());
        let queued = self.responses.lock().unwrap().pop_front();
        match (queued, &self.default_text) {
            (Some(result), _) => result,
            (None, Some(text)) => Ok(LlmResponse {
                text: text.clone(),
                ..LlmResponse::default()
            }),
            (None, None) => Err(LlmError::unknown("No more mock responses")),
        }
    }

    fn model_id(&self) -> &str {
        "mock-model"
    }
}

// ============================================================================
// Failing Fraud Registry
// ============================================================================

/// Registry whose every call fails as if storage were down
pub struct FailingRegistry;

#[async_trait]
impl FraudRegistry for FailingRegistry {
    async fn check_number(&self, _phone_number: &str) -> DbResult<Option<FraudReport>> {
        Err(DbError::Task("registry offline".to_string()))
    }

    async fn report_fraud(
        &self,
        _phone_number: &str,
        _description: &str,
        _reporter_ip: &str,
    ) -> DbResult<FraudReport> {
        Err(DbError::Task("registry offline".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::LlmErrorKind;

    fn request() -> LlmRequest {
        LlmRequest {
            system: "route".to_string(),
            messages: vec![],
            max_tokens: None,
            temperature: None,
        }
    }

    #[tokio::test]
    async fn test_mock_drains_queue_then_uses_default() {
        let mock = MockLlmService::with_default("fallback");
        mock.queue_response("first");
        mock.queue_error(LlmError::network("down"));

        assert_eq!(mock.complete(&request()).await.unwrap().text, "first");
        assert_eq!(
            mock.complete(&request()).await.unwrap_err().kind,
            LlmErrorKind::Network
        );
        assert_eq!(mock.complete(&request()).await.unwrap().text, "fallback");
        assert_eq!(mock.recorded_requests().len(), 3);
    }

    #[tokio::test]
    async fn test_empty_mock_errors() {
        let mock = MockLlmService::new();
        assert!(mock.complete(&request()).await.is_err());
    }
}
