//! Events that drive the router

use crate::agents::HandlerReply;
use crate::llm::LlmErrorKind;
use std::time::Duration;

/// Events that trigger state transitions
#[derive(Debug, Clone)]
pub enum Event {
    /// The user turn is persisted and the invocation starts
    TurnReceived,

    // Gateway events
    RouterResponse {
        text: String,
    },
    RouterError {
        kind: LlmErrorKind,
        message: String,
        retry_after: Option<Duration>,
    },
    RetryTimeout {
        attempt: u32,
    },

    HandlerReplied {
        reply: HandlerReply,
    },
}
