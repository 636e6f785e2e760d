//! Effects produced by state transitions

use crate::agents::{AgentName, HandlerReply};
use std::time::Duration;

/// Effects to be executed after state transition
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Ask the model gateway for a routing decision
    RequestRoute { attempt: u32 },

    /// Schedule a retry
    ScheduleRetry { delay: Duration, attempt: u32 },

    /// Run one handler
    Dispatch {
        agent: AgentName,
        reason: DispatchReason,
    },

    /// Append the handler reply as an assistant turn
    PersistReply { reply: HandlerReply },

    /// Final answer for the caller
    Respond { content: String, agent: String },
}

/// Why a handler was chosen
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchReason {
    Routed { reasoning: Option<String> },
    UnparseableDecision { error: String },
    RouterUnavailable { message: String },
    /// FINISH with nothing to stand as the reply
    NoStandingReply,
}

impl DispatchReason {
    pub fn is_fallback(&self) -> bool {
        !matches!(self, DispatchReason::Routed { .. })
    }
}

impl Effect {
    pub fn dispatch(agent: AgentName, reason: DispatchReason) -> Self {
        Effect::Dispatch { agent, reason }
    }

    pub fn respond_with(reply: &HandlerReply) -> Self {
        Effect::Respond {
            content: reply.content.clone(),
            agent: reply.agent.as_str().to_string(),
        }
    }
}
