//! Router state and context types

use crate::agents::AgentName;
use crate::db::{Message, Role};
use std::time::Duration;

pub const DEFAULT_MAX_ROUTE_ATTEMPTS: u32 = 3;

/// Router state for one invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteState {
    /// Turn accepted, nothing decided yet
    AwaitingRoute,
    /// Gateway call in flight
    Routing { attempt: u32 },
    /// A handler has been chosen and is running
    Dispatched { agent: AgentName },
    /// Terminal; accepts no further events
    Done,
}

impl RouteState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RouteState::Done)
    }

    pub fn name(&self) -> &'static str {
        match self {
            RouteState::AwaitingRoute => "awaiting_route",
            RouteState::Routing { .. } => "routing",
            RouteState::Dispatched { .. } => "dispatched",
            RouteState::Done => "done",
        }
    }
}

/// One turn of the working history
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Turn {
    pub role: Role,
    pub content: String,
    /// Handler that produced an assistant turn
    pub agent: Option<String>,
}

impl Turn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            agent: None,
        }
    }

    pub fn assistant(agent: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            agent: Some(agent.into()),
        }
    }
}

impl From<&Message> for Turn {
    fn from(message: &Message) -> Self {
        Self {
            role: message.role,
            content: message.content.clone(),
            agent: message.agent_name.clone(),
        }
    }
}

/// Immutable inputs to the transition function
#[derive(Debug, Clone)]
pub struct RouteContext {
    pub session_id: String,
    /// Oldest first; ends with the turn being answered
    pub history: Vec<Turn>,
    pub retry_base: Duration,
    pub max_attempts: u32,
}

impl RouteContext {
    pub fn new(session_id: impl Into<String>, history: Vec<Turn>) -> Self {
        Self {
            session_id: session_id.into(),
            history,
            retry_base: Duration::from_secs(1),
            max_attempts: DEFAULT_MAX_ROUTE_ATTEMPTS,
        }
    }

    #[must_use]
    pub fn with_retry_base(mut self, retry_base: Duration) -> Self {
        self.retry_base = retry_base;
        self
    }

    /// The history already ends with an answer
    pub fn has_fresh_answer(&self) -> bool {
        self.history
            .last()
            .is_some_and(|turn| turn.role == Role::Assistant)
    }

    /// Most recent assistant turn, which stands as the reply on FINISH
    pub fn standing_reply(&self) -> Option<&Turn> {
        self.history
            .iter()
            .rev()
            .find(|turn| turn.role == Role::Assistant)
    }

    /// Backoff before retrying after `failed_attempt` failed
    pub fn retry_delay(&self, failed_attempt: u32) -> Duration {
        let factor = 1u32 << failed_attempt.saturating_sub(1).min(16);
        self.retry_base.saturating_mul(factor)
    }
}
