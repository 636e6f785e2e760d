//! Pure state transition function

use super::decision::{parse_decision, RouteTarget};
use super::effect::DispatchReason;
use super::{Effect, Event, RouteContext, RouteState, Turn};
use crate::agents::AgentName;
use thiserror::Error;

/// Handler used whenever the router cannot decide
pub const DEFAULT_AGENT: AgentName = AgentName::Greeter;

/// Result of a state transition
#[derive(Debug)]
pub struct TransitionResult {
    pub new_state: RouteState,
    pub effects: Vec<Effect>,
}

impl TransitionResult {
    pub fn new(state: RouteState) -> Self {
        Self {
            new_state: state,
            effects: vec![],
        }
    }

    pub fn with_effect(mut self, effect: Effect) -> Self {
        self.effects.push(effect);
        self
    }
}

/// Errors that can occur during transition
#[derive(Debug, Error)]
pub enum TransitionError {
    #[error("Invocation already finished")]
    Finished,
    #[error("Invalid transition: {0}")]
    InvalidTransition(String),
}

/// Pure transition function
///
/// Given the same inputs it always produces the same outputs, with no I/O.
pub fn transition(
    state: &RouteState,
    context: &RouteContext,
    event: Event,
) -> Result<TransitionResult, TransitionError> {
    match (state, event) {
        (RouteState::Done, _) => Err(TransitionError::Finished),

        // An answer already at the end of the history ends the cycle, whatever
        // the router would have said.
        (RouteState::AwaitingRoute | RouteState::Routing { .. }, Event::TurnReceived | Event::RouterResponse { .. })
            if context.has_fresh_answer() =>
        {
            Ok(respond_with_standing(context))
        }

        (RouteState::AwaitingRoute, Event::TurnReceived) => {
            Ok(TransitionResult::new(RouteState::Routing { attempt: 1 })
                .with_effect(Effect::RequestRoute { attempt: 1 }))
        }

        // ============================================================
        // Routing decisions
        // ============================================================

        (RouteState::Routing { .. }, Event::RouterResponse { text }) => {
            Ok(match parse_decision(&text) {
                Ok(decision) => match decision.target {
                    RouteTarget::Agent(agent) => dispatch(
                        agent,
                        DispatchReason::Routed {
                            reasoning: decision.reasoning,
                        },
                    ),
                    RouteTarget::Finish => match context.standing_reply() {
                        Some(_) => respond_with_standing(context),
                        None => dispatch(DEFAULT_AGENT, DispatchReason::NoStandingReply),
                    },
                },
                Err(e) => dispatch(
                    DEFAULT_AGENT,
                    DispatchReason::UnparseableDecision {
                        error: e.to_string(),
                    },
                ),
            })
        }

        // ============================================================
        // Gateway errors and retry
        // ============================================================

        (RouteState::Routing { attempt }, Event::RouterError { kind, retry_after, .. })
            if kind.is_retryable() && *attempt < context.max_attempts =>
        {
            let backoff = context.retry_delay(*attempt);
            let delay = retry_after.map_or(backoff, |wait| wait.max(backoff));
            let next = attempt + 1;
            Ok(TransitionResult::new(RouteState::Routing { attempt: next })
                .with_effect(Effect::ScheduleRetry {
                    delay,
                    attempt: next,
                }))
        }

        (RouteState::Routing { attempt }, Event::RouterError { kind, message, .. }) => {
            let message = if kind.is_retryable() {
                format!("failed after {attempt} attempts: {message}")
            } else {
                message
            };
            Ok(dispatch(
                DEFAULT_AGENT,
                DispatchReason::RouterUnavailable { message },
            ))
        }

        (RouteState::Routing { attempt }, Event::RetryTimeout { attempt: retry_attempt })
            if *attempt == retry_attempt =>
        {
            Ok(TransitionResult::new(RouteState::Routing { attempt: *attempt })
                .with_effect(Effect::RequestRoute { attempt: *attempt }))
        }

        // ============================================================
        // Handler completion
        // ============================================================

        (RouteState::Dispatched { agent }, Event::HandlerReplied { reply })
            if reply.agent == *agent =>
        {
            let respond = Effect::respond_with(&reply);
            Ok(TransitionResult::new(RouteState::Done)
                .with_effect(Effect::PersistReply { reply })
                .with_effect(respond))
        }

        (state, event) => Err(TransitionError::InvalidTransition(format!(
            "{event:?} in state {}",
            state.name()
        ))),
    }
}

fn dispatch(agent: AgentName, reason: DispatchReason) -> TransitionResult {
    TransitionResult::new(RouteState::Dispatched { agent }).with_effect(Effect::dispatch(agent, reason))
}

fn respond_with_standing(context: &RouteContext) -> TransitionResult {
    let effect = match context.standing_reply() {
        Some(Turn { content, agent, .. }) => Effect::Respond {
            content: content.clone(),
            agent: agent.clone().unwrap_or_else(|| "assistant".to_string()),
        },
        None => Effect::Respond {
            content: String::new(),
            agent: "assistant".to_string(),
        },
    };
    TransitionResult::new(RouteState::Done).with_effect(effect)
}
