//! Turn orchestrator

use super::traits::{FraudRegistry, TurnStore};
use super::{ChatError, ChatReply, ChatTurn};
use crate::agents::{HandlerContext, HandlerSet};
use crate::db::{Message, NewMessage};
use crate::llm::{LlmMessage, ModelGateway};
use crate::prompts::routing_prompt;
use crate::state_machine::{transition, Effect, Event, RouteContext, RouteState, Turn};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

pub const DEFAULT_HISTORY_LIMIT: usize = 20;

/// Drives one router invocation per inbound turn.
///
/// Holds no per-session state; concurrent turns share only the store, the
/// registry and the gateway.
pub struct Orchestrator<S: TurnStore, R: FraudRegistry> {
    store: Arc<S>,
    gateway: Arc<ModelGateway>,
    handlers: HandlerSet<R>,
    history_limit: usize,
    retry_base: Duration,
}

/// What executing one effect produced
enum EffectOutcome {
    Next(Event),
    Reply { content: String, agent: String },
    Done,
}

/// Per-invocation inputs shared by the effects
struct Invocation<'a> {
    context: RouteContext,
    user_message: Message,
    reporter_ip: &'a str,
}

impl Invocation<'_> {
    fn current_message(&self) -> &str {
        &self.user_message.content
    }

    /// Turns before the one being answered
    fn earlier_turns(&self) -> &[Turn] {
        self.context
            .history
            .split_last()
            .map(|(_, earlier)| earlier)
            .unwrap_or_default()
    }
}

impl<S: TurnStore, R: FraudRegistry> Orchestrator<S, R> {
    pub fn new(store: Arc<S>, registry: Arc<R>, gateway: Arc<ModelGateway>) -> Self {
        Self {
            store,
            gateway,
            handlers: HandlerSet::new(registry),
            history_limit: DEFAULT_HISTORY_LIMIT,
            retry_base: Duration::from_secs(1),
        }
    }

    #[must_use]
    pub fn with_history_limit(mut self, history_limit: usize) -> Self {
        self.history_limit = history_limit;
        self
    }

    #[must_use]
    pub fn with_retry_base(mut self, retry_base: Duration) -> Self {
        self.retry_base = retry_base;
        self
    }

    pub fn model_id(&self) -> &str {
        self.gateway.model_id()
    }

    /// Route one user turn to a handler and return its answer.
    ///
    /// The user turn is persisted before routing and the handler reply is
    /// persisted, threaded to it, before returning.
    pub async fn handle_turn(&self, turn: ChatTurn) -> Result<ChatReply, ChatError> {
        validate(&turn)?;
        let ChatTurn {
            content,
            session_id,
            user_id,
            reporter_ip,
        } = turn;

        self.store.get_or_create_user(&user_id).await?;
        self.store
            .get_or_create_session(&session_id, &user_id)
            .await?;
        let mut history: Vec<Turn> = self
            .store
            .get_recent_messages(&session_id, self.history_limit)
            .await?
            .iter()
            .map(Turn::from)
            .collect();

        let user_message = self
            .store
            .save_message(NewMessage::user(&session_id, &user_id, content))
            .await?;
        history.push(Turn::from(&user_message));

        tracing::info!(
            session_id = %session_id,
            user_id = %user_id,
            turn = user_message.turn_number,
            "Turn received"
        );

        let invocation = Invocation {
            context: RouteContext::new(&session_id, history).with_retry_base(self.retry_base),
            user_message,
            reporter_ip: &reporter_ip,
        };

        let (content, name) = self.run(&invocation).await?;
        Ok(ChatReply {
            content,
            name,
            session_id,
            user_id,
        })
    }

    /// Event loop for one invocation; no recursion
    async fn run(&self, invocation: &Invocation<'_>) -> Result<(String, String), ChatError> {
        let mut state = RouteState::AwaitingRoute;
        let mut events = vec![Event::TurnReceived];
        let mut reply = None;

        while let Some(event) = events.pop() {
            let result = transition(&state, &invocation.context, event)?;
            tracing::debug!(
                session_id = %invocation.context.session_id,
                from = state.name(),
                to = result.new_state.name(),
                "Route transition"
            );
            state = result.new_state;

            for effect in result.effects {
                match self.execute_effect(effect, invocation).await? {
                    EffectOutcome::Next(next) => events.push(next),
                    EffectOutcome::Reply { content, agent } => reply = Some((content, agent)),
                    EffectOutcome::Done => {}
                }
            }
        }

        if !state.is_terminal() {
            return Err(ChatError::Internal(format!(
                "router stopped in state {}",
                state.name()
            )));
        }
        reply.ok_or_else(|| ChatError::Internal("router finished without a reply".to_string()))
    }

    async fn execute_effect(
        &self,
        effect: Effect,
        invocation: &Invocation<'_>,
    ) -> Result<EffectOutcome, ChatError> {
        let session_id = &invocation.context.session_id;

        match effect {
            Effect::RequestRoute { attempt } => {
                let prompt = routing_prompt(invocation.current_message(), invocation.earlier_turns());
                let messages = [LlmMessage::from(&Turn::from(&invocation.user_message))];
                tracing::debug!(session_id = %session_id, attempt, "Requesting route");

                let event = match self.gateway.complete(&prompt, &messages).await {
                    Ok(text) => Event::RouterResponse { text },
                    Err(e) => Event::RouterError {
                        kind: e.kind,
                        message: e.message,
                        retry_after: e.retry_after,
                    },
                };
                Ok(EffectOutcome::Next(event))
            }

            Effect::ScheduleRetry { delay, attempt } => {
                tracing::warn!(
                    session_id = %session_id,
                    attempt,
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    "Router call failed, retrying"
                );
                tokio::time::sleep(delay).await;
                Ok(EffectOutcome::Next(Event::RetryTimeout { attempt }))
            }

            Effect::Dispatch { agent, reason } => {
                if reason.is_fallback() {
                    tracing::warn!(session_id = %session_id, agent = %agent, reason = ?reason, "Routing fell back to default handler");
                } else {
                    tracing::info!(session_id = %session_id, agent = %agent, reason = ?reason, "Routed turn");
                }

                let ctx = HandlerContext {
                    current_message: invocation.current_message(),
                    history: invocation.earlier_turns(),
                    reporter_ip: invocation.reporter_ip,
                };
                let reply = self.handlers.dispatch(agent, &ctx).await;
                Ok(EffectOutcome::Next(Event::HandlerReplied { reply }))
            }

            Effect::PersistReply { reply } => {
                let message = NewMessage::assistant(
                    session_id.as_str(),
                    invocation.user_message.user_id.as_str(),
                    reply.agent.as_str(),
                    reply.content,
                )
                .with_parent(invocation.user_message.message_id.as_str())
                .with_metadata(json!({ "router_model": self.gateway.model_id() }));
                let saved = self.store.save_message(message).await?;
                tracing::debug!(
                    session_id = %session_id,
                    turn = saved.turn_number,
                    agent = %reply.agent,
                    "Reply persisted"
                );
                Ok(EffectOutcome::Done)
            }

            Effect::Respond { content, agent } => Ok(EffectOutcome::Reply { content, agent }),
        }
    }
}

fn validate(turn: &ChatTurn) -> Result<(), ChatError> {
    if turn.content.trim().is_empty() {
        return Err(ChatError::ValidationFailure(
            "Message content must not be empty".to_string(),
        ));
    }
    if turn.session_id.trim().is_empty() || turn.user_id.trim().is_empty() {
        return Err(ChatError::ValidationFailure(
            "session_id and user_id must not be empty".to_string(),
        ));
    }
    Ok(())
}
