//! Property-based tests for the router state machine
//!
//! These tests verify key invariants hold across arbitrary event sequences.

use super::decision::parse_decision;
use super::state::*;
use super::*;
use crate::agents::{AgentName, HandlerReply};
use crate::db::Role;
use crate::llm::LlmErrorKind;
use proptest::prelude::*;
use std::time::Duration;

// ============================================================================
// Arbitrary Generators
// ============================================================================

fn arb_agent() -> impl Strategy<Value = AgentName> {
    prop_oneof![
        Just(AgentName::Greeter),
        Just(AgentName::Checker),
        Just(AgentName::Reporter),
    ]
}

fn arb_error_kind() -> impl Strategy<Value = LlmErrorKind> {
    prop_oneof![
        Just(LlmErrorKind::Network),
        Just(LlmErrorKind::RateLimit),
        Just(LlmErrorKind::ServerError),
        Just(LlmErrorKind::Auth),
        Just(LlmErrorKind::InvalidRequest),
        Just(LlmErrorKind::Unknown),
    ]
}

fn arb_router_text() -> impl Strategy<Value = String> {
    prop_oneof![
        arb_agent().prop_map(|a| format!(r#"{{"decision": {{"selected_agent": "{a}"}}}}"#)),
        arb_agent().prop_map(|a| format!(r#"{{"selected_agent": "{}"}}"#, a.as_str().to_uppercase())),
        Just(r#"{"decision": {"selected_agent": "FINISH"}}"#.to_string()),
        Just(r#"{"selected_agent": "supervisor"}"#.to_string()),
        ".{0,40}",
    ]
}

fn arb_turn() -> impl Strategy<Value = Turn> {
    prop_oneof![
        "[a-z ]{1,20}".prop_map(Turn::user),
        (arb_agent(), "[a-z ]{1,20}").prop_map(|(a, c)| Turn::assistant(a.as_str(), c)),
    ]
}

fn arb_history() -> impl Strategy<Value = Vec<Turn>> {
    prop::collection::vec(arb_turn(), 0..6)
}

fn arb_event() -> impl Strategy<Value = Event> {
    prop_oneof![
        Just(Event::TurnReceived),
        arb_router_text().prop_map(|text| Event::RouterResponse { text }),
        (arb_error_kind(), proptest::option::of(0u64..5)).prop_map(|(kind, wait)| {
            Event::RouterError {
                kind,
                message: "error".to_string(),
                retry_after: wait.map(Duration::from_secs),
            }
        }),
        (1u32..5).prop_map(|attempt| Event::RetryTimeout { attempt }),
        arb_agent().prop_map(|agent| Event::HandlerReplied {
            reply: HandlerReply::new(agent, "reply"),
        }),
    ]
}

fn context_with(history: Vec<Turn>) -> RouteContext {
    RouteContext::new("prop-session", history).with_retry_base(Duration::from_millis(10))
}

/// Follow the effects the way the runtime would, feeding back the events
/// that each effect produces.
fn drive(context: &RouteContext, router_outputs: &[Event]) -> (RouteState, Vec<Effect>) {
    let mut state = RouteState::AwaitingRoute;
    let mut all_effects = Vec::new();
    let mut pending = vec![Event::TurnReceived];
    let mut outputs = router_outputs.iter().cloned();

    while let Some(event) = pending.pop() {
        let Ok(result) = transition(&state, context, event) else {
            break;
        };
        state = result.new_state;
        for effect in &result.effects {
            match effect {
                Effect::RequestRoute { .. } => pending.push(outputs.next().unwrap_or(
                    Event::RouterResponse {
                        text: String::new(),
                    },
                )),
                Effect::ScheduleRetry { attempt, .. } => {
                    pending.push(Event::RetryTimeout { attempt: *attempt });
                }
                Effect::Dispatch { agent, .. } => pending.push(Event::HandlerReplied {
                    reply: HandlerReply::new(*agent, "handled"),
                }),
                Effect::PersistReply { .. } | Effect::Respond { .. } => {}
            }
        }
        all_effects.extend(result.effects);
    }
    (state, all_effects)
}

fn arb_router_event() -> impl Strategy<Value = Event> {
    prop_oneof![
        arb_router_text().prop_map(|text| Event::RouterResponse { text }),
        arb_error_kind().prop_map(|kind| Event::RouterError {
            kind,
            message: "error".to_string(),
            retry_after: None,
        }),
    ]
}

proptest! {
    // Done is terminal
    #[test]
    fn prop_done_accepts_nothing(history in arb_history(), event in arb_event()) {
        let result = transition(&RouteState::Done, &context_with(history), event);
        let finished = matches!(result, Err(TransitionError::Finished));
        prop_assert!(finished);
    }

    // Whatever the model says, a routing response never errors and always
    // picks a handler or finishes
    #[test]
    fn prop_router_response_always_resolves(history in arb_history(), text in arb_router_text()) {
        let result = transition(
            &RouteState::Routing { attempt: 1 },
            &context_with(history),
            Event::RouterResponse { text },
        ).unwrap();
        let resolved = matches!(
            result.new_state,
            RouteState::Dispatched { .. } | RouteState::Done
        );
        prop_assert!(resolved, "unexpected state {:?}", result.new_state);
    }

    // A fresh assistant turn always ends the cycle without a gateway call
    #[test]
    fn prop_fresh_answer_wins(
        history in arb_history(),
        agent in arb_agent(),
        outputs in prop::collection::vec(arb_router_event(), 0..4),
    ) {
        let mut history = history;
        history.push(Turn::assistant(agent.as_str(), "already answered"));
        let (state, effects) = drive(&context_with(history), &outputs);

        prop_assert_eq!(state, RouteState::Done);
        prop_assert_eq!(effects, vec![Effect::Respond {
            content: "already answered".to_string(),
            agent: agent.as_str().to_string(),
        }]);
    }

    // One invocation reaches Done with exactly one response and at most one
    // handler reply
    #[test]
    fn prop_invocation_has_single_reply(
        history in arb_history(),
        outputs in prop::collection::vec(arb_router_event(), 0..5),
    ) {
        let mut history = history;
        history.push(Turn::user("current message"));
        let context = context_with(history);
        let (state, effects) = drive(&context, &outputs);

        prop_assert_eq!(state, RouteState::Done);

        let dispatches = effects.iter().filter(|e| matches!(e, Effect::Dispatch { .. })).count();
        let persists = effects.iter().filter(|e| matches!(e, Effect::PersistReply { .. })).count();
        let responds = effects.iter().filter(|e| matches!(e, Effect::Respond { .. })).count();
        let requests = effects.iter().filter(|e| matches!(e, Effect::RequestRoute { .. })).count();

        prop_assert!(dispatches <= 1);
        prop_assert_eq!(dispatches, persists);
        prop_assert_eq!(responds, 1);
        prop_assert!(requests >= 1);
        prop_assert!(u32::try_from(requests).unwrap() <= context.max_attempts);

        // Without a dispatch the reply must be the standing assistant turn
        if dispatches == 0 {
            prop_assert!(context.standing_reply().is_some());
        }
    }

    // Retryable errors advance the attempt until the limit, then fall back
    #[test]
    fn prop_retryable_error_increments_attempt(
        attempt in 1u32..=3,
        kind in prop_oneof![
            Just(LlmErrorKind::Network),
            Just(LlmErrorKind::RateLimit),
            Just(LlmErrorKind::ServerError),
        ],
    ) {
        let context = context_with(vec![Turn::user("hi")]);
        let result = transition(
            &RouteState::Routing { attempt },
            &context,
            Event::RouterError { kind, message: "err".to_string(), retry_after: None },
        ).unwrap();

        if attempt < context.max_attempts {
            prop_assert_eq!(result.new_state, RouteState::Routing { attempt: attempt + 1 });
            let is_retry = matches!(
                result.effects.as_slice(),
                [Effect::ScheduleRetry { attempt: next, .. }] if *next == attempt + 1
            );
            prop_assert!(is_retry);
        } else {
            prop_assert_eq!(result.new_state, RouteState::Dispatched { agent: AgentName::Greeter });
        }
    }

    // Non-retryable errors never schedule a retry
    #[test]
    fn prop_non_retryable_error_falls_back(
        attempt in 1u32..=3,
        kind in prop_oneof![
            Just(LlmErrorKind::Auth),
            Just(LlmErrorKind::InvalidRequest),
            Just(LlmErrorKind::Unknown),
        ],
    ) {
        let result = transition(
            &RouteState::Routing { attempt },
            &context_with(vec![Turn::user("hi")]),
            Event::RouterError { kind, message: "err".to_string(), retry_after: None },
        ).unwrap();
        prop_assert_eq!(result.new_state, RouteState::Dispatched { agent: AgentName::Greeter });
    }

    // The decision parser is total over arbitrary text
    #[test]
    fn prop_parse_decision_never_panics(text in "\\PC{0,64}") {
        let _ = parse_decision(&text);
    }

    #[test]
    fn prop_standing_reply_is_an_assistant_turn(history in arb_history()) {
        let context = context_with(history);
        if let Some(turn) = context.standing_reply() {
            prop_assert_eq!(turn.role, Role::Assistant);
        }
    }
}
