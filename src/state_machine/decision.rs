//! Parsing of the router model's decision object

use crate::agents::AgentName;
use serde_json::Value;
use thiserror::Error;

/// Where the router sends the turn
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteTarget {
    Agent(AgentName),
    Finish,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteDecision {
    pub target: RouteTarget,
    pub reasoning: Option<String>,
}

/// Why model output could not be used. Always recovered by the router.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecisionError {
    #[error("no JSON object in router output")]
    NoJsonObject,
    #[error("router output is not valid JSON: {0}")]
    InvalidJson(String),
    #[error("router output has no selected_agent")]
    MissingSelection,
    #[error("router selected unknown agent {0:?}")]
    UnknownAgent(String),
}

/// Parse model text into a routing decision.
///
/// The JSON object is taken from the first `{` to the last `}`, so prose
/// around it is tolerated. Both `{"decision": {"selected_agent": ..}}` and a
/// flat `{"selected_agent": ..}` are accepted; names are matched trimmed and
/// case-insensitively.
pub fn parse_decision(text: &str) -> Result<RouteDecision, DecisionError> {
    let start = text.find('{').ok_or(DecisionError::NoJsonObject)?;
    let end = text.rfind('}').ok_or(DecisionError::NoJsonObject)?;
    let candidate = text.get(start..=end).ok_or(DecisionError::NoJsonObject)?;

    let value: Value =
        serde_json::from_str(candidate).map_err(|e| DecisionError::InvalidJson(e.to_string()))?;

    let decision = value.get("decision").filter(|d| d.is_object()).unwrap_or(&value);
    let selected = decision
        .get("selected_agent")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or(DecisionError::MissingSelection)?;

    let target = if selected.eq_ignore_ascii_case("finish") {
        RouteTarget::Finish
    } else {
        RouteTarget::Agent(
            selected
                .parse()
                .map_err(|_| DecisionError::UnknownAgent(selected.to_string()))?,
        )
    };

    let reasoning = decision
        .get("reasoning")
        .and_then(Value::as_str)
        .map(str::to_string);

    Ok(RouteDecision { target, reasoning })
}
