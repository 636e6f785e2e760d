//! Conversation handlers
//!
//! The handler set is closed: a greeter, a number checker and a fraud
//! reporter. Handlers never fail; storage problems turn into degraded replies.

mod checker;
mod greeter;
mod reporter;

pub use checker::Checker;
pub use greeter::Greeter;
pub use reporter::Reporter;

use crate::runtime::FraudRegistry;
use crate::state_machine::Turn;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Identity of a handler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AgentName {
    Greeter,
    Checker,
    Reporter,
}

impl AgentName {
    pub const ALL: [AgentName; 3] = [AgentName::Greeter, AgentName::Checker, AgentName::Reporter];

    pub fn as_str(self) -> &'static str {
        match self {
            AgentName::Greeter => "greeter",
            AgentName::Checker => "checker",
            AgentName::Reporter => "reporter",
        }
    }
}

impl fmt::Display for AgentName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AgentName {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AgentName::ALL
            .into_iter()
            .find(|name| name.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown agent: {s}"))
    }
}

/// Everything a handler may look at for one turn
#[derive(Debug, Clone, Copy)]
pub struct HandlerContext<'a> {
    pub current_message: &'a str,
    /// Earlier turns of the session, oldest first, excluding the current one
    pub history: &'a [Turn],
    pub reporter_ip: &'a str,
}

/// A handler's answer to the current turn
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerReply {
    pub content: String,
    pub agent: AgentName,
}

impl HandlerReply {
    pub fn new(agent: AgentName, content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            agent,
        }
    }
}

/// The fixed set of handlers the router can dispatch to
pub struct HandlerSet<R: FraudRegistry> {
    greeter: Greeter,
    checker: Checker<R>,
    reporter: Reporter<R>,
}

impl<R: FraudRegistry> HandlerSet<R> {
    pub fn new(registry: Arc<R>) -> Self {
        Self {
            greeter: Greeter,
            checker: Checker::new(Arc::clone(&registry)),
            reporter: Reporter::new(registry),
        }
    }

    /// Run exactly one handler
    pub async fn dispatch(&self, agent: AgentName, ctx: &HandlerContext<'_>) -> HandlerReply {
        tracing::info!(agent = %agent, "Dispatching handler");
        match agent {
            AgentName::Greeter => self.greeter.process(ctx),
            AgentName::Checker => self.checker.process(ctx).await,
            AgentName::Reporter => self.reporter.process(ctx).await,
        }
    }
}
