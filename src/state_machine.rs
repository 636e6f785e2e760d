//! Routing state machine
//!
//! Implements the Elm Architecture pattern with pure state transitions: the
//! router's decisions are computed here, side effects are carried out by the
//! runtime.

mod decision;
mod effect;
pub mod event;
pub mod state;
pub(crate) mod transition;

#[cfg(test)]
mod proptests;

pub use effect::Effect;
pub use event::Event;
pub use state::{RouteContext, RouteState, Turn};
pub use transition::{transition, TransitionError};
