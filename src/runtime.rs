//! Runtime for routing conversation turns
//!
//! The pure router in [`crate::state_machine`] decides; the orchestrator here
//! performs the I/O its effects ask for.

mod orchestrator;
pub mod traits;

#[cfg(test)]
pub mod testing;

pub use orchestrator::{Orchestrator, DEFAULT_HISTORY_LIMIT};
pub use traits::*;

use crate::db::DbError;
use crate::state_machine::TransitionError;
use rusqlite::ErrorCode;
use thiserror::Error;

/// An inbound user turn
#[derive(Debug, Clone)]
pub struct ChatTurn {
    pub content: String,
    pub session_id: String,
    pub user_id: String,
    /// Client address recorded with fraud reports
    pub reporter_ip: String,
}

/// The answer to one turn
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatReply {
    pub content: String,
    /// Handler that produced the answer
    pub name: String,
    pub session_id: String,
    pub user_id: String,
}

/// Failures surfaced to the caller of [`Orchestrator::handle_turn`]
#[derive(Debug, Error)]
pub enum ChatError {
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),
    #[error("{0}")]
    ConstraintViolation(String),
    #[error("{0}")]
    ValidationFailure(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<DbError> for ChatError {
    fn from(err: DbError) -> Self {
        if err.is_unavailable() {
            return ChatError::StorageUnavailable(err.to_string());
        }
        match err {
            DbError::SessionOwnershipConflict { .. } => {
                ChatError::ConstraintViolation(err.to_string())
            }
            DbError::InvalidMessage(message) => ChatError::ValidationFailure(message),
            DbError::Sqlite(rusqlite::Error::SqliteFailure(ref failure, _))
                if failure.code == ErrorCode::ConstraintViolation =>
            {
                ChatError::ConstraintViolation(err.to_string())
            }
            other => ChatError::Internal(other.to_string()),
        }
    }
}

impl From<TransitionError> for ChatError {
    fn from(err: TransitionError) -> Self {
        ChatError::Internal(err.to_string())
    }
}
