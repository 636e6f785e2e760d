//! Trait abstractions for runtime I/O
//!
//! These traits let the orchestrator and handlers run against the real
//! database or against test doubles.

use crate::db::{Database, DbResult, FraudReport, Message, NewMessage, Session, User};
use async_trait::async_trait;

/// Ordered record of sessions and their turns
#[async_trait]
pub trait TurnStore: Send + Sync + 'static {
    async fn get_or_create_user(&self, user_id: &str) -> DbResult<User>;

    async fn get_or_create_session(&self, session_id: &str, user_id: &str) -> DbResult<Session>;

    /// Append a turn; the store assigns id and turn number
    async fn save_message(&self, message: NewMessage) -> DbResult<Message>;

    /// Last `limit` turns, oldest first
    async fn get_recent_messages(&self, session_id: &str, limit: usize) -> DbResult<Vec<Message>>;
}

/// Aggregated fraud reports keyed by canonical phone number
#[async_trait]
pub trait FraudRegistry: Send + Sync + 'static {
    async fn check_number(&self, phone_number: &str) -> DbResult<Option<FraudReport>>;

    async fn report_fraud(
        &self,
        phone_number: &str,
        description: &str,
        reporter_ip: &str,
    ) -> DbResult<FraudReport>;
}

// ============================================================================
// Database implementations
// ============================================================================

#[async_trait]
impl TurnStore for Database {
    async fn get_or_create_user(&self, user_id: &str) -> DbResult<User> {
        Database::get_or_create_user(self, user_id, None).await
    }

    async fn get_or_create_session(&self, session_id: &str, user_id: &str) -> DbResult<Session> {
        Database::get_or_create_session(self, session_id, user_id).await
    }

    async fn save_message(&self, message: NewMessage) -> DbResult<Message> {
        Database::save_message(self, message).await
    }

    async fn get_recent_messages(&self, session_id: &str, limit: usize) -> DbResult<Vec<Message>> {
        Database::get_recent_messages(self, session_id, limit).await
    }
}

#[async_trait]
impl FraudRegistry for Database {
    async fn check_number(&self, phone_number: &str) -> DbResult<Option<FraudReport>> {
        Database::check_number(self, phone_number).await
    }

    async fn report_fraud(
        &self,
        phone_number: &str,
        description: &str,
        reporter_ip: &str,
    ) -> DbResult<FraudReport> {
        Database::report_fraud(self, phone_number, description, reporter_ip).await
    }
}
