//! Database schema and record types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// SQL schema for initialization
pub const SCHEMA: &str = r"
CREATE TABLE IF NOT EXISTS users (
    user_id TEXT PRIMARY KEY,
    created_at TEXT NOT NULL,
    last_active TEXT NOT NULL,
    metadata TEXT
);

CREATE INDEX IF NOT EXISTS idx_users_last_active ON users(last_active);

CREATE TABLE IF NOT EXISTS chat_sessions (
    session_id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'active'
        CHECK (status IN ('active', 'inactive', 'completed')),
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    last_message_at TEXT NOT NULL,
    metadata TEXT,

    FOREIGN KEY (user_id) REFERENCES users(user_id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_sessions_user ON chat_sessions(user_id, status);
CREATE INDEX IF NOT EXISTS idx_sessions_last_message ON chat_sessions(last_message_at);

CREATE TABLE IF NOT EXISTS chat_messages (
    message_id TEXT PRIMARY KEY,
    session_id TEXT NOT NULL,
    user_id TEXT NOT NULL,
    role TEXT NOT NULL CHECK (role IN ('user', 'assistant', 'system')),
    content TEXT NOT NULL CHECK (length(trim(content)) > 0),
    agent_name TEXT,
    turn_number INTEGER NOT NULL CHECK (turn_number >= 1),
    parent_message_id TEXT,
    created_at TEXT NOT NULL,
    metadata TEXT,

    FOREIGN KEY (session_id) REFERENCES chat_sessions(session_id) ON DELETE CASCADE,
    FOREIGN KEY (user_id) REFERENCES users(user_id) ON DELETE CASCADE,
    FOREIGN KEY (parent_message_id) REFERENCES chat_messages(message_id)
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_messages_session_turn
    ON chat_messages(session_id, turn_number);
CREATE INDEX IF NOT EXISTS idx_messages_user ON chat_messages(user_id, created_at);
CREATE INDEX IF NOT EXISTS idx_messages_parent ON chat_messages(parent_message_id);

CREATE TABLE IF NOT EXISTS fraud_reports (
    phone_number TEXT PRIMARY KEY,
    is_fraud BOOLEAN NOT NULL DEFAULT 0,
    report_count INTEGER NOT NULL DEFAULT 0 CHECK (report_count >= 0),
    description TEXT NOT NULL DEFAULT '',
    first_reported_at TEXT NOT NULL,
    last_updated_at TEXT NOT NULL,
    reporter_ip TEXT NOT NULL
);
";

/// User record
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct User {
    pub user_id: String,
    pub created_at: DateTime<Utc>,
    pub last_active: DateTime<Utc>,
    pub metadata: Option<Value>,
}

/// Session lifecycle status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    #[default]
    Active,
    Inactive,
    Completed,
}

impl SessionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            SessionStatus::Active => "active",
            SessionStatus::Inactive => "inactive",
            SessionStatus::Completed => "completed",
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SessionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(SessionStatus::Active),
            "inactive" => Ok(SessionStatus::Inactive),
            "completed" => Ok(SessionStatus::Completed),
            other => Err(format!("unknown session status: {other}")),
        }
    }
}

/// Session record
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Session {
    pub session_id: String,
    pub user_id: String,
    pub status: SessionStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_message_at: DateTime<Utc>,
    pub metadata: Option<Value>,
}

/// Author of a turn
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Role::User),
            "assistant" => Ok(Role::Assistant),
            "system" => Ok(Role::System),
            other => Err(format!("unknown message role: {other}")),
        }
    }
}

/// Message record (one turn of a session)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub message_id: String,
    pub session_id: String,
    pub user_id: String,
    pub role: Role,
    pub content: String,
    pub agent_name: Option<String>,
    pub turn_number: i64,
    pub parent_message_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub metadata: Option<Value>,
}

/// A turn to be appended by `Database::save_message`
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub session_id: String,
    pub user_id: String,
    pub role: Role,
    pub content: String,
    pub agent_name: Option<String>,
    pub metadata: Option<Value>,
    pub parent_message_id: Option<String>,
}

impl NewMessage {
    pub fn new(
        session_id: impl Into<String>,
        user_id: impl Into<String>,
        role: Role,
        content: impl Into<String>,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            user_id: user_id.into(),
            role,
            content: content.into(),
            agent_name: None,
            metadata: None,
            parent_message_id: None,
        }
    }

    pub fn user(
        session_id: impl Into<String>,
        user_id: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self::new(session_id, user_id, Role::User, content)
    }

    pub fn assistant(
        session_id: impl Into<String>,
        user_id: impl Into<String>,
        agent_name: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self::new(session_id, user_id, Role::Assistant, content).with_agent(agent_name)
    }

    pub fn with_agent(mut self, agent_name: impl Into<String>) -> Self {
        self.agent_name = Some(agent_name.into());
        self
    }

    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn with_parent(mut self, parent_message_id: impl Into<String>) -> Self {
        self.parent_message_id = Some(parent_message_id.into());
        self
    }
}

/// Aggregated fraud reports for one canonical phone number
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FraudReport {
    pub phone_number: String,
    pub is_fraud: bool,
    pub report_count: i64,
    pub description: String,
    pub first_reported_at: DateTime<Utc>,
    pub last_updated_at: DateTime<Utc>,
    pub reporter_ip: String,
}
