//! Process configuration read from the environment

use crate::db::DbConfig;
use crate::llm::LlmConfig;
use crate::runtime::DEFAULT_HISTORY_LIMIT;
use std::str::FromStr;
use std::time::Duration;

const DEFAULT_PORT: u16 = 8000;
const DEFAULT_RETRY_BASE_MS: u64 = 1000;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub port: u16,
    /// Earlier turns loaded for routing
    pub history_limit: usize,
    /// First router retry delay; doubles per attempt
    pub route_retry_base: Duration,
    pub db: DbConfig,
    pub llm: LlmConfig,
}

impl AppConfig {
    /// Read from the process environment; `main` loads `.env` first.
    pub fn from_env() -> Self {
        Self {
            port: env_parse("CALLGUARD_PORT").unwrap_or(DEFAULT_PORT),
            history_limit: env_parse("HISTORY_LIMIT").unwrap_or(DEFAULT_HISTORY_LIMIT),
            route_retry_base: Duration::from_millis(
                env_parse("ROUTE_RETRY_BASE_MS").unwrap_or(DEFAULT_RETRY_BASE_MS),
            ),
            db: DbConfig::from_env(),
            llm: LlmConfig::from_env(),
        }
    }
}

/// Non-blank value of `key`, trimmed
pub fn env_string(key: &str) -> Option<String> {
    non_blank(std::env::var(key).ok())
}

/// Parsed value of `key`; `None` when unset, blank or malformed
pub fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    parse_value(std::env::var(key).ok())
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_value<T: FromStr>(value: Option<String>) -> Option<T> {
    non_blank(value).and_then(|v| v.parse().ok())
}
