//! Database module for callguard
//!
//! Provides persistence for users, chat sessions, messages and fraud reports.
//! Every operation borrows one pooled connection on a blocking worker; writes
//! run inside `BEGIN IMMEDIATE` transactions so an operation either commits as
//! a whole or leaves nothing behind, even if the awaiting caller goes away.

mod fraud;
mod schema;
mod turns;

pub use schema::*;

use crate::config::{env_parse, env_string};
use chrono::{DateTime, Utc};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{Connection, ErrorCode, Transaction, TransactionBehavior};
use serde_json::Value;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Connection pool error: {0}")]
    Pool(#[from] r2d2::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Storage task failed: {0}")]
    Task(String),
    #[error("Session {session_id} belongs to another user")]
    SessionOwnershipConflict { session_id: String },
    #[error("Invalid message: {0}")]
    InvalidMessage(String),
    #[error("Failed to connect to database after {attempts} attempts: {message}")]
    Startup { attempts: u32, message: String },
}

impl DbError {
    /// Whether the backend itself is unreachable or saturated, as opposed to
    /// the request being rejected.
    pub fn is_unavailable(&self) -> bool {
        match self {
            DbError::Pool(_) | DbError::Task(_) | DbError::Io(_) | DbError::Startup { .. } => true,
            DbError::Sqlite(rusqlite::Error::SqliteFailure(err, _)) => matches!(
                err.code,
                ErrorCode::DatabaseBusy
                    | ErrorCode::DatabaseLocked
                    | ErrorCode::CannotOpen
                    | ErrorCode::SystemIoFailure
                    | ErrorCode::DiskFull
            ),
            DbError::Sqlite(_)
            | DbError::SessionOwnershipConflict { .. }
            | DbError::InvalidMessage(_) => false,
        }
    }
}

pub type DbResult<T> = Result<T, DbError>;

/// Storage configuration
#[derive(Debug, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
    pub pool_size: u32,
    /// Longest wait for a pooled connection before the operation fails
    pub pool_timeout: Duration,
    pub connect_attempts: u32,
    pub connect_backoff: Duration,
    pub busy_timeout: Duration,
}

impl DbConfig {
    pub fn for_path(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            pool_size: 8,
            pool_timeout: Duration::from_secs(30),
            connect_attempts: 3,
            connect_backoff: Duration::from_secs(2),
            busy_timeout: Duration::from_secs(5),
        }
    }

    pub fn from_env() -> Self {
        let path = env_string("CALLGUARD_DB_PATH").unwrap_or_else(|| {
            let home = env_string("HOME").unwrap_or_else(|| "/tmp".to_string());
            format!("{home}/.callguard/callguard.db")
        });
        let defaults = Self::for_path(path);

        Self {
            pool_size: env_parse("DB_POOL_SIZE").unwrap_or(defaults.pool_size),
            pool_timeout: env_parse("DB_POOL_TIMEOUT_SECS")
                .map_or(defaults.pool_timeout, Duration::from_secs),
            connect_attempts: env_parse("DB_CONNECT_ATTEMPTS").unwrap_or(defaults.connect_attempts),
            connect_backoff: env_parse("DB_CONNECT_BACKOFF_MS")
                .map_or(defaults.connect_backoff, Duration::from_millis),
            busy_timeout: env_parse("DB_BUSY_TIMEOUT_MS")
                .map_or(defaults.busy_timeout, Duration::from_millis),
            ..defaults
        }
    }
}

/// Pooled database handle, cheap to clone
#[derive(Clone)]
pub struct Database {
    pool: r2d2::Pool<SqliteConnectionManager>,
}

impl Database {
    /// Open the pool and run migrations, retrying with a fixed backoff.
    ///
    /// Gives up with [`DbError::Startup`] once `connect_attempts` are spent.
    pub async fn connect(config: &DbConfig) -> DbResult<Self> {
        let max_attempts = config.connect_attempts.max(1);
        let mut attempt = 1;

        loop {
            let cfg = config.clone();
            let result = tokio::task::spawn_blocking(move || Self::open_pool(&cfg))
                .await
                .map_err(|e| DbError::Task(e.to_string()))
                .and_then(|r| r);

            match result {
                Ok(db) => {
                    tracing::info!(
                        path = %config.path.display(),
                        pool_size = config.pool_size,
                        attempt,
                        "Database connection established"
                    );
                    return Ok(db);
                }
                Err(e) if attempt < max_attempts => {
                    tracing::warn!(
                        attempt,
                        max_attempts,
                        error = %e,
                        "Database connection failed, retrying"
                    );
                    tokio::time::sleep(config.connect_backoff).await;
                    attempt += 1;
                }
                Err(e) => {
                    tracing::error!(attempts = max_attempts, error = %e, "Giving up on database connection");
                    return Err(DbError::Startup {
                        attempts: max_attempts,
                        message: e.to_string(),
                    });
                }
            }
        }
    }

    fn open_pool(config: &DbConfig) -> DbResult<Self> {
        if let Some(parent) = config.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let busy_timeout = config.busy_timeout;
        let manager = SqliteConnectionManager::file(&config.path).with_init(move |conn| {
            conn.busy_timeout(busy_timeout)?;
            conn.execute_batch("PRAGMA journal_mode = WAL; PRAGMA foreign_keys = ON;")
        });

        let pool = r2d2::Pool::builder()
            .max_size(config.pool_size.max(1))
            .connection_timeout(config.pool_timeout)
            .build(manager)?;

        let conn = pool.get()?;
        conn.execute_batch(SCHEMA)?;

        Ok(Self { pool })
    }

    /// Storage connectivity probe
    pub async fn ping(&self) -> DbResult<()> {
        self.with_conn(|conn| {
            conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))?;
            Ok(())
        })
        .await
    }

    /// Release pooled connections. Outstanding clones keep the pool alive
    /// until they are dropped.
    pub fn close(self) {
        let state = self.pool.state();
        tracing::info!(
            connections = state.connections,
            idle = state.idle_connections,
            "Closing database pool"
        );
    }

    /// Run a read on a pooled connection
    async fn with_conn<T, F>(&self, func: F) -> DbResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> DbResult<T> + Send + 'static,
    {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let conn = pool.get()?;
            func(&conn)
        })
        .await
        .map_err(|e| DbError::Task(e.to_string()))?
    }

    /// Run `func` inside an immediate write transaction.
    ///
    /// The transaction commits only if `func` returns `Ok`; on error it is
    /// dropped and rolled back.
    async fn with_tx<T, F>(&self, func: F) -> DbResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&Transaction<'_>) -> DbResult<T> + Send + 'static,
    {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = pool.get()?;
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let value = func(&tx)?;
            tx.commit()?;
            Ok(value)
        })
        .await
        .map_err(|e| DbError::Task(e.to_string()))?
    }
}

fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s).map_or_else(|_| Utc::now(), |dt| dt.with_timezone(&Utc))
}

fn parse_metadata(raw: Option<String>) -> Option<Value> {
    raw.and_then(|s| serde_json::from_str(&s).ok())
}

fn metadata_to_sql(metadata: Option<&Value>) -> Option<String> {
    metadata.map(Value::to_string)
}
