//! HTTP request handlers

use super::types::{
    ChatRequest, ChatResponse, DbHealthResponse, ErrorResponse, HealthResponse, MessagesResponse,
    SessionResponse, StatusRequest,
};
use super::AppState;
use crate::db::{DbError, SessionStatus};
use crate::runtime::{ChatError, ChatTurn};
use axum::{
    extract::{ConnectInfo, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use std::net::SocketAddr;

const DEFAULT_MESSAGE_LIMIT: usize = 50;
const MAX_MESSAGE_LIMIT: usize = 500;

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/api/v1/chat", post(chat))
        .route("/api/v1/sessions/:id/messages", get(get_messages))
        .route("/api/v1/sessions/:id/status", post(set_status))
        .route("/api/v1/health", get(health))
        .route("/api/v1/health/db", get(health_db))
        .with_state(state)
}

// ============================================================
// Chat
// ============================================================

async fn chat(
    State(state): State<AppState>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    Json(req): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, AppError> {
    let session_id = non_blank(req.session_id)
        .unwrap_or_else(|| format!("session_{}", uuid::Uuid::new_v4()));
    let user_id =
        non_blank(req.user_id).unwrap_or_else(|| format!("user_{}", uuid::Uuid::new_v4()));
    let reporter_ip = connect_info.map_or_else(
        || "unknown".to_string(),
        |ConnectInfo(addr)| addr.ip().to_string(),
    );

    let reply = state
        .orchestrator
        .handle_turn(ChatTurn {
            content: req.content,
            session_id,
            user_id,
            reporter_ip,
        })
        .await?;

    Ok(Json(ChatResponse {
        content: reply.content,
        name: reply.name,
        session_id: reply.session_id,
        user_id: reply.user_id,
    }))
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

// ============================================================
// Sessions
// ============================================================

#[derive(Debug, Deserialize)]
struct MessagesQuery {
    limit: Option<usize>,
}

async fn get_messages(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<MessagesQuery>,
) -> Result<Json<MessagesResponse>, AppError> {
    if state.db.get_session(&id).await?.is_none() {
        return Err(AppError::NotFound(format!("Session not found: {id}")));
    }

    let limit = query
        .limit
        .unwrap_or(DEFAULT_MESSAGE_LIMIT)
        .min(MAX_MESSAGE_LIMIT);
    let messages = state.db.get_session_messages(&id, limit).await?;

    Ok(Json(MessagesResponse {
        session_id: id,
        messages,
    }))
}

async fn set_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<StatusRequest>,
) -> Result<Json<SessionResponse>, AppError> {
    let status: SessionStatus = req.status.trim().parse().map_err(AppError::BadRequest)?;

    let session = state
        .db
        .set_session_status(&id, status)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Session not found: {id}")))?;

    Ok(Json(SessionResponse { session }))
}

// ============================================================
// Health
// ============================================================

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        model: state.orchestrator.model_id().to_string(),
    })
}

async fn health_db(State(state): State<AppState>) -> Result<Json<DbHealthResponse>, AppError> {
    state.db.ping().await?;
    Ok(Json(DbHealthResponse {
        status: "ok",
        database: "connected",
    }))
}

// ============================================================
// Error Handling
// ============================================================

#[derive(Debug)]
enum AppError {
    BadRequest(String),
    NotFound(String),
    Conflict(String),
    Unavailable(String),
    Internal(String),
}

impl From<ChatError> for AppError {
    fn from(err: ChatError) -> Self {
        match err {
            ChatError::ValidationFailure(msg) => AppError::BadRequest(msg),
            ChatError::ConstraintViolation(msg) => AppError::Conflict(msg),
            ChatError::StorageUnavailable(_) => AppError::Unavailable(err.to_string()),
            ChatError::Internal(_) => AppError::Internal(err.to_string()),
        }
    }
}

impl From<DbError> for AppError {
    fn from(err: DbError) -> Self {
        ChatError::from(err).into()
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            AppError::Unavailable(msg) => {
                tracing::warn!(error = %msg, "Service unavailable");
                (StatusCode::SERVICE_UNAVAILABLE, msg)
            }
            AppError::Internal(msg) => {
                tracing::error!(error = %msg, "Internal error");
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
        };

        let body = Json(ErrorResponse::new(message));
        (status, body).into_response()
    }
}
