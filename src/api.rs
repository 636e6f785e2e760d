//! HTTP API for callguard

mod handlers;
mod types;

pub use handlers::create_router;
#[allow(unused_imports)] // Public API re-exports
pub use types::*;

use crate::db::Database;
use crate::runtime::Orchestrator;
use std::sync::Arc;

/// Turn orchestrator wired to the production store and registry
pub type ChatOrchestrator = Orchestrator<Database, Database>;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<ChatOrchestrator>,
    pub db: Database,
}

impl AppState {
    pub fn new(db: Database, orchestrator: ChatOrchestrator) -> Self {
        Self {
            orchestrator: Arc::new(orchestrator),
            db,
        }
    }
}
