use axum::extract::FromRef;
use std::sync::Arc;

use crate::services::SessionOrchestrator;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<SessionOrchestrator>,
}

impl AppState {
    pub fn new(orchestrator: SessionOrchestrator) -> Self {
        Self {
            orchestrator: Arc::new(orchestrator),
        }
    }
}

impl FromRef<AppState> for Arc<SessionOrchestrator> {
    fn from_ref(state: &AppState) -> Self {
        state.orchestrator.clone()
    }
}
