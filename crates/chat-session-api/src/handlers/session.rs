use axum::{
    extract::{Path, State},
    Json,
};
use std::sync::Arc;
use tracing::debug;

use crate::models::chat::{HistoryView, ModelList};
use crate::services::SessionOrchestrator;
use crate::utils::error::ApiError;

/// `GET /api/history/{state}` — stored transcript of a session.
pub async fn history_handler(
    State(orchestrator): State<Arc<SessionOrchestrator>>,
    Path(state): Path<String>,
) -> Result<Json<HistoryView>, ApiError> {
    let messages = orchestrator.inspect(&state).await?;
    debug!("History inspect: {} messages", messages.len());
    Ok(Json(HistoryView { state, messages }))
}

/// `GET /api/models` — models offered by the completion endpoint.
pub async fn models_handler(
    State(orchestrator): State<Arc<SessionOrchestrator>>,
) -> Result<Json<ModelList>, ApiError> {
    let models = orchestrator.list_models().await?;
    Ok(Json(ModelList { models }))
}
