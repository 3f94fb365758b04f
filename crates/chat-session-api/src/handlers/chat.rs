use crate::models::chat::*;
use crate::services::{SessionEvent, SessionOrchestrator};
use crate::utils::error::ApiError;
use axum::{
    extract::State,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    Json,
};
use futures::StreamExt;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

/// `POST /api/chat` — one conversational turn.
///
/// Blocking requests get `{ state, response }`. Streaming requests get an
/// SSE body: `message` events carrying deltas, then a single `done` event
/// with the state token, or an `error` event if the turn failed mid-way.
pub async fn chat_handler(
    State(orchestrator): State<Arc<SessionOrchestrator>>,
    Json(request): Json<ChatRequest>,
) -> Result<Response, ApiError> {
    let start_time = Instant::now();

    info!(
        "Chat request: has_state={}, stream={}, input_len={}, model={:?}",
        request.state.is_some(),
        request.stream,
        request.input.len(),
        request.model
    );

    if !request.stream {
        let reply = orchestrator.handle(&request).await?;
        info!("Chat completed in {}ms", start_time.elapsed().as_millis());
        return Ok(Json(reply).into_response());
    }

    let events = orchestrator.handle_stream(request).await?;

    let stream = events.map(move |event| -> Result<Event, Infallible> {
        let sse = match event {
            Ok(SessionEvent::Fragment(delta)) => create_sse_event("message", &MessageChunk { delta }),
            Ok(SessionEvent::Done(reply)) => {
                info!("Chat stream completed in {}ms", start_time.elapsed().as_millis());
                create_sse_event("done", &reply)
            }
            Err(e) => {
                warn!("Chat stream failed: {}", e);
                create_sse_event("error", &ErrorInfo {
                    code: e.code().to_string(),
                    message: e.to_string(),
                })
            }
        };
        Ok(sse)
    });

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()).into_response())
}

// Helper: Create SSE event
fn create_sse_event<T: serde::Serialize>(event_type: &str, data: &T) -> Event {
    Event::default()
        .event(event_type)
        .data(serde_json::to_string(data).unwrap_or_else(|_| "{}".to_string()))
}
