use futures::stream::Stream;
use std::pin::Pin;

use crate::error::SessionResult;
use crate::models::Message;

/// Lazily produced, finite, non-restartable sequence of text deltas.
/// Dropping it releases the upstream connection.
pub type FragmentStream = Pin<Box<dyn Stream<Item = SessionResult<String>> + Send>>;

/// Contract the session layer needs from a chat-completion endpoint.
///
/// Concatenating every fragment of `stream` must give the same text that
/// `complete` returns for the same messages and model. Implementations do
/// not retry.
#[async_trait::async_trait]
pub trait CompletionProvider: Send + Sync {
    async fn complete(&self, messages: &[Message], model: &str) -> SessionResult<Message>;

    async fn stream(&self, messages: &[Message], model: &str) -> SessionResult<FragmentStream>;

    async fn list_models(&self) -> SessionResult<Vec<String>> {
        Ok(Vec::new())
    }
}
