//! Stateful session orchestration
//!
//! One [`SessionOrchestrator`] serves every request; each call builds its own
//! [`History`] and [`Chat`], so nothing but the key-value store is shared
//! between concurrent turns.
//!
//! A turn is not atomic. The user message is persisted before the
//! completion call, so a failed turn leaves it in the history and a retry
//! with the same state token stores it a second time. Two turns running at
//! once on the same token interleave their writes in store-arrival order.

use futures::stream::Stream;
use futures::StreamExt;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use super::chat::Chat;
use super::history::{History, HistoryOptions};
use crate::config::SessionConfig;
use crate::error::SessionResult;
use crate::models::{ChatReply, ChatRequest, Message, MessageEncoding};
use crate::services::completion::CompletionProvider;
use crate::store::{KeyValueStore, Namespace};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Fragment(String),
    /// Final event of a successful turn.
    Done(ChatReply),
}

pub type SessionStream = Pin<Box<dyn Stream<Item = SessionResult<SessionEvent>> + Send>>;

pub struct SessionOrchestrator {
    provider: Arc<dyn CompletionProvider>,
    store: Arc<dyn KeyValueStore>,
    namespace: Namespace,
    default_model: String,
    ttl: Duration,
    encoding: MessageEncoding,
    welcome_message: String,
    system_prompt: Option<String>,
}

impl SessionOrchestrator {
    pub fn new(
        provider: Arc<dyn CompletionProvider>,
        store: Arc<dyn KeyValueStore>,
        namespace: Namespace,
        config: &SessionConfig,
        default_model: impl Into<String>,
    ) -> Self {
        Self {
            provider,
            store,
            namespace,
            default_model: default_model.into(),
            ttl: config.ttl(),
            encoding: config.encoding,
            welcome_message: config.welcome_message.clone(),
            system_prompt: config.system_prompt.clone().filter(|p| !p.trim().is_empty()),
        }
    }

    pub fn provider(&self) -> &Arc<dyn CompletionProvider> {
        &self.provider
    }

    fn history(&self, state: Option<String>) -> History {
        History::new(
            self.store.clone(),
            self.namespace.clone(),
            HistoryOptions {
                state,
                ttl: self.ttl,
                encoding: self.encoding,
            },
        )
    }

    fn model_for(&self, request: &ChatRequest) -> String {
        request
            .model
            .as_deref()
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .unwrap_or(&self.default_model)
            .to_string()
    }

    fn welcome(&self, request: &ChatRequest) -> Option<ChatReply> {
        if !request.input.trim().is_empty() {
            return None;
        }
        Some(ChatReply {
            state: request.state.clone().filter(|s| !s.trim().is_empty()),
            response: self.welcome_message.clone(),
        })
    }

    /// Steps shared by both modes: rehydrate, seed, append and persist the
    /// user message.
    async fn begin_turn(&self, request: &ChatRequest) -> SessionResult<(History, Chat)> {
        let mut history = self.history(request.state.clone());
        let mut chat = Chat::new(self.provider.clone());

        let restored = history.load(&mut chat).await?;
        if restored == 0 {
            if let Some(prompt) = &self.system_prompt {
                let system = Message::system(prompt.clone());
                chat.add(system.clone());
                history.save(&system).await?;
            }
        }

        let user = Message::user(request.input.clone());
        chat.add(user.clone());
        history.save(&user).await?;

        debug!(
            session = ?history.id(),
            restored,
            "Turn started with {} messages",
            chat.len()
        );
        Ok((history, chat))
    }

    /// Blocking turn: returns the full reply with the state token to resume.
    pub async fn handle(&self, request: &ChatRequest) -> SessionResult<ChatReply> {
        if let Some(reply) = self.welcome(request) {
            return Ok(reply);
        }

        let model = self.model_for(request);
        let (mut history, mut chat) = self.begin_turn(request).await?;

        let text = chat.complete(&model).await?;
        history.save(&Message::assistant(text.clone())).await?;

        info!(session = ?history.id(), model = %model, "Turn completed ({} chars)", text.len());
        Ok(ChatReply {
            state: history.id().map(str::to_string),
            response: text,
        })
    }

    /// Streaming turn: fragments as they arrive, then `Done` with the state.
    ///
    /// The assistant reply is persisted only after the upstream stream is
    /// exhausted. Dropping the returned stream early releases the upstream
    /// connection and saves nothing further.
    pub async fn handle_stream(&self, request: ChatRequest) -> SessionResult<SessionStream> {
        if let Some(reply) = self.welcome(&request) {
            let events = vec![
                Ok(SessionEvent::Fragment(reply.response.clone())),
                Ok(SessionEvent::Done(reply)),
            ];
            return Ok(Box::pin(futures::stream::iter(events)));
        }

        let model = self.model_for(&request);
        let (mut history, mut chat) = self.begin_turn(&request).await?;

        let stream = async_stream::try_stream! {
            let mut fragments = chat.stream(&model).await?;
            while let Some(fragment) = fragments.next().await {
                yield SessionEvent::Fragment(fragment?);
            }
            drop(fragments);

            let text = chat
                .messages()
                .last()
                .map(|m| m.content.clone())
                .unwrap_or_default();
            history.save(&Message::assistant(text.clone())).await?;

            info!(session = ?history.id(), model = %model, "Streamed turn completed ({} chars)", text.len());
            yield SessionEvent::Done(ChatReply {
                state: history.id().map(str::to_string),
                response: text,
            });
        };

        Ok(Box::pin(stream))
    }

    /// Persisted messages of a session; empty for unknown or expired tokens.
    pub async fn inspect(&self, state: &str) -> SessionResult<Vec<Message>> {
        self.history(Some(state.to_string())).entries().await
    }

    pub async fn list_models(&self) -> SessionResult<Vec<String>> {
        self.provider.list_models().await
    }

    pub async fn ping_store(&self) -> SessionResult<()> {
        self.store.ping().await
    }
}
