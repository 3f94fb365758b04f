use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use super::chat::Chat;
use crate::config::DEFAULT_SESSION_TTL_SECONDS;
use crate::error::SessionResult;
use crate::models::{Message, MessageEncoding};
use crate::store::{KeyValueStore, Namespace};

/// Type tag between the namespace and the token in every history key.
pub const HISTORY_KEY_TAG: &str = "history:";

#[derive(Debug, Clone)]
pub struct HistoryOptions {
    /// Existing state token to resume; a new one is minted on first save.
    pub state: Option<String>,
    /// Sliding retention window, refreshed by every save.
    pub ttl: Duration,
    pub encoding: MessageEncoding,
}

impl Default for HistoryOptions {
    fn default() -> Self {
        Self {
            state: None,
            ttl: Duration::from_secs(DEFAULT_SESSION_TTL_SECONDS),
            encoding: MessageEncoding::default(),
        }
    }
}

impl HistoryOptions {
    pub fn with_state(state: Option<String>) -> Self {
        Self {
            state: state.filter(|s| !s.trim().is_empty()),
            ..Self::default()
        }
    }
}

/// Durable, expiring, append-only message log of one session.
pub struct History {
    store: Arc<dyn KeyValueStore>,
    namespace: Namespace,
    token: Option<String>,
    ttl: Duration,
    encoding: MessageEncoding,
}

impl History {
    pub fn new(store: Arc<dyn KeyValueStore>, namespace: Namespace, options: HistoryOptions) -> Self {
        Self {
            store,
            namespace,
            token: options.state.filter(|s| !s.trim().is_empty()),
            ttl: options.ttl,
            encoding: options.encoding,
        }
    }

    /// Current session token; always `Some` after the first save.
    pub fn id(&self) -> Option<&str> {
        self.token.as_deref()
    }

    fn key_for(token: &str) -> String {
        format!("{}{}", HISTORY_KEY_TAG, token)
    }

    /// Append one message and push the expiry out to `ttl` from now.
    pub async fn save(&mut self, message: &Message) -> SessionResult<()> {
        let token = self
            .token
            .get_or_insert_with(|| uuid::Uuid::new_v4().to_string())
            .clone();
        let key = Self::key_for(&token);

        self.store
            .append_with_ttl(&self.namespace, &key, &self.encoding.encode(message), self.ttl)
            .await?;

        debug!(session = %token, role = %message.role, "Saved message to history");
        Ok(())
    }

    /// Save a message given in `"role:content"` form.
    pub async fn save_tagged(&mut self, encoded: &str) -> SessionResult<()> {
        let message = Message::parse_tagged(encoded)?;
        self.save(&message).await
    }

    /// Persisted messages in stored order. A missing or expired key yields
    /// an empty list; undecodable entries are skipped with a warning.
    pub async fn entries(&self) -> SessionResult<Vec<Message>> {
        let Some(token) = self.token.as_deref() else {
            return Ok(Vec::new());
        };

        let raw = self
            .store
            .read_list(&self.namespace, &Self::key_for(token))
            .await?;

        Ok(raw
            .iter()
            .filter_map(|entry| match Message::decode(entry) {
                Ok(message) => Some(message),
                Err(e) => {
                    warn!(session = %token, "Skipping undecodable history entry: {}", e);
                    None
                }
            })
            .collect())
    }

    /// Replay the stored messages into `chat`, returning how many were added.
    pub async fn load(&self, chat: &mut Chat) -> SessionResult<usize> {
        let messages = self.entries().await?;
        let count = messages.len();
        for message in messages {
            chat.add(message);
        }
        debug!(session = ?self.token, "Loaded {} messages from history", count);
        Ok(count)
    }
}
