//! Per-turn conversation buffer
//!
//! A [`Chat`] owns the ordered messages used to build one completion
//! request. It is never shared between requests; persistence is the job of
//! [`History`](super::history::History).

use futures::stream::Stream;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tracing::debug;

use crate::error::SessionResult;
use crate::models::Message;
use crate::services::completion::{CompletionProvider, FragmentStream};

pub struct Chat {
    provider: Arc<dyn CompletionProvider>,
    messages: Vec<Message>,
}

impl Chat {
    pub fn new(provider: Arc<dyn CompletionProvider>) -> Self {
        Self {
            provider,
            messages: Vec::new(),
        }
    }

    pub fn add(&mut self, message: Message) {
        self.messages.push(message);
    }

    /// Append a message given in `"role:content"` form.
    pub fn add_tagged(&mut self, encoded: &str) -> SessionResult<()> {
        self.add(Message::parse_tagged(encoded)?);
        Ok(())
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Blocking completion: appends the assistant reply and returns its text.
    pub async fn complete(&mut self, model: &str) -> SessionResult<String> {
        let reply = self.provider.complete(&self.messages, model).await?;
        let text = reply.content.clone();
        self.messages.push(reply);
        Ok(text)
    }

    /// Streamed completion. The assistant reply is appended only once the
    /// returned stream has been drained to the end.
    pub async fn stream(&mut self, model: &str) -> SessionResult<ChatStream<'_>> {
        let inner = self.provider.stream(&self.messages, model).await?;
        Ok(ChatStream {
            inner,
            messages: &mut self.messages,
            accumulated: String::new(),
            state: StreamState::Streaming,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Streaming,
    /// Upstream signalled completion; the reply was appended to the buffer.
    Exhausted,
    /// An error item was produced; the buffer was left untouched.
    Failed,
}

/// Fragment stream bound to the buffer it will append to.
///
/// Dropping it before exhaustion abandons the turn: the upstream connection
/// is released and the buffer keeps its previous contents.
pub struct ChatStream<'a> {
    inner: FragmentStream,
    messages: &'a mut Vec<Message>,
    accumulated: String,
    state: StreamState,
}

impl ChatStream<'_> {
    pub fn state(&self) -> StreamState {
        self.state
    }

    /// Text received so far.
    pub fn text(&self) -> &str {
        &self.accumulated
    }
}

impl Drop for ChatStream<'_> {
    fn drop(&mut self) {
        // Abandoned: dropped while still streaming, nothing is appended.
        if self.state == StreamState::Streaming {
            debug!(
                "Stream abandoned after {} bytes; buffer left unchanged",
                self.accumulated.len()
            );
        }
    }
}

impl Stream for ChatStream<'_> {
    type Item = SessionResult<String>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.state != StreamState::Streaming {
            return Poll::Ready(None);
        }

        match this.inner.as_mut().poll_next(cx) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(Some(Ok(fragment))) => {
                this.accumulated.push_str(&fragment);
                Poll::Ready(Some(Ok(fragment)))
            }
            Poll::Ready(Some(Err(e))) => {
                this.state = StreamState::Failed;
                Poll::Ready(Some(Err(e)))
            }
            Poll::Ready(None) => {
                this.state = StreamState::Exhausted;
                debug!("Stream exhausted after {} bytes", this.accumulated.len());
                this.messages
                    .push(Message::assistant(std::mem::take(&mut this.accumulated)));
                Poll::Ready(None)
            }
        }
    }
}


#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;
    use crate::error::SessionError;
    use crate::models::Role;
    use futures::StreamExt;

    fn chat_with(provider: impl CompletionProvider + 'static) -> Chat {
        Chat::new(Arc::new(provider))
    }

    #[test]
    fn test_add_appends_last() {
        let mut chat = chat_with(ScriptedProvider::new("x"));
        let samples = [Message::system("s"), Message::user("u"), Message::assistant("a")];

        for msg in samples {
            chat.add(msg.clone());
            assert_eq!(chat.messages().last(), Some(&msg));
        }
        assert_eq!(chat.len(), 3);
    }

    #[test]
    fn test_add_tagged() {
        let mut chat = chat_with(ScriptedProvider::new("x"));
        chat.add_tagged("user:2+2?").unwrap();
        assert_eq!(chat.messages(), &[Message::user("2+2?")]);

        let err = chat.add_tagged("bot:hello").unwrap_err();
        assert_eq!(err, SessionError::InvalidRole("bot".into()));
        assert_eq!(chat.len(), 1);
    }

    #[tokio::test]
    async fn test_complete_appends_one_assistant_message() {
        let mut chat = chat_with(ScriptedProvider::new("4"));
        chat.add(Message::user("2+2?"));

        let text = chat.complete("m").await.unwrap();

        assert_eq!(text, "4");
        assert_eq!(chat.len(), 2);
        assert_eq!(chat.messages()[1], Message::assistant("4"));
    }

    #[tokio::test]
    async fn test_complete_failure_leaves_buffer() {
        let mut chat = chat_with(FailingProvider(SessionError::RateLimited { retry_after_ms: None }));
        chat.add(Message::user("hi"));

        let err = chat.complete("m").await.unwrap_err();
        assert!(matches!(err, SessionError::RateLimited { .. }));
        assert_eq!(chat.messages(), &[Message::user("hi")]);
    }

    #[tokio::test]
    async fn test_stream_equivalent_to_complete() {
        let reply = "The answer is 4, obviously.";
        let provider = Arc::new(ScriptedProvider::with_fragments(reply, 3));

        let mut blocking = Chat::new(provider.clone());
        blocking.add(Message::user("2+2?"));
        let expected = blocking.complete("m").await.unwrap();

        let mut streaming = Chat::new(provider.clone());
        streaming.add(Message::user("2+2?"));
        let fragments: Vec<String> = {
            let stream = streaming.stream("m").await.unwrap();
            stream.map(|f| f.unwrap()).collect().await
        };

        assert!(fragments.len() > 1);
        assert_eq!(fragments.concat(), expected);
        assert_eq!(streaming.messages(), blocking.messages());

        // Same request both ways
        let seen = provider.seen.lock();
        assert_eq!(seen[0], seen[1]);
    }

    #[tokio::test]
    async fn test_stream_appends_only_when_exhausted() {
        let mut chat = chat_with(ScriptedProvider::with_fragments("abcdef", 2));
        chat.add(Message::user("go"));

        let mut stream = chat.stream("m").await.unwrap();
        assert_eq!(stream.next().await.unwrap().unwrap(), "ab");
        assert_eq!(stream.text(), "ab");
        assert_eq!(stream.next().await.unwrap().unwrap(), "cd");
        assert_eq!(stream.next().await.unwrap().unwrap(), "ef");
        assert_eq!(stream.state(), StreamState::Streaming);
        assert!(stream.next().await.is_none());
        assert_eq!(stream.state(), StreamState::Exhausted);
        // Polling past the end is harmless
        assert!(stream.next().await.is_none());
        drop(stream);

        assert_eq!(chat.len(), 2);
        assert_eq!(chat.messages()[1], Message::assistant("abcdef"));
    }

    #[tokio::test]
    async fn test_abandoned_stream_leaves_buffer_unmodified() {
        let mut chat = chat_with(ScriptedProvider::with_fragments("abcdef", 2));
        chat.add(Message::user("go"));

        {
            let mut stream = chat.stream("m").await.unwrap();
            assert_eq!(stream.next().await.unwrap().unwrap(), "ab");
            // dropped here, before exhaustion
        }

        assert_eq!(chat.messages(), &[Message::user("go")]);
    }

    #[tokio::test]
    async fn test_failed_stream_leaves_buffer_unmodified() {
        let mut chat = chat_with(BrokenStreamProvider);
        chat.add(Message::user("go"));

        let items: Vec<SessionResult<String>> = {
            let stream = chat.stream("m").await.unwrap();
            stream.collect().await
        };

        assert_eq!(items.len(), 3);
        assert!(matches!(items[2], Err(SessionError::UpstreamTimeout(_))));
        assert_eq!(chat.len(), 1);
        assert_eq!(chat.messages()[0].role, Role::User);
    }
}
