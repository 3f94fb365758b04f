//! Incremental decoder for OpenAI-compatible `text/event-stream` bodies.
//!
//! Network chunks do not respect line boundaries, so bytes are buffered
//! until a full line is available. Each `data:` line carries either a JSON
//! delta or the `[DONE]` sentinel:
//!
//! ```text
//! data: {"choices":[{"delta":{"content":"Hel"}}]}
//!
//! data: {"choices":[{"delta":{"content":"lo"}}]}
//!
//! data: [DONE]
//! ```

use serde::Deserialize;

use crate::error::{SessionError, SessionResult};

const DONE_SENTINEL: &str = "[DONE]";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseEvent {
    /// Non-empty text fragment. Empty deltas are dropped by the decoder.
    Delta(String),
    Done,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionChunk {
    #[serde(default)]
    choices: Vec<ChoiceChunk>,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct ChoiceChunk {
    #[serde(default)]
    delta: Option<Delta>,
}

#[derive(Debug, Deserialize)]
struct Delta {
    content: Option<String>,
}

/// Parse one SSE line. Comments, blank lines and non-`data` fields yield `None`.
pub fn parse_sse_line(line: &str) -> SessionResult<Option<SseEvent>> {
    let line = line.trim_end_matches(['\r', '\n']);

    let Some(payload) = line.strip_prefix("data:") else {
        return Ok(None);
    };
    let payload = payload.trim();

    if payload.is_empty() {
        return Ok(None);
    }
    if payload == DONE_SENTINEL {
        return Ok(Some(SseEvent::Done));
    }

    let chunk: ChatCompletionChunk = serde_json::from_str(payload)
        .map_err(|e| SessionError::InvalidResponse(format!("failed to parse SSE delta: {e}")))?;

    if let Some(err) = chunk.error {
        return Err(SessionError::Upstream(format!("error event in stream: {err}")));
    }

    let text = chunk
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.delta)
        .and_then(|d| d.content)
        .filter(|t| !t.is_empty());

    Ok(text.map(SseEvent::Delta))
}

#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    /// Feed raw body bytes; returns the events of every completed line.
    ///
    /// Decoding stops at the first bad line, which is returned last so the
    /// fragments before it are not lost.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<SessionResult<SseEvent>> {
        self.buffer.extend_from_slice(bytes);

        let mut events = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            match parse_sse_line(&String::from_utf8_lossy(&line)) {
                Ok(Some(event)) => events.push(Ok(event)),
                Ok(None) => {}
                Err(e) => {
                    events.push(Err(e));
                    break;
                }
            }
        }
        events
    }

    /// Flush a trailing line that arrived without a newline.
    pub fn finish(&mut self) -> SessionResult<Option<SseEvent>> {
        if self.buffer.is_empty() {
            return Ok(None);
        }
        let line = std::mem::take(&mut self.buffer);
        parse_sse_line(&String::from_utf8_lossy(&line))
    }
}
