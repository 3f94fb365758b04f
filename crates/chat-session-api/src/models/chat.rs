use serde::{Deserialize, Serialize};

use super::message::Message;

// ===== REQUEST MODELS =====

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChatRequest {
    pub input: String,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub stream: bool,
    #[serde(default)]
    pub model: Option<String>,
}

// ===== RESPONSE MODELS =====

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatReply {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    pub response: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ModelList {
    pub models: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HistoryView {
    pub state: String,
    pub messages: Vec<Message>,
}

// ===== SSE EVENT MODELS =====

#[derive(Debug, Serialize)]
pub struct MessageChunk {
    pub delta: String,  // streaming text fragment
}

#[derive(Debug, Serialize)]
pub struct ErrorInfo {
    pub code: String,
    pub message: String,
}
