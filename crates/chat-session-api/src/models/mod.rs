pub mod chat;
pub mod message;

pub use chat::{ChatReply, ChatRequest};
pub use message::{Message, MessageEncoding, Role};
