pub mod chat;
pub mod completion;
pub mod history;
pub mod session;

pub use chat::{Chat, ChatStream, StreamState};
pub use completion::{CompletionProvider, FragmentStream, OpenAiCompatClient};
pub use history::{History, HistoryOptions};
pub use session::{SessionEvent, SessionOrchestrator, SessionStream};
