//! Completion client: blocking and streamed chat completions

mod openai;
mod provider;
pub mod sse;

pub use openai::OpenAiCompatClient;
pub use provider::{CompletionProvider, FragmentStream};
