mod classifier;
mod error;
mod provider;
mod repair;
mod service;
pub mod signals;

pub use classifier::{classify, classify_on, next_monday, priority_of};
pub use error::AiError;
pub use provider::{
    CompletionProvider, CompletionRequest, OpenAiCompatibleProvider, RetryingProvider,
};
pub use repair::{parse_json_object, UnvalidatedAnalysis};
pub use service::{fallback_reply, tone_instruction, AiService, ReplyPolicy};
