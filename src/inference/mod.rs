pub mod provider;
pub mod providers;
pub mod types;

pub use provider::{CompletionProvider, CompletionRequest, ProviderError};
pub use providers::LmStudioProvider;
pub use types::{
    AdapterWarning, Attachment, Conversation, MessagePart, ModelMessage, ModelResponse,
    ModelSettings, TextPart, Usage,
};
