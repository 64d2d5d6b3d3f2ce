use std::fmt;

use async_trait::async_trait;

use super::types::{Conversation, ModelResponse, ModelSettings, Usage};
use crate::api::ClientError;

/// Errors that can occur during provider operations.
/// Each variant names the layer that failed; none of them are retried here.
#[derive(Debug, Clone, PartialEq)]
pub enum ProviderError {
    /// Provider misconfigured (bad base URL, empty model name).
    Config(String),
    /// The conversation contains something the target API can't express.
    Unsupported(String),
    /// The server call failed; the inner error says whether at transport or schema level.
    Request(ClientError),
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderError::Config(msg) => write!(f, "config error: {msg}"),
            ProviderError::Unsupported(msg) => write!(f, "unsupported input: {msg}"),
            ProviderError::Request(e) => write!(f, "LM Studio {e}"),
        }
    }
}

impl std::error::Error for ProviderError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ProviderError::Request(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ClientError> for ProviderError {
    fn from(e: ClientError) -> Self {
        ProviderError::Request(e)
    }
}

/// Everything a provider needs to fulfill a completion request.
pub struct CompletionRequest<'a> {
    pub conversation: &'a Conversation,
    /// Per-call settings, overlaid on the provider's defaults.
    pub settings: Option<&'a ModelSettings>,
}

#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Returns the name of the provider.
    fn name(&self) -> &str;

    /// Base URL of the server the provider talks to.
    fn base_url(&self) -> &str;

    /// Runs one request/response cycle. No partial results on failure.
    async fn generate(
        &self,
        request: CompletionRequest<'_>,
    ) -> Result<(ModelResponse, Usage), ProviderError>;
}
