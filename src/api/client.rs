use std::fmt;

use log::{debug, info, warn};
use serde::de::DeserializeOwned;
use serde_json::Value;

use super::http::{HttpClient, HttpOptions, TransportError};
use super::types::{
    ChatCompletionRequest, ChatCompletionResponse, Message, ModelData, ModelsResponse,
    TextCompletionRequest, TextCompletionResponse,
};

pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:1234";
pub const DEFAULT_TEMPERATURE: f64 = 0.7;
pub const DEFAULT_MAX_TOKENS: u32 = 100;

const MODELS_PATH: &str = "api/v0/models";
const CHAT_COMPLETIONS_PATH: &str = "api/v0/chat/completions";
const COMPLETIONS_PATH: &str = "api/v0/completions";

/// Errors from the LM Studio client.
///
/// `Transport` means we never got usable JSON; `Schema` means we did, but it
/// wasn't the shape the endpoint promises. Callers can always tell them apart.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientError {
    Transport(TransportError),
    Schema { endpoint: String, message: String },
    /// The request asks for something this client doesn't do (e.g. streaming).
    Unsupported(String),
}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClientError::Transport(e) => write!(f, "request failed: {e}"),
            ClientError::Schema { endpoint, message } => {
                write!(f, "unexpected response from {endpoint}: {message}")
            }
            ClientError::Unsupported(msg) => write!(f, "unsupported request: {msg}"),
        }
    }
}

impl std::error::Error for ClientError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ClientError::Transport(e) => Some(e),
            _ => None,
        }
    }
}

impl From<TransportError> for ClientError {
    fn from(e: TransportError) -> Self {
        ClientError::Transport(e)
    }
}

/// Sampling options for chat completions.
///
/// `Default` applies the client defaults (temperature 0.7, 100 tokens, no
/// streaming). Setting a field to `None` omits it from the body instead.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatOptions {
    pub temperature: Option<f64>,
    pub max_tokens: Option<u32>,
    pub stream: bool,
    pub stop: Option<String>,
}

impl Default for ChatOptions {
    fn default() -> Self {
        Self {
            temperature: Some(DEFAULT_TEMPERATURE),
            max_tokens: Some(DEFAULT_MAX_TOKENS),
            stream: false,
            stop: None,
        }
    }
}

/// Sampling options for raw text completions. Same defaults as [`ChatOptions`].
#[derive(Debug, Clone, PartialEq)]
pub struct TextOptions {
    pub temperature: Option<f64>,
    pub max_tokens: Option<u32>,
    pub stream: bool,
    pub stop: Option<String>,
}

impl Default for TextOptions {
    fn default() -> Self {
        Self {
            temperature: Some(DEFAULT_TEMPERATURE),
            max_tokens: Some(DEFAULT_MAX_TOKENS),
            stream: false,
            stop: None,
        }
    }
}

/// Typed client for the LM Studio REST API.
#[derive(Debug, Clone)]
pub struct LmStudioClient {
    http: HttpClient,
}

impl LmStudioClient {
    pub fn new(base_url: &str, options: HttpOptions) -> Result<Self, ClientError> {
        Ok(Self {
            http: HttpClient::new(base_url, options)?,
        })
    }

    /// Client for the default local server with default transport options.
    pub fn local() -> Result<Self, ClientError> {
        Self::new(DEFAULT_BASE_URL, HttpOptions::default())
    }

    pub fn from_http(http: HttpClient) -> Self {
        Self { http }
    }

    pub fn base_url(&self) -> &str {
        self.http.base_url()
    }

    /// Lists every model the server knows about, loaded or not.
    pub async fn list_models(&self) -> Result<ModelsResponse, ClientError> {
        let json = self.http.get(MODELS_PATH, &[], None).await?;
        let models: ModelsResponse = decode(MODELS_PATH, json, ModelsResponse::validate)?;
        debug!("Server reported {} models", models.data.len());
        Ok(models)
    }

    pub async fn get_model(&self, model_id: &str) -> Result<ModelData, ClientError> {
        // Ids are a single path segment; `/`, `?` and `#` must not leak into the URL.
        let endpoint = format!("{MODELS_PATH}/{}", urlencoding::encode(model_id));
        let json = self.http.get(&endpoint, &[], None).await?;
        decode(&endpoint, json, ModelData::validate)
    }

    pub async fn create_chat_completion(
        &self,
        model: &str,
        messages: &[Message],
        options: ChatOptions,
    ) -> Result<ChatCompletionResponse, ClientError> {
        if options.stream {
            return Err(ClientError::Unsupported(
                "streaming chat completions are not supported".to_string(),
            ));
        }

        let request = ChatCompletionRequest {
            model: model.to_string(),
            messages: messages.to_vec(),
            temperature: options.temperature,
            max_tokens: options.max_tokens,
            stream: Some(options.stream),
            stop: options.stop,
        };

        info!(
            "LM Studio chat request: model={}, messages={}, temperature={:?}, max_tokens={:?}",
            model,
            request.messages.len(),
            request.temperature,
            request.max_tokens
        );

        let json = self.http.post(CHAT_COMPLETIONS_PATH, &request, None).await?;
        let response: ChatCompletionResponse =
            decode(CHAT_COMPLETIONS_PATH, json, ChatCompletionResponse::validate)?;

        debug!(
            "Chat completion {}: {} choices, {} total tokens",
            response.id,
            response.choices.len(),
            response.usage.total_tokens
        );
        Ok(response)
    }

    pub async fn create_text_completion(
        &self,
        model: &str,
        prompt: &str,
        options: TextOptions,
    ) -> Result<TextCompletionResponse, ClientError> {
        if options.stream {
            return Err(ClientError::Unsupported(
                "streaming text completions are not supported".to_string(),
            ));
        }

        let request = TextCompletionRequest {
            model: model.to_string(),
            prompt: prompt.to_string(),
            temperature: options.temperature,
            max_tokens: options.max_tokens,
            stream: Some(options.stream),
            stop: options.stop,
        };

        info!(
            "LM Studio text request: model={}, prompt_len={}, stop={:?}",
            model,
            prompt.len(),
            request.stop
        );

        let json = self.http.post(COMPLETIONS_PATH, &request, None).await?;
        decode(COMPLETIONS_PATH, json, TextCompletionResponse::validate)
    }
}

/// Decodes a JSON payload into `T` and runs its contract check.
fn decode<T: DeserializeOwned>(
    endpoint: &str,
    json: Value,
    validate: fn(&T) -> Result<(), String>,
) -> Result<T, ClientError> {
    let schema_error = |message: String| {
        warn!("Schema mismatch from {}: {}", endpoint, message);
        ClientError::Schema {
            endpoint: endpoint.to_string(),
            message,
        }
    };

    let value: T = serde_json::from_value(json).map_err(|e| schema_error(e.to_string()))?;
    validate(&value).map_err(schema_error)?;
    Ok(value)
}
