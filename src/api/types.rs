//! Wire types for the LM Studio REST API (`/api/v0`).
//!
//! These mirror the JSON the server sends and accepts. Responses are checked
//! with `validate()` after decoding so that a payload which deserializes but
//! breaks the server's own contract (wrong `object` tag, no choices, token
//! counts that don't add up) is reported as a schema mismatch.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// Models
// ============================================================================

/// Kind of model as reported by the catalog.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ModelType {
    Llm,
    Embeddings,
    /// Vision-language model
    Vlm,
}

/// A single catalog entry from `/api/v0/models`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ModelData {
    pub id: String,
    pub object: String,
    #[serde(rename = "type")]
    pub model_type: ModelType,
    pub publisher: String,
    pub arch: String,
    pub compatibility_type: String,
    pub quantization: String,
    pub state: String, // "loaded" or "not-loaded"
    pub max_context_length: u64,
}

impl ModelData {
    pub fn is_loaded(&self) -> bool {
        self.state == "loaded"
    }

    pub fn validate(&self) -> Result<(), String> {
        expect_object(&self.object, "model")
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ModelsResponse {
    pub object: String,
    pub data: Vec<ModelData>,
}

impl ModelsResponse {
    pub fn validate(&self) -> Result<(), String> {
        expect_object(&self.object, "list")?;
        self.data.iter().try_for_each(ModelData::validate)
    }
}

// ============================================================================
// Requests
// ============================================================================

/// Conversation role (OpenAI terminology)
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: Role::System, content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: Role::Assistant, content: content.into() }
    }
}

/// Body for `POST /api/v0/chat/completions`.
/// `None` fields are omitted so the server default applies.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct ChatCompletionRequest {
    pub model: String,
    pub messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop: Option<String>,
}

/// Body for `POST /api/v0/completions`.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct TextCompletionRequest {
    pub model: String,
    pub prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop: Option<String>,
}

// ============================================================================
// Responses
// ============================================================================

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ChatChoice {
    pub index: u32,
    pub message: ChatMessage,
    #[serde(default)]
    pub logprobs: Option<serde_json::Value>,
    pub finish_reason: String, // "stop", "length", ...
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct TextChoice {
    pub index: u32,
    pub text: String,
    #[serde(default)]
    pub logprobs: Option<serde_json::Value>,
    pub finish_reason: String,
}

/// Token accounting for one request.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApiUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

impl ApiUsage {
    pub fn validate(&self) -> Result<(), String> {
        if self.prompt_tokens.checked_add(self.completion_tokens) != Some(self.total_tokens) {
            return Err(format!(
                "usage mismatch: prompt_tokens ({}) + completion_tokens ({}) != total_tokens ({})",
                self.prompt_tokens, self.completion_tokens, self.total_tokens
            ));
        }
        Ok(())
    }
}

/// Performance metrics LM Studio attaches to every completion.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Stats {
    pub tokens_per_second: f64,
    pub time_to_first_token: f64,
    pub generation_time: f64,
    pub stop_reason: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ModelInfo {
    pub arch: String,
    pub quant: String,
    pub format: String,
    pub context_length: u64,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Runtime {
    pub name: String,
    pub version: String,
    pub supported_formats: Vec<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ChatCompletionResponse {
    pub id: String,
    pub object: String,
    pub created: i64,
    pub model: String,
    pub choices: Vec<ChatChoice>,
    pub usage: ApiUsage,
    pub stats: Stats,
    pub model_info: ModelInfo,
    pub runtime: Runtime,
}

impl ChatCompletionResponse {
    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.created, 0)
    }

    pub fn validate(&self) -> Result<(), String> {
        expect_object(&self.object, "chat.completion")?;
        if self.choices.is_empty() {
            return Err("response has no choices".to_string());
        }
        if let Some(choice) = self.choices.iter().find(|c| c.message.role != Role::Assistant) {
            return Err(format!(
                "choice {} has role {:?}, expected assistant",
                choice.index, choice.message.role
            ));
        }
        self.usage.validate()
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct TextCompletionResponse {
    pub id: String,
    pub object: String,
    pub created: i64,
    pub model: String,
    pub choices: Vec<TextChoice>,
    pub usage: ApiUsage,
    pub stats: Stats,
    pub model_info: ModelInfo,
    pub runtime: Runtime,
}

impl TextCompletionResponse {
    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.created, 0)
    }

    pub fn validate(&self) -> Result<(), String> {
        expect_object(&self.object, "text_completion")?;
        if self.choices.is_empty() {
            return Err("response has no choices".to_string());
        }
        self.usage.validate()
    }
}

fn expect_object(actual: &str, expected: &str) -> Result<(), String> {
    if actual != expected {
        return Err(format!("expected object \"{expected}\", got \"{actual}\""));
    }
    Ok(())
}
