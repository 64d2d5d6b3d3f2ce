//! LM Studio provider implementation using the chat completions API.
//!
//! Translates a [`Conversation`] into `/api/v0/chat/completions` messages and
//! the response back into text parts plus usage:
//! - instructions become a leading system message
//! - system/user/assistant text parts keep their order
//! - attachments and tool traffic are rejected, never dropped

use async_trait::async_trait;
use log::{debug, info, warn};

use crate::api::{ChatCompletionResponse, ChatOptions, LmStudioClient, Message};
use crate::inference::{
    AdapterWarning, CompletionProvider, CompletionRequest, Conversation, MessagePart,
    ModelResponse, ModelSettings, ProviderError, TextPart, Usage,
};

// ============================================================================
// Translation Layer
// ============================================================================

/// Flattens a conversation into the ordered role/content list the server expects.
fn conversation_to_messages(conversation: &Conversation) -> Result<Vec<Message>, ProviderError> {
    let mut messages = Vec::new();

    if let Some(instructions) = conversation.instructions.as_ref().filter(|s| !s.is_empty()) {
        messages.push(Message::system(instructions.clone()));
    }

    for part in conversation.messages.iter().flat_map(|m| &m.parts) {
        let message = match part {
            MessagePart::SystemPrompt { content } => Message::system(content.clone()),
            MessagePart::UserPrompt { content } => Message::user(content.clone()),
            MessagePart::Assistant { content } => Message::assistant(content.clone()),
            MessagePart::Attachment { attachment } => {
                return Err(ProviderError::Unsupported(format!(
                    "{} attachments cannot be sent to LM Studio chat completions",
                    attachment.kind()
                )));
            }
            MessagePart::ToolCall { tool_name, .. } | MessagePart::ToolReturn { tool_name, .. } => {
                return Err(ProviderError::Unsupported(format!(
                    "{} parts are not supported (tool `{}`)",
                    part.kind(),
                    tool_name
                )));
            }
        };
        messages.push(message);
    }

    Ok(messages)
}

/// Pulls sampling options out of the settings bag.
///
/// Unset or wrong-typed values stay `None` so the field is left out of the
/// request body. Only the first stop sequence is forwarded.
fn settings_to_options(settings: &ModelSettings) -> (ChatOptions, Vec<AdapterWarning>) {
    let mut warnings = Vec::new();

    let stop = settings.stop_sequences().and_then(|mut sequences| {
        if sequences.is_empty() {
            return None;
        }
        let kept = sequences.remove(0);
        if !sequences.is_empty() {
            warn!(
                "LM Studio accepts a single stop sequence; dropping {:?}",
                sequences
            );
            warnings.push(AdapterWarning::StopSequencesTruncated {
                kept: kept.clone(),
                dropped: sequences,
            });
        }
        Some(kept)
    });

    let options = ChatOptions {
        temperature: settings.temperature(),
        max_tokens: settings.max_tokens(),
        stream: false,
        stop,
    };
    (options, warnings)
}

/// Repackages a chat response: one text part per choice, usage renamed.
fn response_to_model(
    response: ChatCompletionResponse,
    model_name: &str,
    warnings: Vec<AdapterWarning>,
) -> (ModelResponse, Usage) {
    let usage = Usage {
        input_tokens: response.usage.prompt_tokens,
        output_tokens: response.usage.completion_tokens,
        total_tokens: response.usage.total_tokens,
    };

    let (parts, finish_reasons): (Vec<TextPart>, Vec<String>) = response
        .choices
        .into_iter()
        .map(|choice| {
            (
                TextPart {
                    content: choice.message.content,
                },
                choice.finish_reason,
            )
        })
        .unzip();

    let model_response = ModelResponse {
        parts,
        model_name: model_name.to_string(),
        finish_reasons,
        warnings,
    };
    (model_response, usage)
}

// ============================================================================
// Provider Implementation
// ============================================================================

/// LM Studio provider bound to one model (local inference server)
pub struct LmStudioProvider {
    client: LmStudioClient,
    model_name: String,
    defaults: ModelSettings,
}

impl LmStudioProvider {
    pub fn new(client: LmStudioClient, model_name: impl Into<String>) -> Result<Self, ProviderError> {
        let model_name = model_name.into();
        if model_name.trim().is_empty() {
            return Err(ProviderError::Config("model name must not be empty".to_string()));
        }
        Ok(Self {
            client,
            model_name,
            defaults: ModelSettings::default(),
        })
    }

    /// Settings applied to every call; per-call settings override them key by key.
    pub fn with_defaults(mut self, defaults: ModelSettings) -> Self {
        self.defaults = defaults;
        self
    }

    pub fn client(&self) -> &LmStudioClient {
        &self.client
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    pub fn system(&self) -> &str {
        "LM Studio"
    }

    pub fn defaults(&self) -> &ModelSettings {
        &self.defaults
    }
}

#[async_trait]
impl CompletionProvider for LmStudioProvider {
    fn name(&self) -> &str {
        "lm-studio"
    }

    fn base_url(&self) -> &str {
        self.client.base_url()
    }

    async fn generate(
        &self,
        request: CompletionRequest<'_>,
    ) -> Result<(ModelResponse, Usage), ProviderError> {
        let messages = conversation_to_messages(request.conversation)?;

        let settings = match request.settings {
            Some(overrides) => self.defaults.merged(overrides),
            None => self.defaults.clone(),
        };
        let (options, warnings) = settings_to_options(&settings);

        info!(
            "LM Studio generate: model={}, message_count={}",
            self.model_name,
            messages.len()
        );

        let response = self
            .client
            .create_chat_completion(&self.model_name, &messages, options)
            .await
            .inspect_err(|e| warn!("LM Studio generate failed: {}", e))?;

        debug!(
            "LM Studio generate finished: {} choices, finish_reasons={:?}",
            response.choices.len(),
            response.choices.iter().map(|c| &c.finish_reason).collect::<Vec<_>>()
        );

        Ok(response_to_model(response, &self.model_name, warnings))
    }
}
