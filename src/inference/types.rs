use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// ============================================================================
// Conversation
// ============================================================================

/// Non-text content attached to a user turn.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Attachment {
    ImageUrl { url: String },
    DocumentUrl { url: String },
    Binary { media_type: String, data: Vec<u8> },
}

impl Attachment {
    pub fn kind(&self) -> &'static str {
        match self {
            Attachment::ImageUrl { .. } => "image-url",
            Attachment::DocumentUrl { .. } => "document-url",
            Attachment::Binary { .. } => "binary",
        }
    }
}

/// One piece of a conversation turn, tagged by who produced it.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "part_kind", rename_all = "kebab-case")]
pub enum MessagePart {
    SystemPrompt { content: String },
    UserPrompt { content: String },
    /// Text the model produced on an earlier turn.
    Assistant { content: String },
    Attachment { attachment: Attachment },
    ToolCall { tool_name: String, args: Value },
    ToolReturn { tool_name: String, content: Value },
}

impl MessagePart {
    pub fn system(content: impl Into<String>) -> Self {
        MessagePart::SystemPrompt { content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        MessagePart::UserPrompt { content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        MessagePart::Assistant { content: content.into() }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            MessagePart::SystemPrompt { .. } => "system-prompt",
            MessagePart::UserPrompt { .. } => "user-prompt",
            MessagePart::Assistant { .. } => "assistant",
            MessagePart::Attachment { .. } => "attachment",
            MessagePart::ToolCall { .. } => "tool-call",
            MessagePart::ToolReturn { .. } => "tool-return",
        }
    }
}

/// A single turn: an ordered list of parts.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct ModelMessage {
    pub parts: Vec<MessagePart>,
}

impl ModelMessage {
    pub fn new(parts: Vec<MessagePart>) -> Self {
        Self { parts }
    }
}

/// Chronologically ordered conversation plus optional top-level instructions.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct Conversation {
    pub instructions: Option<String>,
    pub messages: Vec<ModelMessage>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = Some(instructions.into());
        self
    }

    /// Appends a turn and returns `self` for chaining.
    pub fn push(mut self, message: ModelMessage) -> Self {
        self.messages.push(message);
        self
    }

    pub fn add_user_message(&mut self, content: impl Into<String>) {
        self.messages.push(ModelMessage::new(vec![MessagePart::user(content)]));
    }
}

// ============================================================================
// Settings
// ============================================================================

/// Loosely-typed settings bag handed in by the caller.
///
/// Getters only return a value when the stored JSON has the expected type;
/// anything else reads as "not set".
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(transparent)]
pub struct ModelSettings(Map<String, Value>);

impl ModelSettings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds settings from a JSON value. Non-objects yield empty settings.
    pub fn from_json(value: Value) -> Self {
        match value {
            Value::Object(map) => Self(map),
            _ => Self::default(),
        }
    }

    pub fn set(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.0.insert(key.to_string(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns a copy of `self` with every key in `overrides` replacing ours.
    pub fn merged(&self, overrides: &ModelSettings) -> ModelSettings {
        let mut map = self.0.clone();
        map.extend(overrides.0.iter().map(|(k, v)| (k.clone(), v.clone())));
        Self(map)
    }

    /// Non-negative JSON integer that fits in `u32`.
    pub fn max_tokens(&self) -> Option<u32> {
        self.get("max_tokens")
            .and_then(Value::as_u64)
            .and_then(|n| u32::try_from(n).ok())
    }

    /// JSON float. Integer literals such as `1` are not accepted.
    pub fn temperature(&self) -> Option<f64> {
        self.get("temperature")
            .filter(|v| v.is_f64())
            .and_then(Value::as_f64)
    }

    /// Array of strings. An array containing anything else is not accepted.
    pub fn stop_sequences(&self) -> Option<Vec<String>> {
        let items = self.get("stop_sequences")?.as_array()?;
        items
            .iter()
            .map(|v| v.as_str().map(str::to_string))
            .collect()
    }
}

// ============================================================================
// Results
// ============================================================================

/// Normalized token accounting.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Usage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub total_tokens: u64,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct TextPart {
    pub content: String,
}

/// Something the adapter changed about the request that the caller should know.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub enum AdapterWarning {
    /// The server accepts one stop string; the rest were not sent.
    StopSequencesTruncated { kept: String, dropped: Vec<String> },
}

/// What a provider hands back for one request.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ModelResponse {
    /// One text part per returned choice, in choice order.
    pub parts: Vec<TextPart>,
    pub model_name: String,
    pub finish_reasons: Vec<String>,
    pub warnings: Vec<AdapterWarning>,
}

impl ModelResponse {
    /// All text parts joined with newlines.
    pub fn text(&self) -> String {
        self.parts
            .iter()
            .map(|p| p.content.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_settings_type_safe_extraction() {
        let settings = ModelSettings::from_json(json!({
            "max_tokens": 384,
            "temperature": 0.6,
            "stop_sequences": ["\n\n", "END"],
        }));
        assert_eq!(settings.max_tokens(), Some(384));
        assert_eq!(settings.temperature(), Some(0.6));
        assert_eq!(
            settings.stop_sequences(),
            Some(vec!["\n\n".to_string(), "END".to_string()])
        );
    }

    #[test]
    fn test_wrong_typed_settings_read_as_unset() {
        let settings = ModelSettings::from_json(json!({
            "max_tokens": "100",
            "temperature": 1,
            "stop_sequences": "END",
        }));
        assert_eq!(settings.max_tokens(), None);
        assert_eq!(settings.temperature(), None);
        assert_eq!(settings.stop_sequences(), None);
    }

    #[test]
    fn test_out_of_range_max_tokens_unset() {
        let negative = ModelSettings::new().set("max_tokens", -5);
        assert_eq!(negative.max_tokens(), None);
        let huge = ModelSettings::new().set("max_tokens", u64::MAX);
        assert_eq!(huge.max_tokens(), None);
        let fractional = ModelSettings::new().set("max_tokens", 12.5);
        assert_eq!(fractional.max_tokens(), None);
    }

    #[test]
    fn test_zero_temperature_is_kept() {
        let settings = ModelSettings::new().set("temperature", 0.0);
        assert_eq!(settings.temperature(), Some(0.0));
    }

    #[test]
    fn test_mixed_stop_sequences_rejected() {
        let settings = ModelSettings::from_json(json!({ "stop_sequences": ["END", 3] }));
        assert_eq!(settings.stop_sequences(), None);
    }

    #[test]
    fn test_merged_overrides_per_key() {
        let defaults = ModelSettings::new().set("max_tokens", 256).set("temperature", 0.2);
        let call = ModelSettings::new().set("temperature", 0.9);
        let merged = defaults.merged(&call);
        assert_eq!(merged.max_tokens(), Some(256));
        assert_eq!(merged.temperature(), Some(0.9));
        // Defaults are untouched
        assert_eq!(defaults.temperature(), Some(0.2));
    }

    #[test]
    fn test_non_object_settings_are_empty() {
        assert!(ModelSettings::from_json(json!([1, 2])).is_empty());
    }

    #[test]
    fn test_message_part_serialization_tags() {
        let part = MessagePart::user("hi");
        assert_eq!(
            serde_json::to_string(&part).unwrap(),
            r#"{"part_kind":"user-prompt","content":"hi"}"#
        );
        assert_eq!(part.kind(), "user-prompt");
    }

    #[test]
    fn test_response_text_joins_parts() {
        let resp = ModelResponse {
            parts: vec![
                TextPart { content: "a".into() },
                TextPart { content: "b".into() },
            ],
            model_name: "m".into(),
            finish_reasons: vec!["stop".into(), "stop".into()],
            warnings: vec![],
        };
        assert_eq!(resp.text(), "a\nb");
    }
}
