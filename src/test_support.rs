//! Test utilities shared across the crate.
//!
//! This module is only compiled during tests (`#[cfg(test)]`).

use serde_json::{Value, json};

/// A catalog entry as LM Studio serves it.
pub fn model_data_body(id: &str) -> Value {
    json!({
        "id": id,
        "object": "model",
        "type": "llm",
        "publisher": "lmstudio-community",
        "arch": "phi3",
        "compatibility_type": "gguf",
        "quantization": "Q4_K_M",
        "state": "loaded",
        "max_context_length": 16384
    })
}

fn shared_metadata() -> Value {
    json!({
        "usage": { "prompt_tokens": 24, "completion_tokens": 9, "total_tokens": 33 },
        "stats": {
            "tokens_per_second": 51.4,
            "time_to_first_token": 0.111,
            "generation_time": 0.954,
            "stop_reason": "eosFound"
        },
        "model_info": {
            "arch": "phi3",
            "quant": "Q4_K_M",
            "format": "gguf",
            "context_length": 16384
        },
        "runtime": {
            "name": "llama.cpp-mac-arm64-apple-metal-advsimd",
            "version": "1.3.0",
            "supported_formats": ["gguf"]
        }
    })
}

/// A chat completion with one choice per entry in `contents`.
pub fn chat_completion_body(contents: &[&str], finish_reason: &str) -> Value {
    let choices: Vec<Value> = contents
        .iter()
        .enumerate()
        .map(|(index, content)| {
            json!({
                "index": index,
                "logprobs": null,
                "finish_reason": finish_reason,
                "message": { "role": "assistant", "content": content }
            })
        })
        .collect();

    let mut body = json!({
        "id": "chatcmpl-test",
        "object": "chat.completion",
        "created": 1730000000,
        "model": "phi-4",
        "choices": choices,
    });
    merge(&mut body, shared_metadata());
    body
}

/// A text completion with one choice per entry in `texts`, all finishing on "stop".
pub fn text_completion_body(texts: &[&str]) -> Value {
    let choices: Vec<Value> = texts
        .iter()
        .enumerate()
        .map(|(index, text)| {
            json!({
                "index": index,
                "text": text,
                "logprobs": null,
                "finish_reason": "stop"
            })
        })
        .collect();

    let mut body = json!({
        "id": "cmpl-test",
        "object": "text_completion",
        "created": 1730000000,
        "model": "phi-4",
        "choices": choices,
    });
    merge(&mut body, shared_metadata());
    body
}

fn merge(target: &mut Value, extra: Value) {
    if let (Value::Object(target), Value::Object(extra)) = (target, extra) {
        target.extend(extra);
    }
}
