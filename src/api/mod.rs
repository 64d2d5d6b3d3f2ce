//! # LM Studio REST API
//!
//! - [`http`]: JSON transport with retries and timeouts
//! - [`client`]: endpoint methods returning typed responses
//! - [`types`]: request/response shapes

pub mod client;
pub mod http;
pub mod types;

pub use client::{ChatOptions, ClientError, LmStudioClient, TextOptions, DEFAULT_BASE_URL};
pub use http::{HttpClient, HttpOptions, RetryPolicy, TransportError};
pub use types::{
    ApiUsage, ChatCompletionResponse, Message, ModelData, ModelType, ModelsResponse, Role,
    TextCompletionResponse,
};
