//! Hosted language-model provider.
//!
//! [`CompletionProvider`] is the seam between the gateways and the vendor;
//! [`OpenRouterProvider`] speaks the OpenAI-compatible chat-completions API.

use async_trait::async_trait;
use futures::Stream;
use serde::Serialize;
use std::pin::Pin;
use thiserror::Error;

pub mod openrouter;
pub mod sse;

pub use openrouter::OpenRouterProvider;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("provider request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("provider returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("provider returned an error object: {0}")]
    Provider(String),

    #[error("failed to decode provider payload: {0}")]
    Decode(String),
}

/// One message in provider wire format.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "role", rename_all = "lowercase")]
pub enum ProviderMessage {
    System {
        content: String,
    },
    User {
        content: UserContent,
    },
    Assistant {
        #[serde(skip_serializing_if = "Option::is_none")]
        content: Option<String>,
        #[serde(skip_serializing_if = "Vec::is_empty")]
        tool_calls: Vec<AssistantToolCall>,
    },
    Tool {
        tool_call_id: String,
        content: String,
    },
}

impl ProviderMessage {
    pub fn system(content: impl Into<String>) -> Self {
        ProviderMessage::System {
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        ProviderMessage::User {
            content: UserContent::Text(content.into()),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        ProviderMessage::Assistant {
            content: Some(content.into()),
            tool_calls: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum UserContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImageUrl {
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssistantToolCall {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub function: FunctionCall,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FunctionCall {
    pub name: String,
    /// JSON-encoded arguments, as the provider produced them.
    pub arguments: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatCompletionRequest {
    pub messages: Vec<ProviderMessage>,
    /// OpenAI-style tool descriptors.
    pub tools: Vec<serde_json::Value>,
    pub temperature: f32,
    pub max_tokens: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct StructuredRequest {
    pub messages: Vec<ProviderMessage>,
    pub schema_name: String,
    pub schema: serde_json::Value,
    pub temperature: f32,
}

/// Incremental output of a streaming completion.
#[derive(Debug, Clone, PartialEq)]
pub enum ProviderEvent {
    TextDelta(String),
    ToolCallDelta {
        index: usize,
        id: Option<String>,
        name: Option<String>,
        arguments: String,
    },
    Finish {
        reason: Option<String>,
    },
}

pub type ProviderStream = Pin<Box<dyn Stream<Item = Result<ProviderEvent, LlmError>> + Send>>;

#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Starts a streaming completion. Errors returned here happen before any
    /// output exists; errors inside the stream happen mid-response.
    async fn stream_chat(&self, request: ChatCompletionRequest) -> Result<ProviderStream, LlmError>;

    /// Requests a single JSON object constrained by `request.schema`.
    async fn complete_structured(&self, request: StructuredRequest) -> Result<serde_json::Value, LlmError>;
}
