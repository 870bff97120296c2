//! Language model providers.
//!
//! Only the chat-completions shape is modelled: a list of [`Message`]s plus
//! tool definitions in, one assistant [`Message`] (possibly carrying tool
//! calls) out.

pub mod openai;
pub mod registry;

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::ModelDef;
use crate::tools::ToolDefinition;

pub use openai::OpenAiCompatProvider;
pub use registry::{new_provider, ModelRegistry};

// ---------------------------------------------------------------------------
// Messages
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Tool => "tool",
        }
    }
}

/// A tool invocation requested by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    /// Raw JSON arguments as produced by the model.
    pub arguments: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    /// Model reasoning trace, when the provider returns one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
}

impl Message {
    fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
            reasoning: None,
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    pub fn tool_result(call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            tool_call_id: Some(call_id.into()),
            ..Self::new(Role::Tool, content)
        }
    }

    pub fn with_tool_calls(mut self, calls: Vec<ToolCall>) -> Self {
        self.tool_calls = calls;
        self
    }
}

/// Per-request sampling settings.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GenerateOptions {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub parallel_tool_calls: Option<bool>,
    /// `enabled` / `disabled` for providers supporting a thinking switch.
    pub thinking: String,
}

impl From<&ModelDef> for GenerateOptions {
    fn from(def: &ModelDef) -> Self {
        Self {
            model: def.model_name.clone(),
            temperature: def.temperature,
            max_tokens: def.max_tokens,
            parallel_tool_calls: def.parallel_tool_calls,
            thinking: def.thinking.clone(),
        }
    }
}

/// Result of a provider reachability check.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProviderStatus {
    pub status_code: u16,
    #[serde(rename = "latency_ms", serialize_with = "serialize_millis")]
    pub latency: Duration,
}

fn serialize_millis<S: serde::Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(d.as_millis() as u64)
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("unknown provider type: {0}")]
    UnsupportedProvider(String),

    #[error("api key for model '{0}' is not configured")]
    MissingApiKey(String),

    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("provider error ({status}): {body}")]
    Api { status: u16, body: String },

    #[error("failed to parse provider response: {0}")]
    Parse(String),

    #[error("provider call failed after retries: {0}")]
    RetriesExhausted(String),

    #[error("model '{0}' not found in registry")]
    ModelNotFound(String),

    #[error("model '{0}' already registered")]
    AlreadyRegistered(String),

    #[error("operation not supported by this provider: {0}")]
    Unsupported(&'static str),
}

// ---------------------------------------------------------------------------
// Provider trait
// ---------------------------------------------------------------------------

#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Produce the next assistant message.
    async fn generate(
        &self,
        messages: &[Message],
        tools: &[ToolDefinition],
        options: &GenerateOptions,
    ) -> Result<Message, LlmError>;

    /// Check that the provider endpoint is reachable with the configured key.
    async fn ping(&self) -> Result<ProviderStatus, LlmError> {
        Err(LlmError::Unsupported("ping"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_result_message() {
        let msg = Message::tool_result("call_1", "{\"ok\":true}");
        assert_eq!(msg.role, Role::Tool);
        assert_eq!(msg.tool_call_id.as_deref(), Some("call_1"));
    }

    #[test]
    fn test_options_from_model_def() {
        let def = ModelDef {
            model_name: "glm-4.6".into(),
            temperature: 0.3,
            max_tokens: 4000,
            thinking: "enabled".into(),
            ..Default::default()
        };
        let opts = GenerateOptions::from(&def);
        assert_eq!(opts.model, "glm-4.6");
        assert_eq!(opts.max_tokens, 4000);
        assert_eq!(opts.thinking, "enabled");
    }

    #[test]
    fn test_message_serialization_skips_empty_fields() {
        let json = serde_json::to_value(Message::user("hi")).unwrap();
        assert_eq!(json, serde_json::json!({"role": "user", "content": "hi"}));
    }
}
