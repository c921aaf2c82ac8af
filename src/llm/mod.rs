//! Language model abstraction.
//!
//! The crate talks to one chat-completion API for three purposes: parsing voice
//! commands into tool calls, phrasing spoken confirmations, and running the AI analysis
//! tools. [`ModelUse`] carries the sampling settings for each.

pub mod openai;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;

use crate::config::LlmConfig;
use crate::error::ToolError;

pub use openai::OpenAiClient;

/// What a completion is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelUse {
    /// Intent parsing with function calling.
    Voice,
    /// One or two sentence spoken confirmations.
    Summary,
    /// Structured JSON analysis for the AI tools.
    Analysis,
}

impl ModelUse {
    pub fn temperature(self) -> f64 {
        match self {
            Self::Voice => 0.3,
            Self::Summary => 0.7,
            Self::Analysis => 0.2,
        }
    }

    pub fn max_tokens(self) -> u32 {
        match self {
            Self::Voice => 300,
            Self::Summary => 150,
            Self::Analysis => 1000,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Voice => "voice",
            Self::Summary => "summary",
            Self::Analysis => "analysis",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

/// A callable function advertised to the model.
#[derive(Debug, Clone)]
pub struct FunctionSpec {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub model_use: ModelUse,
    pub system_prompt: String,
    pub messages: Vec<ChatMessage>,
    pub functions: Vec<FunctionSpec>,
    /// Ask for a single JSON object as the reply body.
    pub json_output: bool,
}

impl CompletionRequest {
    /// A plain prompt with no functions.
    pub fn prompt(model_use: ModelUse, system_prompt: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            model_use,
            system_prompt: system_prompt.into(),
            messages: vec![ChatMessage::user(prompt)],
            functions: Vec::new(),
            json_output: matches!(model_use, ModelUse::Analysis),
        }
    }
}

/// A function call chosen by the model.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolInvocation {
    pub id: String,
    pub name: String,
    pub arguments: Value,
}

#[derive(Debug, Clone, Default)]
pub struct Completion {
    pub text: Option<String>,
    pub tool_calls: Vec<ToolInvocation>,
}

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("language model is not configured (set OPENAI_API_KEY or [llm] api_key)")]
    NotConfigured,

    #[error("model request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("model returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("invalid model response: {0}")]
    InvalidResponse(String),
}

impl From<LlmError> for ToolError {
    fn from(e: LlmError) -> Self {
        ToolError::Upstream(e.to_string())
    }
}

#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn complete(&self, request: CompletionRequest) -> Result<Completion, LlmError>;
}

/// Stand-in used when no API key is configured. Every call fails as upstream.
pub struct UnconfiguredModel;

#[async_trait]
impl LanguageModel for UnconfiguredModel {
    async fn complete(&self, _request: CompletionRequest) -> Result<Completion, LlmError> {
        Err(LlmError::NotConfigured)
    }
}

/// Build the model client described by the config.
pub fn create_model(config: &LlmConfig) -> anyhow::Result<Arc<dyn LanguageModel>> {
    match (config.provider.as_str(), config.api_key.as_deref()) {
        ("none", _) | (_, None) => {
            tracing::warn!("no language model configured, model-backed tools will fail");
            Ok(Arc::new(UnconfiguredModel))
        }
        ("openai", Some(key)) => {
            tracing::info!(base_url = %config.base_url, "using OpenAI-compatible model endpoint");
            Ok(Arc::new(OpenAiClient::new(config, key)?))
        }
        (other, _) => anyhow::bail!("unknown llm provider: {other}"),
    }
}
