//! OpenAI-compatible `/v1/chat/completions` client with function calling.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{ChatRole, Completion, CompletionRequest, LanguageModel, LlmError, ModelUse, ToolInvocation};
use crate::config::LlmConfig;

#[derive(Debug, Clone)]
pub struct OpenAiClient {
    base_url: String,
    api_key: String,
    voice_model: String,
    summary_model: String,
    analysis_model: String,
    http: reqwest::Client,
}

// -- wire types ---------------------------------------------------------------

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<MessagePayload<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<ToolPayload<'a>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
    max_tokens: u32,
    temperature: f64,
}

#[derive(Debug, Serialize)]
struct MessagePayload<'a> {
    role: ChatRole,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ToolPayload<'a> {
    r#type: &'a str,
    function: FunctionPayload<'a>,
}

#[derive(Debug, Serialize)]
struct FunctionPayload<'a> {
    name: &'a str,
    description: &'a str,
    parameters: &'a serde_json::Value,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    r#type: &'static str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<ToolCallPayload>>,
}

#[derive(Debug, Deserialize)]
struct ToolCallPayload {
    #[serde(default)]
    id: String,
    function: FunctionCallPayload,
}

#[derive(Debug, Deserialize)]
struct FunctionCallPayload {
    name: String,
    #[serde(default)]
    arguments: String,
}

impl OpenAiClient {
    pub fn new(config: &LlmConfig, api_key: &str) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            voice_model: config.voice_model.clone(),
            summary_model: config.summary_model.clone(),
            analysis_model: config.analysis_model.clone(),
            http,
        })
    }

    fn model_for(&self, model_use: ModelUse) -> &str {
        match model_use {
            ModelUse::Voice => &self.voice_model,
            ModelUse::Summary => &self.summary_model,
            ModelUse::Analysis => &self.analysis_model,
        }
    }
}

/// Request body for `model`, with the system prompt as the first message.
fn chat_request<'a>(model: &'a str, request: &'a CompletionRequest) -> ChatRequest<'a> {
    let mut messages = Vec::with_capacity(request.messages.len() + 1);
    if !request.system_prompt.is_empty() {
        messages.push(MessagePayload {
            role: ChatRole::System,
            content: &request.system_prompt,
        });
    }
    messages.extend(request.messages.iter().map(|m| MessagePayload {
        role: m.role,
        content: &m.content,
    }));

    let tools: Option<Vec<ToolPayload>> = if request.functions.is_empty() {
        None
    } else {
        Some(
            request
                .functions
                .iter()
                .map(|f| ToolPayload {
                    r#type: "function",
                    function: FunctionPayload {
                        name: &f.name,
                        description: &f.description,
                        parameters: &f.parameters,
                    },
                })
                .collect(),
        )
    };

    ChatRequest {
        model,
        messages,
        tool_choice: tools.as_ref().map(|_| "auto"),
        tools,
        response_format: request.json_output.then_some(ResponseFormat {
            r#type: "json_object",
        }),
        max_tokens: request.model_use.max_tokens(),
        temperature: request.model_use.temperature(),
    }
}

/// The first choice as a [`Completion`]. Blank text counts as no text, and empty
/// function arguments as `{}`.
fn into_completion(response: ChatResponse) -> Result<Completion, LlmError> {
    let Some(choice) = response.choices.into_iter().next() else {
        return Err(LlmError::InvalidResponse("no choices in response".into()));
    };

    let tool_calls = choice
        .message
        .tool_calls
        .unwrap_or_default()
        .into_iter()
        .map(|tc| {
            let arguments = if tc.function.arguments.trim().is_empty() {
                serde_json::Value::Object(Default::default())
            } else {
                serde_json::from_str(&tc.function.arguments).map_err(|e| {
                    LlmError::InvalidResponse(format!("arguments for {} are not JSON: {e}", tc.function.name))
                })?
            };
            Ok(ToolInvocation {
                id: tc.id,
                name: tc.function.name,
                arguments,
            })
        })
        .collect::<Result<Vec<_>, LlmError>>()?;

    Ok(Completion {
        text: choice.message.content.filter(|t| !t.trim().is_empty()),
        tool_calls,
    })
}

#[async_trait]
impl LanguageModel for OpenAiClient {
    async fn complete(&self, request: CompletionRequest) -> Result<Completion, LlmError> {
        let url = format!("{}/v1/chat/completions", self.base_url);
        let model = self.model_for(request.model_use);
        let body = chat_request(model, &request);

        tracing::debug!(model, model_use = request.model_use.as_str(), "chat completion request");

        let resp = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(LlmError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: ChatResponse = resp.json().await?;
        into_completion(parsed)
    }
}
