//! Voice command pipeline: parse the utterance, execute the chosen tools, and phrase
//! a spoken reply.

pub mod executor;
pub mod formatter;
pub mod intent;

pub use executor::{ExecutionError, FallbackExecutor, LocalExecutor, RemoteExecutor, ToolExecutor};
pub use intent::{IntentParser, ParsedCall, ParsedCommand};

use rusqlite::params;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use thiserror::Error;

use crate::config::VoiceConfig;
use crate::crm::query_one;
use crate::llm::ChatMessage;
use crate::tools::{CallerContext, Dispatcher, ToolCallRequest};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceContext {
    pub last_job_id: Option<String>,
    pub last_contact_id: Option<String>,
    pub last_conversation_id: Option<String>,
    pub user_id: Option<String>,
    /// Prior turns as `{role, content}` objects.
    #[serde(default)]
    pub conversation_history: Vec<Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceRequest {
    pub account_id: Option<String>,
    pub transcription: Option<String>,
    pub conversation_id: Option<String>,
    pub context: Option<VoiceContext>,
}

/// One executed tool call.
#[derive(Debug, Clone, Serialize)]
pub struct CallRecord {
    pub action: String,
    pub params: Value,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct VoiceResponse {
    pub success: bool,
    pub action: String,
    pub params: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    pub response: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub calls: Vec<CallRecord>,
    /// Context after the turn, to send back with the next command.
    pub context: CallerContext,
    #[serde(flatten)]
    pub extras: Map<String, Value>,
}

#[derive(Debug, Error)]
pub enum VoiceError {
    #[error("Missing required fields: accountId, transcription")]
    MissingFields,

    #[error("Invalid account ID")]
    InvalidAccount,

    #[error("{0}")]
    Internal(String),
}

impl VoiceError {
    pub fn status(&self) -> u16 {
        match self {
            Self::MissingFields => 400,
            Self::InvalidAccount => 403,
            Self::Internal(_) => 500,
        }
    }

    /// Error body in the shape voice clients expect.
    pub fn body(&self) -> Value {
        match self {
            Self::Internal(details) => json!({ "error": "Internal Server Error", "details": details }),
            other => json!({ "error": other.to_string() }),
        }
    }
}

fn history_messages(turns: &[Value], keep: usize) -> Vec<ChatMessage> {
    let skip = turns.len().saturating_sub(keep);
    turns
        .iter()
        .skip(skip)
        .filter_map(|turn| {
            let content = turn.get("content")?.as_str()?;
            Some(match turn.get("role").and_then(Value::as_str) {
                Some("assistant") => ChatMessage::assistant(content),
                _ => ChatMessage::user(content),
            })
        })
        .collect()
}

/// Fields older voice clients read directly off the response.
fn compatibility_extras(action: &str, result: &Value, extras: &mut Map<String, Value>) {
    match action {
        "list_jobs" | "search_jobs" | "filter_jobs" => {
            let jobs = result["jobs"].as_array().cloned().unwrap_or_default();
            extras.insert("formatted".into(), json!(formatter::format_jobs(&jobs)));
            extras.insert("jobCount".into(), json!(jobs.len()));
            extras.insert("jobs".into(), Value::Array(jobs));
        }
        "list_contacts" | "search_contacts" => {
            let contacts = result["contacts"].as_array().cloned().unwrap_or_default();
            extras.insert("formatted".into(), json!(formatter::format_contacts(&contacts)));
            extras.insert("contactCount".into(), json!(contacts.len()));
            extras.insert("contacts".into(), Value::Array(contacts));
        }
        "get_job" => {
            extras.insert("job".into(), result.get("job").cloned().unwrap_or_else(|| result.clone()));
        }
        "get_contact" => {
            extras.insert("contact".into(), result.get("contact").cloned().unwrap_or_else(|| result.clone()));
        }
        "create_job" => {
            extras.insert("jobId".into(), result["jobId"].clone());
        }
        "create_contact" => {
            extras.insert("contactId".into(), result["contactId"].clone());
        }
        "list_conversations" | "get_conversation" => {
            let conversations = match (&result["conversations"], &result["conversation"]) {
                (Value::Array(list), _) => list.clone(),
                (_, single @ Value::Object(_)) => vec![single.clone()],
                _ => Vec::new(),
            };
            extras.insert("conversationCount".into(), json!(conversations.len()));
            extras.insert("conversations".into(), Value::Array(conversations));
        }
        "navigate" => {
            extras.insert(
                "navigation".into(),
                result.get("navigation").cloned().unwrap_or_else(|| result.clone()),
            );
        }
        _ => {}
    }
}

pub struct VoiceAgent {
    dispatcher: Dispatcher,
    parser: IntentParser,
    executor: Arc<dyn ToolExecutor>,
    config: VoiceConfig,
}

impl VoiceAgent {
    pub fn new(dispatcher: Dispatcher, executor: Arc<dyn ToolExecutor>, config: VoiceConfig) -> Self {
        let parser = IntentParser::new(Arc::clone(dispatcher.model()), dispatcher.catalog());
        Self {
            dispatcher,
            parser,
            executor,
            config,
        }
    }

    /// Local dispatch, tried after the configured remote endpoint when there is one.
    pub fn from_config(dispatcher: Dispatcher, config: VoiceConfig, timeout_secs: u64) -> anyhow::Result<Self> {
        let local: Arc<dyn ToolExecutor> = Arc::new(LocalExecutor::new(dispatcher.clone()));
        let executor = match &config.mcp_url {
            Some(url) => {
                let client = crate::mcp::McpClient::new(url.clone(), std::time::Duration::from_secs(timeout_secs))?;
                tracing::info!(url = %url, "voice commands dispatch remotely first");
                Arc::new(FallbackExecutor::new(Arc::new(RemoteExecutor::new(client)), local))
            }
            None => local,
        };
        Ok(Self::new(dispatcher, executor, config))
    }

    /// The account's persona config, or `None` when the account does not exist.
    async fn persona(&self, account_id: &str) -> Result<Option<Value>, VoiceError> {
        let account_id = account_id.to_string();
        self.dispatcher
            .with_store(CallerContext::for_account(account_id.clone()), move |env| {
                query_one(
                    env.conn,
                    "SELECT persona_config FROM accounts WHERE id = ?1",
                    params![account_id],
                )
            })
            .await
            .map_err(|e| VoiceError::Internal(e.to_string()))
    }

    pub async fn handle(&self, request: VoiceRequest) -> Result<VoiceResponse, VoiceError> {
        let account_id = request
            .account_id
            .filter(|a| !a.trim().is_empty())
            .ok_or(VoiceError::MissingFields)?;
        let transcription = request
            .transcription
            .filter(|t| !t.trim().is_empty())
            .ok_or(VoiceError::MissingFields)?;

        let persona = self.persona(&account_id).await?.ok_or(VoiceError::InvalidAccount)?;
        let system_prompt = persona["persona_config"]["systemPrompt"]
            .as_str()
            .filter(|s| !s.trim().is_empty())
            .map(str::to_string);

        let voice_ctx = request.context.unwrap_or_default();
        let mut context = CallerContext {
            user_id: voice_ctx.user_id,
            account_id,
            last_job_id: voice_ctx.last_job_id,
            last_contact_id: voice_ctx.last_contact_id,
            last_conversation_id: voice_ctx.last_conversation_id.or(request.conversation_id),
        };
        let history = history_messages(&voice_ctx.conversation_history, self.config.max_history_turns);

        tracing::info!(account = %context.account_id, "voice command");
        let parsed = self
            .parser
            .parse(&transcription, &history, &context, system_prompt.as_deref())
            .await
            .map_err(|e| VoiceError::Internal(e.to_string()))?;

        if parsed.calls.is_empty() {
            return Ok(VoiceResponse {
                success: true,
                action: "unknown".into(),
                params: json!({}),
                result: None,
                response: parsed.text.unwrap_or_else(|| formatter::HELP_REPLY.to_string()),
                error: None,
                calls: Vec::new(),
                context,
                extras: Map::new(),
            });
        }

        let mut calls = Vec::with_capacity(parsed.calls.len());
        for call in parsed.calls {
            let request = ToolCallRequest {
                tool_name: call.tool_name.clone(),
                arguments: call.arguments.clone(),
                context: context.clone(),
            };
            let record = match self.executor.execute(&request).await {
                Ok(outcome) => {
                    if let Some(data) = outcome.data.as_ref().filter(|_| outcome.success) {
                        context.observe(data);
                    }
                    CallRecord {
                        action: call.tool_name,
                        params: call.arguments,
                        success: outcome.success,
                        result: outcome.data,
                        error: outcome.error,
                    }
                }
                Err(e) => CallRecord {
                    action: call.tool_name,
                    params: call.arguments,
                    success: false,
                    result: None,
                    error: Some(e.to_string()),
                },
            };
            calls.push(record);
        }

        let last = calls.last().cloned().ok_or_else(|| VoiceError::Internal("no calls executed".into()))?;
        let mut extras = Map::new();
        if let Some(result) = &last.result {
            compatibility_extras(&last.action, result, &mut extras);
        }

        let response = if let Some(error) = &last.error {
            formatter::error_reply(error)
        } else if let Some(formatted) = extras.get("formatted").and_then(Value::as_str) {
            formatted.to_string()
        } else {
            let fallback = last
                .result
                .as_ref()
                .and_then(|r| r["message"].as_str())
                .unwrap_or(formatter::COMPLETED_REPLY)
                .to_string();
            if self.config.summarize {
                let summary = formatter::summary_context(&transcription, &last.action, last.result.as_ref(), true);
                formatter::confirm(self.dispatcher.model().as_ref(), &summary, &fallback).await
            } else {
                fallback
            }
        };

        Ok(VoiceResponse {
            success: last.error.is_none(),
            action: last.action,
            params: last.params,
            result: last.result,
            response,
            error: last.error,
            calls,
            context,
            extras,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn history_keeps_the_latest_turns() {
        let turns = vec![
            json!({"role": "user", "content": "one"}),
            json!({"role": "assistant", "content": "two"}),
            json!({"role": "user", "content": "three"}),
            json!({"role": "user"}),
        ];
        let messages = history_messages(&turns, 3);
        assert_eq!(messages, vec![ChatMessage::assistant("two"), ChatMessage::user("three")]);
    }

    #[test]
    fn list_results_get_spoken_summaries() {
        let mut extras = Map::new();
        compatibility_extras("list_jobs", &json!({"jobCount": 0, "jobs": []}), &mut extras);
        assert_eq!(extras["formatted"], "No jobs found.");
        assert_eq!(extras["jobCount"], 0);
    }

    #[test]
    fn error_statuses() {
        assert_eq!(VoiceError::MissingFields.status(), 400);
        assert_eq!(VoiceError::InvalidAccount.status(), 403);
        let internal = VoiceError::Internal("model down".into());
        assert_eq!(internal.status(), 500);
        assert_eq!(internal.body(), json!({"error": "Internal Server Error", "details": "model down"}));
    }
}
