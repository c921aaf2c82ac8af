//! Tool catalog and dispatcher.
//!
//! Each submodule declares the typed parameters for one group of tools and registers
//! them with the [`Catalog`]. The handler bodies live in [`crate::crm`]. The
//! [`Dispatcher`] looks a tool up by exact name, resolves context placeholders, and
//! runs the handler inside one SQLite transaction on a blocking thread.

pub mod ai;
pub mod analytics;
pub mod automation;
pub mod billing;
pub mod contacts;
pub mod conversations;
pub mod field;
pub mod jobs;
pub mod marketing;
pub mod memory;
pub mod people;
pub mod registry;

pub use registry::{AnalysisRequest, Catalog, Handler, HandlerSettings, NoParams, ToolDefinition, ToolEnv};

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};

use crate::error::{ToolError, ToolResult};
use crate::llm::{ChatMessage, CompletionRequest, LanguageModel, ModelUse};
use crate::resolve;

/// Who is calling, plus the IDs the conversation last touched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallerContext {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default)]
    pub account_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_job_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_contact_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_conversation_id: Option<String>,
}

impl CallerContext {
    pub fn for_account(account_id: impl Into<String>) -> Self {
        Self {
            account_id: account_id.into(),
            ..Default::default()
        }
    }

    /// Remember the job, contact, and conversation a tool result refers to, so a
    /// following "that job" points at it.
    pub fn observe(&mut self, result: &Value) {
        fn pick(result: &Value, flat: &str, nested: &str) -> Option<String> {
            result
                .get(flat)
                .and_then(Value::as_str)
                .or_else(|| result.get(nested)?.get("id")?.as_str())
                .map(str::to_string)
        }

        if let Some(id) = pick(result, "jobId", "job") {
            self.last_job_id = Some(id);
        }
        if let Some(id) = pick(result, "contactId", "contact") {
            self.last_contact_id = Some(id);
        }
        if let Some(id) = pick(result, "conversationId", "conversation") {
            self.last_conversation_id = Some(id);
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCallRequest {
    pub tool_name: String,
    #[serde(default)]
    pub arguments: Value,
    #[serde(default, rename = "callerContext", alias = "context")]
    pub context: CallerContext,
}

/// Uniform result envelope.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolCallResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<ToolResult<Value>> for ToolCallResult {
    fn from(result: ToolResult<Value>) -> Self {
        match result {
            Ok(data) => Self {
                success: true,
                data: Some(data),
                error: None,
            },
            Err(e) => Self {
                success: false,
                data: None,
                error: Some(e.to_string()),
            },
        }
    }
}

pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Routes tool calls to their handlers. Cheap to clone.
#[derive(Clone)]
pub struct Dispatcher {
    catalog: Arc<Catalog>,
    db: Arc<Mutex<Connection>>,
    model: Arc<dyn LanguageModel>,
    settings: Arc<HandlerSettings>,
    clock: Clock,
}

impl Dispatcher {
    pub fn new(
        db: Arc<Mutex<Connection>>,
        model: Arc<dyn LanguageModel>,
        settings: HandlerSettings,
    ) -> Self {
        Self {
            catalog: Arc::new(Catalog::builtin()),
            db,
            model,
            settings: Arc::new(settings),
            clock: Arc::new(Utc::now),
        }
    }

    /// Replace the wall clock, for deterministic tests.
    pub fn with_clock(mut self, clock: impl Fn() -> DateTime<Utc> + Send + Sync + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    pub fn model(&self) -> &Arc<dyn LanguageModel> {
        &self.model
    }

    pub fn now(&self) -> DateTime<Utc> {
        (self.clock)()
    }

    /// Execute one tool call.
    pub async fn call(&self, request: ToolCallRequest) -> ToolResult<Value> {
        let ToolCallRequest {
            tool_name,
            mut arguments,
            context,
        } = request;

        let spec = self
            .catalog
            .get(&tool_name)
            .ok_or_else(|| ToolError::UnknownTool(tool_name.clone()))?;

        if arguments.is_null() {
            arguments = json!({});
        }
        resolve::resolve_placeholders(&mut arguments, &context)?;

        tracing::info!(tool = %tool_name, account = %context.account_id, "tool call");

        let result = match &spec.handler {
            Handler::Store(handler) => {
                let handler = Arc::clone(handler);
                self.with_store(context, move |env| handler(env, arguments)).await
            }
            Handler::Model(handler) => {
                let handler = Arc::clone(handler);
                let analysis = self
                    .with_store(context.clone(), move |env| handler(env, arguments))
                    .await?;
                self.run_analysis(context, analysis).await
            }
            Handler::Flow(handler) => handler(self.clone(), context, arguments).await,
        };

        match &result {
            Ok(_) => tracing::debug!(tool = %tool_name, "tool call succeeded"),
            Err(e) => tracing::warn!(tool = %tool_name, kind = e.kind(), error = %e, "tool call failed"),
        }
        result
    }

    /// Execute one tool call and wrap the outcome in the result envelope.
    pub async fn dispatch(&self, request: ToolCallRequest) -> ToolCallResult {
        self.call(request).await.into()
    }

    /// Run `f` against the database inside one transaction on a blocking thread.
    /// An error rolls the transaction back.
    pub async fn with_store<T, F>(&self, caller: CallerContext, f: F) -> ToolResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&ToolEnv<'_>) -> ToolResult<T> + Send + 'static,
    {
        let db = Arc::clone(&self.db);
        let settings = Arc::clone(&self.settings);
        let now = self.now();

        tokio::task::spawn_blocking(move || {
            let mut conn = db
                .lock()
                .map_err(|e| ToolError::Internal(format!("db lock poisoned: {e}")))?;
            let tx = conn.transaction()?;
            let env = ToolEnv {
                conn: &tx,
                caller: &caller,
                now,
                settings: &settings,
            };
            let out = f(&env)?;
            tx.commit()?;
            Ok(out)
        })
        .await
        .map_err(|e| ToolError::Internal(format!("db task failed: {e}")))?
    }

    /// Send a prepared prompt to the analysis model and store the answer.
    pub async fn run_analysis(&self, context: CallerContext, request: AnalysisRequest) -> ToolResult<Value> {
        let completion = self
            .model
            .complete(CompletionRequest {
                model_use: ModelUse::Analysis,
                system_prompt: request.system_prompt.clone(),
                messages: vec![ChatMessage::user(request.prompt.clone())],
                functions: Vec::new(),
                json_output: request.json_output,
            })
            .await?;

        let raw = completion.text.unwrap_or_default();
        let output = if request.json_output {
            serde_json::from_str::<Value>(raw.trim()).map_err(|e| {
                ToolError::Upstream(format!("model returned invalid JSON: {e}"))
            })?
        } else {
            Value::String(raw.trim().to_string())
        };

        self.with_store(context, move |env| {
            crate::crm::ai::record_analysis(env, request, &raw, output)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn observe_picks_flat_and_nested_ids() {
        let mut ctx = CallerContext::for_account("acct");
        ctx.observe(&json!({"success": true, "jobId": "j-1"}));
        ctx.observe(&json!({"contact": {"id": "c-1", "first_name": "Ann"}}));
        assert_eq!(ctx.last_job_id.as_deref(), Some("j-1"));
        assert_eq!(ctx.last_contact_id.as_deref(), Some("c-1"));
        assert_eq!(ctx.last_conversation_id, None);
    }

    #[test]
    fn context_round_trips_camel_case() {
        let ctx: CallerContext = serde_json::from_value(json!({
            "accountId": "a",
            "lastJobId": "j"
        }))
        .unwrap();
        assert_eq!(ctx.account_id, "a");
        assert_eq!(ctx.last_job_id.as_deref(), Some("j"));
        let back = serde_json::to_value(&ctx).unwrap();
        assert_eq!(back, json!({"accountId": "a", "lastJobId": "j"}));
    }

    #[test]
    fn call_request_names_its_context_caller_context() {
        let request: ToolCallRequest = serde_json::from_value(json!({
            "toolName": "get_job",
            "arguments": {"jobId": "last"},
            "callerContext": {"accountId": "a", "lastJobId": "j"}
        }))
        .unwrap();
        assert_eq!(request.context.last_job_id.as_deref(), Some("j"));

        let legacy: ToolCallRequest =
            serde_json::from_value(json!({"toolName": "list_jobs", "context": {"accountId": "b"}})).unwrap();
        assert_eq!(legacy.context.account_id, "b");

        let body = serde_json::to_value(&request).unwrap();
        assert_eq!(body["callerContext"]["accountId"], "a");
        assert!(body.get("context").is_none());
    }

    #[test]
    fn envelope_flattens_errors_to_strings() {
        let result: ToolCallResult = Err(ToolError::not_found("Job not found")).into();
        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("Job not found"));
    }
}
