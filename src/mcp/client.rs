//! Minimal client for a remote MCP endpoint (`tools/call` only).
//!
//! Requests are built from `rmcp` message types. Replies may come back as plain
//! JSON or as a streamable HTTP event stream; both are accepted.

use rmcp::model::{
    CallToolRequest, CallToolRequestParams, ClientJsonRpcMessage, ClientRequest, ErrorData, Meta, RequestId,
};
use serde_json::{Map, Value};
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;
use thiserror::Error;

use super::handler::CALLER_CONTEXT_META;
use crate::tools::{CallerContext, ToolCallResult};

#[derive(Debug, Error)]
pub enum McpClientError {
    #[error("MCP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("MCP server returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("MCP error {code}: {message}")]
    Rpc { code: i32, message: String },

    #[error("invalid MCP response: {0}")]
    InvalidResponse(String),
}

pub struct McpClient {
    url: String,
    http: reqwest::Client,
    next_id: AtomicI64,
}

impl McpClient {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, McpClientError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            url: url.into(),
            http,
            next_id: AtomicI64::new(1),
        })
    }

    /// Call a tool remotely. A tool that ran and reported an error comes back as an
    /// unsuccessful [`ToolCallResult`]; only transport and protocol failures are `Err`.
    pub async fn call_tool(
        &self,
        name: &str,
        arguments: &Value,
        context: &CallerContext,
    ) -> Result<ToolCallResult, McpClientError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let message = call_tool_message(id, name, arguments, context)?;

        let mut builder = self
            .http
            .post(&self.url)
            .header("accept", "application/json, text/event-stream")
            .header("x-account-id", &context.account_id)
            .json(&message);
        if let Some(user) = &context.user_id {
            builder = builder.header("x-user-id", user);
        }

        tracing::debug!(tool = name, url = %self.url, "remote tool call");
        let resp = builder.send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(McpClientError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let body = resp.text().await?;
        let reply = find_reply(&body, id)?;
        if let Some(error) = reply.get("error") {
            let error: ErrorData = serde_json::from_value(error.clone())
                .map_err(|e| McpClientError::InvalidResponse(format!("bad error object: {e}")))?;
            return Err(McpClientError::Rpc {
                code: error.code.0,
                message: error.message.into_owned(),
            });
        }
        let result = reply
            .get("result")
            .ok_or_else(|| McpClientError::InvalidResponse("response has neither result nor error".into()))?;
        parse_tool_content(result)
    }
}

fn call_tool_message(
    id: i64,
    name: &str,
    arguments: &Value,
    context: &CallerContext,
) -> Result<ClientJsonRpcMessage, McpClientError> {
    let caller = serde_json::to_value(context)
        .map_err(|e| McpClientError::InvalidResponse(format!("unserializable context: {e}")))?;
    let mut meta = Map::new();
    meta.insert(CALLER_CONTEXT_META.to_string(), caller);

    let params = CallToolRequestParams {
        meta: Some(Meta(meta)),
        name: name.to_string().into(),
        arguments: arguments.as_object().cloned(),
        task: None,
    };
    Ok(ClientJsonRpcMessage::request(
        ClientRequest::CallToolRequest(CallToolRequest::new(params)),
        RequestId::Number(id),
    ))
}

/// The JSON-RPC reply for request `id` in a JSON body or in the `data:` lines of
/// an event stream.
fn find_reply(body: &str, id: i64) -> Result<Value, McpClientError> {
    let trimmed = body.trim_start();
    let candidates: Vec<Value> = if trimmed.starts_with('{') {
        serde_json::from_str(trimmed).into_iter().collect()
    } else {
        body.lines()
            .filter_map(|line| line.strip_prefix("data:"))
            .map(str::trim)
            .filter(|data| !data.is_empty())
            .filter_map(|data| serde_json::from_str(data).ok())
            .collect()
    };
    candidates
        .into_iter()
        .find(|msg| msg.get("id").and_then(Value::as_i64) == Some(id))
        .ok_or_else(|| McpClientError::InvalidResponse("no reply for the request".into()))
}

/// Read `{content:[{type:"text", text}], isError}` back into the result envelope.
pub fn parse_tool_content(result: &Value) -> Result<ToolCallResult, McpClientError> {
    let text = result["content"]
        .as_array()
        .and_then(|items| items.iter().find(|c| c["type"] == "text"))
        .and_then(|c| c["text"].as_str())
        .ok_or_else(|| McpClientError::InvalidResponse("no text content".into()))?;
    let payload: Value = serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_string()));

    let is_error = result["isError"].as_bool().unwrap_or(false) || payload.get("error").is_some();
    if is_error {
        let message = payload["error"]
            .as_str()
            .map(str::to_string)
            .unwrap_or_else(|| payload.to_string());
        return Ok(ToolCallResult {
            success: false,
            data: None,
            error: Some(message),
        });
    }
    Ok(ToolCallResult {
        success: true,
        data: Some(payload),
        error: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn error_content_is_a_failed_result_not_a_client_error() {
        let result = json!({
            "content": [{"type": "text", "text": "{\"error\": \"Job not found\"}"}],
            "isError": true
        });
        let parsed = parse_tool_content(&result).unwrap();
        assert!(!parsed.success);
        assert_eq!(parsed.error.as_deref(), Some("Job not found"));
    }

    #[test]
    fn text_content_is_parsed_as_json() {
        let result = json!({"content": [{"type": "text", "text": "{\"jobCount\": 2}"}], "isError": false});
        let parsed = parse_tool_content(&result).unwrap();
        assert_eq!(parsed.data.unwrap()["jobCount"], 2);
    }

    #[test]
    fn missing_content_is_invalid() {
        assert!(matches!(
            parse_tool_content(&json!({})),
            Err(McpClientError::InvalidResponse(_))
        ));
    }

    #[test]
    fn request_carries_the_caller_context_in_meta() {
        let context = CallerContext {
            last_job_id: Some("job-9".into()),
            ..CallerContext::for_account("acct")
        };
        let message = call_tool_message(3, "get_job", &json!({"jobId": "last"}), &context).unwrap();
        let body = serde_json::to_value(&message).unwrap();
        assert_eq!(body["jsonrpc"], "2.0");
        assert_eq!(body["id"], 3);
        assert_eq!(body["method"], "tools/call");
        assert_eq!(body["params"]["name"], "get_job");
        assert_eq!(body["params"]["arguments"]["jobId"], "last");
        assert_eq!(body["params"]["_meta"]["callerContext"]["lastJobId"], "job-9");
    }

    #[test]
    fn replies_are_found_in_event_streams_and_plain_json() {
        let stream = "data: \n\ndata: {\"jsonrpc\":\"2.0\",\"id\":4,\"result\":{\"content\":[]}}\n\n";
        assert!(find_reply(stream, 4).unwrap().get("result").is_some());
        assert!(find_reply(stream, 5).is_err());

        let plain = r#"{"jsonrpc":"2.0","id":4,"error":{"code":-32602,"message":"Unknown tool: x"}}"#;
        assert_eq!(find_reply(plain, 4).unwrap()["error"]["code"], -32602);
    }
}
