//! The MCP server handler shared by the stdio and HTTP transports.
//!
//! Over HTTP the caller comes from the `x-account-id` and `x-user-id` headers that
//! the streamable HTTP transport leaves in the request extensions. Over stdio there
//! are no headers and every call runs as the configured account. Either way a
//! `tools/call` may carry `_meta.callerContext` with the IDs the conversation last
//! touched, so "last" and "current" resolve the same on both transports.

use axum::http::request::Parts;
use rmcp::model::{
    CallToolRequestParams, CallToolResult, Content, GetPromptRequestParams, GetPromptResult, Implementation,
    JsonObject, ListPromptsResult, ListResourceTemplatesResult, ListResourcesResult, ListToolsResult, Meta,
    PaginatedRequestParams, ProtocolVersion, ReadResourceRequestParams, ReadResourceResult, ServerCapabilities,
    ServerInfo, Tool,
};
use rmcp::service::{RequestContext, RoleServer};
use rmcp::{ErrorData, ServerHandler};
use serde_json::{json, Value};
use std::sync::Arc;

use super::{prompts, resources};
use crate::tools::{CallerContext, Dispatcher, ToolCallRequest};

pub const SERVER_NAME: &str = "crm-mcp";

/// `_meta` key carrying a serialized [`CallerContext`].
pub const CALLER_CONTEXT_META: &str = "callerContext";

/// Serves the tool catalog, resources, and prompts.
#[derive(Clone)]
pub struct CrmTools {
    dispatcher: Dispatcher,
    account_id: String,
}

impl CrmTools {
    pub fn new(dispatcher: Dispatcher, account_id: impl Into<String>) -> Self {
        Self {
            dispatcher,
            account_id: account_id.into(),
        }
    }

    fn rmcp_tools(&self) -> Vec<Tool> {
        self.dispatcher
            .catalog()
            .definitions()
            .map(|def| {
                let schema = def.input_schema.as_object().cloned().unwrap_or_default();
                Tool::new(def.name.clone(), def.description.clone(), Arc::new(schema))
            })
            .collect()
    }

    /// Caller identity from HTTP headers, or the configured account when there are none.
    fn transport_caller(&self, parts: Option<&Parts>) -> CallerContext {
        let header = |name: &str| {
            parts?
                .headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };
        CallerContext {
            user_id: header("x-user-id"),
            ..CallerContext::for_account(header("x-account-id").unwrap_or_else(|| self.account_id.clone()))
        }
    }

    fn caller(&self, context: &RequestContext<RoleServer>, meta: Option<&Meta>) -> CallerContext {
        let base = self.transport_caller(context.extensions.get::<Parts>());
        let call = meta
            .and_then(|m| m.0.get(CALLER_CONTEXT_META))
            .and_then(|v| serde_json::from_value::<CallerContext>(v.clone()).ok());
        merge_context(base, call)
    }

    /// Run one tool as `caller`. An unknown tool is a protocol error; a handler
    /// failure is error content.
    pub async fn invoke(
        &self,
        name: &str,
        arguments: Option<JsonObject>,
        caller: CallerContext,
    ) -> Result<CallToolResult, ErrorData> {
        if !self.dispatcher.catalog().contains(name) {
            return Err(ErrorData::invalid_params(format!("Unknown tool: {name}"), None));
        }
        let outcome = self
            .dispatcher
            .call(ToolCallRequest {
                tool_name: name.to_string(),
                arguments: arguments.map(Value::Object).unwrap_or(Value::Null),
                context: caller,
            })
            .await;

        Ok(match outcome {
            Ok(data) => {
                let text = serde_json::to_string_pretty(&data)
                    .map_err(|e| ErrorData::internal_error(format!("serialization failed: {e}"), None))?;
                CallToolResult::success(vec![Content::text(text)])
            }
            Err(e) => CallToolResult::error(vec![Content::text(json!({ "error": e.to_string() }).to_string())]),
        })
    }

    pub async fn read(&self, uri: &str, caller: CallerContext) -> Result<ReadResourceResult, ErrorData> {
        Ok(resources::read(&self.dispatcher, uri, caller).await?)
    }
}

/// Per-call context overrides the transport-level context, keeping the transport
/// account when the override names none.
fn merge_context(base: CallerContext, call: Option<CallerContext>) -> CallerContext {
    match call {
        Some(mut ctx) => {
            if ctx.account_id.is_empty() {
                ctx.account_id = base.account_id;
            }
            if ctx.user_id.is_none() {
                ctx.user_id = base.user_id;
            }
            ctx
        }
        None => base,
    }
}

impl ServerHandler for CrmTools {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::V_2024_11_05,
            capabilities: ServerCapabilities::builder()
                .enable_prompts()
                .enable_resources()
                .enable_tools()
                .build(),
            server_info: Implementation {
                name: SERVER_NAME.to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
                ..Implementation::from_build_env()
            },
            instructions: Some(
                "CRM tools for a field service business. Call read_agent_memory at the start of a \
                 voice conversation and update_agent_memory after each step. Pass \"last\" as a \
                 jobId or contactId to refer to the record touched most recently."
                    .into(),
            ),
        }
    }

    async fn list_tools(
        &self,
        _request: Option<PaginatedRequestParams>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, ErrorData> {
        Ok(ListToolsResult::with_all_items(self.rmcp_tools()))
    }

    async fn call_tool(
        &self,
        request: CallToolRequestParams,
        context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, ErrorData> {
        let caller = self.caller(&context, request.meta.as_ref());
        self.invoke(&request.name, request.arguments, caller).await
    }

    async fn list_resources(
        &self,
        _request: Option<PaginatedRequestParams>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListResourcesResult, ErrorData> {
        Ok(resources::list())
    }

    async fn list_resource_templates(
        &self,
        _request: Option<PaginatedRequestParams>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListResourceTemplatesResult, ErrorData> {
        Ok(resources::templates())
    }

    async fn read_resource(
        &self,
        request: ReadResourceRequestParams,
        context: RequestContext<RoleServer>,
    ) -> Result<ReadResourceResult, ErrorData> {
        let caller = self.caller(&context, request.meta.as_ref());
        self.read(&request.uri, caller).await
    }

    async fn list_prompts(
        &self,
        _request: Option<PaginatedRequestParams>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListPromptsResult, ErrorData> {
        Ok(prompts::list())
    }

    async fn get_prompt(
        &self,
        request: GetPromptRequestParams,
        _context: RequestContext<RoleServer>,
    ) -> Result<GetPromptResult, ErrorData> {
        Ok(prompts::get(&request.name, &request.arguments.unwrap_or_default())?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn call_context_keeps_transport_account() {
        let base = CallerContext {
            user_id: Some("u".into()),
            ..CallerContext::for_account("acct")
        };
        let call = CallerContext {
            last_job_id: Some("j".into()),
            ..Default::default()
        };
        let merged = merge_context(base, Some(call));
        assert_eq!(merged.account_id, "acct");
        assert_eq!(merged.user_id.as_deref(), Some("u"));
        assert_eq!(merged.last_job_id.as_deref(), Some("j"));
    }

    #[test]
    fn capabilities_cover_every_surface() {
        let conn = crate::db::open_memory_database().unwrap();
        let dispatcher = Dispatcher::new(
            Arc::new(std::sync::Mutex::new(conn)),
            Arc::new(crate::llm::UnconfiguredModel),
            crate::tools::HandlerSettings::default(),
        );
        let info = CrmTools::new(dispatcher, "acct").get_info();
        assert!(info.capabilities.tools.is_some());
        assert!(info.capabilities.resources.is_some());
        assert!(info.capabilities.prompts.is_some());
        assert_eq!(info.server_info.name, SERVER_NAME);
    }

    #[test]
    fn headers_pick_the_account() {
        let conn = crate::db::open_memory_database().unwrap();
        let dispatcher = Dispatcher::new(
            Arc::new(std::sync::Mutex::new(conn)),
            Arc::new(crate::llm::UnconfiguredModel),
            crate::tools::HandlerSettings::default(),
        );
        let tools = CrmTools::new(dispatcher, "default-acct");
        let (parts, _) = axum::http::Request::builder()
            .header("x-account-id", "acct-7")
            .header("x-user-id", "  ")
            .body(())
            .unwrap()
            .into_parts();

        let caller = tools.transport_caller(Some(&parts));
        assert_eq!(caller.account_id, "acct-7");
        assert_eq!(caller.user_id, None);
        assert_eq!(tools.transport_caller(None).account_id, "default-acct");
    }
}
