//! Tool execution paths for voice commands.
//!
//! [`FallbackExecutor`] tries a primary executor (usually a remote MCP endpoint) and
//! only falls back when the call could not be dispatched. A tool that ran and
//! reported an error is final.

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

use crate::error::ToolError;
use crate::mcp::{McpClient, McpClientError};
use crate::tools::{Dispatcher, ToolCallRequest, ToolCallResult};

/// The call never reached a handler.
#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error(transparent)]
    Remote(#[from] McpClientError),

    #[error("{0}")]
    Dispatch(String),
}

#[async_trait]
pub trait ToolExecutor: Send + Sync {
    async fn execute(&self, request: &ToolCallRequest) -> Result<ToolCallResult, ExecutionError>;

    /// Label used in logs.
    fn name(&self) -> &'static str;
}

/// Runs calls through the in-process dispatcher.
pub struct LocalExecutor {
    dispatcher: Dispatcher,
}

impl LocalExecutor {
    pub fn new(dispatcher: Dispatcher) -> Self {
        Self { dispatcher }
    }
}

#[async_trait]
impl ToolExecutor for LocalExecutor {
    async fn execute(&self, request: &ToolCallRequest) -> Result<ToolCallResult, ExecutionError> {
        match self.dispatcher.call(request.clone()).await {
            Err(ToolError::UnknownTool(name)) => Err(ExecutionError::Dispatch(format!("unknown tool: {name}"))),
            outcome => Ok(outcome.into()),
        }
    }

    fn name(&self) -> &'static str {
        "local"
    }
}

/// Runs calls through a remote MCP endpoint.
pub struct RemoteExecutor {
    client: McpClient,
}

impl RemoteExecutor {
    pub fn new(client: McpClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ToolExecutor for RemoteExecutor {
    async fn execute(&self, request: &ToolCallRequest) -> Result<ToolCallResult, ExecutionError> {
        Ok(self
            .client
            .call_tool(&request.tool_name, &request.arguments, &request.context)
            .await?)
    }

    fn name(&self) -> &'static str {
        "remote"
    }
}

pub struct FallbackExecutor {
    primary: Arc<dyn ToolExecutor>,
    secondary: Arc<dyn ToolExecutor>,
}

impl FallbackExecutor {
    pub fn new(primary: Arc<dyn ToolExecutor>, secondary: Arc<dyn ToolExecutor>) -> Self {
        Self { primary, secondary }
    }
}

#[async_trait]
impl ToolExecutor for FallbackExecutor {
    async fn execute(&self, request: &ToolCallRequest) -> Result<ToolCallResult, ExecutionError> {
        match self.primary.execute(request).await {
            Ok(result) => Ok(result),
            Err(e) => {
                tracing::warn!(
                    tool = %request.tool_name,
                    primary = self.primary.name(),
                    secondary = self.secondary.name(),
                    error = %e,
                    "dispatch failed, falling back"
                );
                self.secondary.execute(request).await
            }
        }
    }

    fn name(&self) -> &'static str {
        "fallback"
    }
}
