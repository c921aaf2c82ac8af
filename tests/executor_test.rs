mod helpers;

use async_trait::async_trait;
use crm_mcp::config::CrmConfig;
use crm_mcp::mcp::McpClient;
use crm_mcp::server::{router, AppState};
use crm_mcp::tools::{ToolCallRequest, ToolCallResult};
use crm_mcp::voice::{ExecutionError, FallbackExecutor, LocalExecutor, RemoteExecutor, ToolExecutor};
use helpers::*;
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Executor that never reaches a handler.
#[derive(Default)]
struct Unreachable {
    calls: AtomicUsize,
}

#[async_trait]
impl ToolExecutor for Unreachable {
    async fn execute(&self, _request: &ToolCallRequest) -> Result<ToolCallResult, ExecutionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(ExecutionError::Dispatch("connection refused".into()))
    }

    fn name(&self) -> &'static str {
        "unreachable"
    }
}

/// Executor that reports every call as a failed tool run.
#[derive(Default)]
struct AlwaysFails {
    calls: AtomicUsize,
}

#[async_trait]
impl ToolExecutor for AlwaysFails {
    async fn execute(&self, _request: &ToolCallRequest) -> Result<ToolCallResult, ExecutionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(ToolCallResult {
            success: false,
            data: None,
            error: Some("Job not found".into()),
        })
    }

    fn name(&self) -> &'static str {
        "always-fails"
    }
}

fn list_jobs_request() -> ToolCallRequest {
    ToolCallRequest {
        tool_name: "list_jobs".into(),
        arguments: json!({}),
        context: context(),
    }
}

#[tokio::test]
async fn dispatch_failure_falls_back_to_local() {
    let conn = test_db();
    seed_world(&conn);
    let local = Arc::new(LocalExecutor::new(test_dispatcher(conn, ScriptedModel::new())));
    let primary = Arc::new(Unreachable::default());
    let executor = FallbackExecutor::new(primary.clone(), local);

    let result = executor.execute(&list_jobs_request()).await.unwrap();
    assert!(result.success);
    assert_eq!(result.data.unwrap()["jobCount"], 1);
    assert_eq!(primary.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn tool_failure_does_not_fall_back() {
    let primary = Arc::new(AlwaysFails::default());
    let secondary = Arc::new(Unreachable::default());
    let executor = FallbackExecutor::new(primary.clone(), secondary.clone());

    let result = executor.execute(&list_jobs_request()).await.unwrap();
    assert!(!result.success);
    assert_eq!(result.error.as_deref(), Some("Job not found"));
    assert_eq!(secondary.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn local_executor_rejects_unknown_tools_as_dispatch_errors() {
    let conn = test_db();
    seed_world(&conn);
    let local = LocalExecutor::new(test_dispatcher(conn, ScriptedModel::new()));

    let request = ToolCallRequest {
        tool_name: "no_such_tool".into(),
        ..list_jobs_request()
    };
    let err = local.execute(&request).await.unwrap_err();
    assert!(matches!(err, ExecutionError::Dispatch(_)));
}

#[tokio::test]
async fn remote_executor_calls_the_http_endpoint() {
    let conn = test_db();
    let world = seed_world(&conn);
    let state = AppState::new(test_dispatcher(conn, ScriptedModel::new()), &CrmConfig::default()).unwrap();

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router(state)).await.unwrap();
    });

    let client = McpClient::new(format!("http://{addr}/mcp"), Duration::from_secs(5)).unwrap();
    let remote = RemoteExecutor::new(client);

    let ok = remote
        .execute(&ToolCallRequest {
            tool_name: "get_job".into(),
            arguments: json!({"jobId": world.job}),
            context: context(),
        })
        .await
        .unwrap();
    assert!(ok.success, "{:?}", ok.error);
    assert_eq!(ok.data.unwrap()["job"]["id"], world.job);

    let missing = remote
        .execute(&ToolCallRequest {
            tool_name: "get_job".into(),
            arguments: json!({"jobId": "nope"}),
            context: context(),
        })
        .await
        .unwrap();
    assert!(!missing.success);
    assert!(missing.error.unwrap().contains("not found"));
}

#[tokio::test]
async fn unreachable_remote_is_a_dispatch_failure() {
    let client = McpClient::new("http://127.0.0.1:1/mcp", Duration::from_secs(2)).unwrap();
    let remote = RemoteExecutor::new(client);
    assert!(remote.execute(&list_jobs_request()).await.is_err());
}
