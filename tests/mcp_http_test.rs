mod helpers;

use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::Router;
use crm_mcp::config::CrmConfig;
use crm_mcp::server::{router, AppState};
use helpers::*;
use serde_json::{json, Value};
use tower::ServiceExt;

const STREAMABLE_ACCEPT: &str = "application/json, text/event-stream";

fn app() -> Router {
    let conn = test_db();
    seed_world(&conn);
    let mut config = CrmConfig::default();
    config.storage.default_account_id = ACCOUNT.to_string();
    router(AppState::new(test_dispatcher(conn, ScriptedModel::new()), &config).unwrap())
}

fn post(uri: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::ACCEPT, STREAMABLE_ACCEPT)
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn body_text(response: axum::response::Response) -> String {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    serde_json::from_str(&body_text(response).await).unwrap()
}

/// The JSON-RPC reply carried in the `data:` lines of an event stream.
async fn reply(response: axum::response::Response) -> Value {
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "text/event-stream");
    let text = body_text(response).await;
    text.lines()
        .filter_map(|line| line.strip_prefix("data:"))
        .map(str::trim)
        .filter(|data| !data.is_empty())
        .filter_map(|data| serde_json::from_str::<Value>(data).ok())
        .find(|msg| msg.get("result").is_some() || msg.get("error").is_some())
        .unwrap_or_else(|| panic!("no reply in stream: {text}"))
}

async fn rpc(body: Value) -> Value {
    reply(app().oneshot(post("/mcp", &body.to_string())).await.unwrap()).await
}

#[tokio::test]
async fn initialize_reports_protocol_version() {
    let body = rpc(json!({"jsonrpc": "2.0", "id": 1, "method": "initialize", "params": {
        "protocolVersion": "2024-11-05",
        "capabilities": {},
        "clientInfo": {"name": "test", "version": "0"}
    }}))
    .await;
    assert_eq!(body["result"]["protocolVersion"], "2024-11-05");
    assert_eq!(body["result"]["serverInfo"]["name"], "crm-mcp");
    let capabilities = &body["result"]["capabilities"];
    assert!(capabilities["tools"].is_object());
    assert!(capabilities["resources"].is_object());
    assert!(capabilities["prompts"].is_object());
}

#[tokio::test]
async fn clients_must_accept_an_event_stream() {
    let request = Request::builder()
        .method("POST")
        .uri("/mcp")
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::ACCEPT, "application/json")
        .body(Body::from(r#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#))
        .unwrap();
    let response = app().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_ACCEPTABLE);
}

#[tokio::test]
async fn malformed_messages_are_rejected() {
    let unparseable = app().oneshot(post("/mcp", "{nope")).await.unwrap();
    assert_eq!(unparseable.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);

    let no_version = app()
        .oneshot(post("/mcp", r#"{"id":1,"method":"tools/list"}"#))
        .await
        .unwrap();
    assert_eq!(no_version.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
}

#[tokio::test]
async fn null_id_request_gets_an_answer_with_null_id() {
    let response = app()
        .oneshot(post("/mcp", r#"{"jsonrpc":"2.0","id":null,"method":"tools/list"}"#))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["jsonrpc"], "2.0");
    assert!(body.as_object().unwrap().contains_key("id"));
    assert_eq!(body["id"], Value::Null);
    assert_eq!(body["error"]["code"], -32600);
}

#[tokio::test]
async fn unknown_method_is_method_not_found() {
    let body = rpc(json!({"jsonrpc": "2.0", "id": "a", "method": "tools/explode"})).await;
    assert_eq!(body["id"], "a");
    assert_eq!(body["error"]["code"], -32601);
}

#[tokio::test]
async fn notifications_get_no_body() {
    let response = app()
        .oneshot(post("/mcp", r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    assert!(body_text(response).await.is_empty());
}

#[tokio::test]
async fn ping_answers_with_an_empty_result() {
    let body = rpc(json!({"jsonrpc": "2.0", "id": 3, "method": "ping"})).await;
    assert_eq!(body["id"], 3);
    assert_eq!(body["result"], json!({}));
}

#[tokio::test]
async fn tools_list_carries_the_catalog() {
    let body = rpc(json!({"jsonrpc": "2.0", "id": 2, "method": "tools/list"})).await;
    let tools = body["result"]["tools"].as_array().unwrap();
    assert_eq!(tools.len(), crm_mcp::tools::Catalog::builtin().len());
    let create = tools.iter().find(|t| t["name"] == "create_job").unwrap();
    assert_eq!(create["inputSchema"]["type"], "object");
    assert!(create["inputSchema"]["required"]
        .as_array()
        .unwrap()
        .contains(&json!("description")));
}

#[tokio::test]
async fn tool_call_uses_header_account() {
    let call = json!({"jsonrpc": "2.0", "id": 4, "method": "tools/call",
                      "params": {"name": "get_job", "arguments": {"jobId": "job-1"}}});
    let mut request = post("/mcp", &call.to_string());
    request
        .headers_mut()
        .insert("x-account-id", "someone-else".parse().unwrap());
    let other = reply(app().oneshot(request).await.unwrap()).await;
    assert_eq!(other["result"]["isError"], true);

    let own = rpc(call).await;
    assert_eq!(own["result"]["isError"], false);
}

#[tokio::test]
async fn caller_context_in_meta_resolves_last() {
    let body = rpc(json!({"jsonrpc": "2.0", "id": 5, "method": "tools/call", "params": {
        "name": "get_job",
        "arguments": {"jobId": "last"},
        "_meta": {"callerContext": {"lastJobId": "job-1"}}
    }}))
    .await;
    assert_eq!(body["result"]["isError"], false, "{}", body["result"]["content"][0]["text"]);
    let payload: Value = serde_json::from_str(body["result"]["content"][0]["text"].as_str().unwrap()).unwrap();
    assert_eq!(payload["job"]["id"], "job-1");
}

#[tokio::test]
async fn resources_are_listed_and_read() {
    let listed = rpc(json!({"jsonrpc": "2.0", "id": 6, "method": "resources/list"})).await;
    let uris: Vec<_> = listed["result"]["resources"]
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["uri"].as_str().unwrap().to_string())
        .collect();
    assert!(uris.contains(&"crm://catalog".to_string()));
    assert!(uris.contains(&"crm://dashboard".to_string()));

    let templates = rpc(json!({"jsonrpc": "2.0", "id": 7, "method": "resources/templates/list"})).await;
    assert_eq!(
        templates["result"]["resourceTemplates"][0]["uriTemplate"],
        "crm://memory/{userIdentifier}"
    );

    let body = rpc(json!({"jsonrpc": "2.0", "id": 8, "method": "resources/read",
                          "params": {"uri": "crm://catalog"}}))
    .await;
    let contents = &body["result"]["contents"][0];
    assert_eq!(contents["uri"], "crm://catalog");
    let catalog: Value = serde_json::from_str(contents["text"].as_str().unwrap()).unwrap();
    assert!(catalog.as_array().unwrap().len() > 80);
}

#[tokio::test]
async fn unknown_resource_is_not_found() {
    let body = rpc(json!({"jsonrpc": "2.0", "id": 9, "method": "resources/read",
                          "params": {"uri": "crm://nowhere"}}))
    .await;
    assert_eq!(body["error"]["code"], -32002);
}

#[tokio::test]
async fn prompts_are_listed_and_rendered() {
    let listed = rpc(json!({"jsonrpc": "2.0", "id": 10, "method": "prompts/list"})).await;
    let names: Vec<_> = listed["result"]["prompts"]
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["name"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(names, vec!["voice_command", "confirm_action", "draft_reply"]);

    let prompt = rpc(json!({"jsonrpc": "2.0", "id": 11, "method": "prompts/get", "params": {
        "name": "draft_reply",
        "arguments": {"conversationId": "conv-1"}
    }}))
    .await;
    let text = prompt["result"]["messages"][0]["content"]["text"].as_str().unwrap();
    assert!(text.contains("conv-1"));

    let missing = rpc(json!({"jsonrpc": "2.0", "id": 12, "method": "prompts/get",
                             "params": {"name": "draft_reply"}}))
    .await;
    assert_eq!(missing["error"]["code"], -32602);
}

#[tokio::test]
async fn health_reports_tool_count() {
    let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
    let response = app().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["tools"], crm_mcp::tools::Catalog::builtin().len());
}
