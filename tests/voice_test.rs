mod helpers;

use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use crm_mcp::config::{CrmConfig, VoiceConfig};
use crm_mcp::llm::ModelUse;
use crm_mcp::server::{router, AppState};
use crm_mcp::voice::{formatter, LocalExecutor, VoiceAgent, VoiceContext, VoiceError, VoiceRequest};
use helpers::*;
use rusqlite::params;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

fn voice_config(summarize: bool) -> VoiceConfig {
    VoiceConfig {
        mcp_url: None,
        summarize,
        max_history_turns: 10,
    }
}

fn agent(conn: rusqlite::Connection, model: Arc<ScriptedModel>, summarize: bool) -> VoiceAgent {
    let dispatcher = test_dispatcher(conn, model);
    let local = Arc::new(LocalExecutor::new(dispatcher.clone()));
    VoiceAgent::new(dispatcher, local, voice_config(summarize))
}

fn say(text: &str) -> VoiceRequest {
    VoiceRequest {
        account_id: Some(ACCOUNT.into()),
        transcription: Some(text.into()),
        ..Default::default()
    }
}

#[tokio::test]
async fn multi_call_turn_carries_context_forward() {
    let conn = test_db();
    seed_world(&conn);
    let model = ScriptedModel::new();
    model.push_calls(&[
        ("create_job", json!({"contactName": "John", "description": "Fix the sink"})),
        ("update_job_status", json!({"jobId": "last", "status": "scheduled"})),
    ]);
    let agent = agent(conn, model.clone(), true);

    let response = agent
        .handle(say("new job for John to fix the sink and mark it scheduled"))
        .await
        .unwrap();

    assert!(response.success);
    assert_eq!(response.calls.len(), 2);
    assert!(response.calls.iter().all(|c| c.success));
    let created = response.calls[0].result.as_ref().unwrap()["jobId"].clone();
    assert_eq!(response.action, "update_job_status");
    assert_eq!(response.result.as_ref().unwrap()["jobId"], created);
    assert_eq!(response.context.last_job_id.as_deref(), created.as_str());
    assert_eq!(response.response, DEFAULT_SUMMARY);

    let requests = model.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].model_use, ModelUse::Voice);
    assert!(!requests[0].functions.is_empty());
    assert_eq!(requests[1].model_use, ModelUse::Summary);
}

#[tokio::test]
async fn list_results_are_spoken_with_templates() {
    let conn = test_db();
    seed_world(&conn);
    let model = ScriptedModel::new();
    model.push_calls(&[("list_jobs", json!({"date": "today"}))]);
    let agent = agent(conn, model.clone(), true);

    let response = agent.handle(say("what's on today")).await.unwrap();
    let jobs = response.extras["jobs"].as_array().unwrap().clone();
    assert_eq!(jobs.len(), 1);
    assert_eq!(response.extras["jobCount"], 1);
    assert_eq!(response.response, formatter::format_jobs(&jobs));
    assert_eq!(response.extras["formatted"], response.response.as_str());
    // Formatted replies skip the summary model.
    assert_eq!(model.requests().len(), 1);
}

#[tokio::test]
async fn failed_call_gets_an_apology() {
    let conn = test_db();
    seed_world(&conn);
    let model = ScriptedModel::new();
    model.push_calls(&[("get_job", json!({"jobId": "missing"}))]);
    let agent = agent(conn, model, true);

    let response = agent.handle(say("open job missing")).await.unwrap();
    assert!(!response.success);
    let error = response.error.clone().unwrap();
    assert!(error.contains("not found"));
    assert_eq!(response.response, formatter::error_reply(&error));
    assert!(response.response.ends_with("Please check the name or ID and try again."));
}

#[tokio::test]
async fn no_tool_call_returns_model_text_or_help() {
    let conn = test_db();
    seed_world(&conn);
    let model = ScriptedModel::new();
    model.push_text("Sure, what would you like to do?");
    let agent = agent(conn, model, false);

    let first = agent.handle(say("hello")).await.unwrap();
    assert_eq!(first.action, "unknown");
    assert_eq!(first.response, "Sure, what would you like to do?");

    let second = agent.handle(say("mumble")).await.unwrap();
    assert_eq!(second.response, formatter::HELP_REPLY);
    assert!(second.calls.is_empty());
}

#[tokio::test]
async fn canned_confirmation_without_summaries() {
    let conn = test_db();
    let world = seed_world(&conn);
    let model = ScriptedModel::new();
    model.push_calls(&[("delete_job", json!({"jobId": world.job}))]);
    let agent = agent(conn, model.clone(), false);

    let response = agent.handle(say("delete that job")).await.unwrap();
    assert!(response.success);
    assert_eq!(response.response, "Job deleted successfully");
    assert_eq!(model.requests().len(), 1);
}

#[tokio::test]
async fn persona_prompt_and_context_reach_the_model() {
    let conn = test_db();
    let world = seed_world(&conn);
    conn.execute(
        "UPDATE accounts SET persona_config = ?1 WHERE id = ?2",
        params![json!({"systemPrompt": "You are Pip, the plumbing assistant."}).to_string(), ACCOUNT],
    )
    .unwrap();
    let model = ScriptedModel::new();
    let agent = agent(conn, model.clone(), false);

    let request = VoiceRequest {
        context: Some(VoiceContext {
            last_job_id: Some(world.job.into()),
            conversation_history: vec![
                json!({"role": "user", "content": "show me today's jobs"}),
                json!({"role": "assistant", "content": "You have one job."}),
            ],
            ..Default::default()
        }),
        ..say("mark it in progress")
    };
    agent.handle(request).await.unwrap();

    let sent = &model.requests()[0];
    assert!(sent.system_prompt.starts_with("You are Pip, the plumbing assistant."));
    assert!(sent.system_prompt.ends_with(&format!("Current context: lastJobId={}", world.job)));
    assert_eq!(sent.messages.len(), 3);
    assert!(sent.messages[2].content.contains("mark it in progress"));
}

#[tokio::test]
async fn request_validation_errors() {
    let conn = test_db();
    seed_world(&conn);
    let agent = agent(conn, ScriptedModel::new(), false);

    let missing = agent
        .handle(VoiceRequest {
            account_id: Some(ACCOUNT.into()),
            ..Default::default()
        })
        .await
        .unwrap_err();
    assert!(matches!(missing, VoiceError::MissingFields));

    let unknown = agent
        .handle(VoiceRequest {
            account_id: Some("acct-unknown".into()),
            ..say("list jobs")
        })
        .await
        .unwrap_err();
    assert!(matches!(unknown, VoiceError::InvalidAccount));
}

#[tokio::test]
async fn model_failure_is_internal() {
    let conn = test_db();
    seed_world(&conn);
    let model = ScriptedModel::new();
    model.push_error("rate limited");
    let agent = agent(conn, model, false);

    let err = agent.handle(say("list jobs")).await.unwrap_err();
    assert_eq!(err.status(), 500);
    assert_eq!(err.body()["error"], "Internal Server Error");
}

async fn post_voice(body: Value) -> (StatusCode, Value) {
    let conn = test_db();
    seed_world(&conn);
    let model = ScriptedModel::new();
    model.push_calls(&[("list_contacts", json!({}))]);
    let state = AppState::new(test_dispatcher(conn, model), &CrmConfig::default()).unwrap();

    let request = Request::builder()
        .method("POST")
        .uri("/voice-command")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    let response = router(state).oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

#[tokio::test]
async fn voice_endpoint_status_codes() {
    let (status, body) = post_voice(json!({"transcription": "list contacts"})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Missing required fields: accountId, transcription");

    let (status, body) = post_voice(json!({"accountId": "nope", "transcription": "list contacts"})).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "Invalid account ID");

    let (status, body) = post_voice(json!({"accountId": ACCOUNT, "transcription": "list contacts"})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["action"], "list_contacts");
    assert_eq!(body["contactCount"], 1);
    assert_eq!(body["response"], "Found 1 contact: John Smith, email contact-1@example.test.");
    assert_eq!(body["calls"].as_array().unwrap().len(), 1);
}
