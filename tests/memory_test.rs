mod helpers;

use chrono::TimeDelta;
use crm_mcp::crm::memory::load_memory;
use crm_mcp::tools::{ToolCallRequest, ToolCallResult};
use helpers::*;
use rusqlite::params;
use serde_json::{json, Value};

fn insert_memory(conn: &rusqlite::Connection, user: &str, hours_ago: i64) {
    let at = fixed_now() - TimeDelta::hours(hours_ago);
    conn.execute(
        "INSERT INTO agent_memory (id, user_identifier, conversation_summary, intent, session_id,
                                   last_active_at, created_at)
         VALUES (?1, ?2, 'Booking a water heater job', 'creating_job', 'sess-1', ?3, ?3)",
        params![format!("mem-{user}"), user, crm_mcp::resolve::format_timestamp(at)],
    )
    .unwrap();
}

async fn call(dispatcher: &crm_mcp::tools::Dispatcher, tool: &str, args: Value) -> ToolCallResult {
    dispatcher
        .dispatch(ToolCallRequest {
            tool_name: tool.into(),
            arguments: args,
            context: context(),
        })
        .await
}

#[test]
fn memory_inside_the_window_is_found() {
    let conn = test_db();
    insert_memory(&conn, "+15550001", 71);

    let memory = load_memory(&conn, "+15550001", fixed_now(), 72).unwrap();
    assert_eq!(memory["found"], true);
    assert_eq!(memory["summary"], "Booking a water heater job");
    assert_eq!(memory["intent"], "creating_job");
    assert_eq!(memory["sessionId"], "sess-1");
}

#[test]
fn memory_outside_the_window_is_not_found() {
    let conn = test_db();
    insert_memory(&conn, "+15550002", 73);

    let memory = load_memory(&conn, "+15550002", fixed_now(), 72).unwrap();
    assert_eq!(memory["found"], false);
    assert_eq!(memory["message"], "No previous conversation found within 72 hours");
}

#[test]
fn memory_exactly_at_the_window_edge_is_found() {
    let conn = test_db();
    insert_memory(&conn, "+15550003", 72);

    let memory = load_memory(&conn, "+15550003", fixed_now(), 72).unwrap();
    assert_eq!(memory["found"], true);
    assert_eq!(memory["sessionId"], "sess-1");

    let just_past = fixed_now() + TimeDelta::seconds(1);
    assert_eq!(load_memory(&conn, "+15550003", just_past, 72).unwrap()["found"], false);
}

#[test]
fn blank_identifier_is_rejected() {
    let conn = test_db();
    let err = load_memory(&conn, "  ", fixed_now(), 72).unwrap_err();
    assert_eq!(err.to_string(), "User identifier is required");
}

#[tokio::test]
async fn update_then_read_round_trips_state() {
    let conn = test_db();
    seed_world(&conn);
    let dispatcher = test_dispatcher(conn, ScriptedModel::new());

    let saved = call(
        &dispatcher,
        "update_agent_memory",
        json!({
            "userIdentifier": "caller@example.test",
            "summary": "Collecting job details",
            "intent": "creating_job",
            "stagingData": "{\"contactName\": \"John\"}",
            "conversationHistory": [{"role": "user", "content": "new job for John"}],
            "userPreferences": {"units": "imperial"},
        }),
    )
    .await;
    assert!(saved.success, "{:?}", saved.error);
    let saved = saved.data.unwrap();
    assert_eq!(saved["historyCount"], 1);
    let session = saved["sessionId"].clone();

    let read = call(&dispatcher, "read_agent_memory", json!({"userIdentifier": "caller@example.test"})).await;
    let memory = read.data.unwrap();
    assert_eq!(memory["found"], true);
    assert_eq!(memory["summary"], "Collecting job details");
    assert_eq!(memory["intent"], "creating_job");
    assert_eq!(memory["sessionId"], session);
}

#[tokio::test]
async fn second_save_appends_history_and_keeps_session() {
    let conn = test_db();
    seed_world(&conn);
    let dispatcher = test_dispatcher(conn, ScriptedModel::new());

    let first = call(
        &dispatcher,
        "update_agent_memory",
        json!({"userIdentifier": "u-9", "summary": "one", "conversationHistory": [{"role": "user", "content": "a"}]}),
    )
    .await
    .data
    .unwrap();
    let second = call(
        &dispatcher,
        "update_agent_memory",
        json!({"userIdentifier": "u-9", "summary": "two", "conversationHistory": [{"role": "assistant", "content": "b"}]}),
    )
    .await
    .data
    .unwrap();

    assert_eq!(second["historyCount"], 2);
    assert_eq!(second["memoryId"], first["memoryId"]);
    assert_eq!(second["sessionId"], first["sessionId"]);

    let memory = call(&dispatcher, "read_agent_memory", json!({"userIdentifier": "u-9"})).await.data.unwrap();
    assert_eq!(memory["summary"], "two");
    assert_eq!(memory["intent"], "in_progress");
}

#[tokio::test]
async fn malformed_staging_json_is_a_validation_error() {
    let conn = test_db();
    seed_world(&conn);
    let dispatcher = test_dispatcher(conn, ScriptedModel::new());

    let result = call(
        &dispatcher,
        "update_agent_memory",
        json!({"userIdentifier": "u-1", "summary": "x", "stagingData": "{not json"}),
    )
    .await;
    assert!(!result.success);
    assert_eq!(result.error.as_deref(), Some("Invalid JSON in stagingData parameter"));
}
