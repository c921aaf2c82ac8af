mod helpers;

use crm_mcp::llm::ModelUse;
use crm_mcp::tools::{Dispatcher, ToolCallRequest, ToolCallResult};
use helpers::*;
use rusqlite::params;
use serde_json::{json, Value};
use std::sync::Arc;

async fn call(dispatcher: &Dispatcher, tool: &str, args: Value) -> ToolCallResult {
    dispatcher
        .dispatch(ToolCallRequest {
            tool_name: tool.into(),
            arguments: args,
            context: context(),
        })
        .await
}

fn world_with_unreplied_rule() -> (Dispatcher, Arc<ScriptedModel>) {
    let conn = test_db();
    seed_world(&conn);
    // Answered recently, so it is not due.
    seed_conversation(&conn, "conv-2", "contact-1", "sms");
    conn.execute(
        "INSERT INTO messages (id, conversation_id, direction, sender_type, body_text, created_at)
         VALUES ('conv-2-m2', 'conv-2', 'outbound', 'user', 'On our way', '2025-06-10T14:55:00Z')",
        [],
    )
    .unwrap();
    conn.execute(
        "INSERT INTO automation_rules (id, account_id, name, trigger, trigger_config, action, active, created_at)
         VALUES ('rule-1', ?1, 'Draft slow replies', 'unreplied_time', '{\"minutes\": 30}', 'create_draft', 1, ?2)",
        params![ACCOUNT, CREATED],
    )
    .unwrap();
    let model = ScriptedModel::new();
    (test_dispatcher(conn, model.clone()), model)
}

#[tokio::test]
async fn unreplied_conversation_gets_a_draft_and_review_flag() {
    let (dispatcher, model) = world_with_unreplied_rule();
    model.push_text("Hi John, we can fix that faucet tomorrow morning.");

    let run = call(&dispatcher, "run_automation_rules", json!({})).await;
    assert!(run.success, "{:?}", run.error);
    let data = run.data.unwrap();
    assert_eq!(data["rulesChecked"], 1);
    assert_eq!(data["actionsTaken"], 1);
    let result = &data["results"][0];
    assert_eq!(result["action"], "draft_created");
    assert_eq!(result["conversationId"], "conv-1");
    assert_eq!(result["draft"], "Hi John, we can fix that faucet tomorrow morning.");
    assert!(result["draftId"].is_string());

    let requests = model.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].model_use, ModelUse::Analysis);
    assert!(requests[0].messages[0].content.contains("My kitchen faucet is dripping"));

    let conversation = call(&dispatcher, "get_conversation", json!({"conversationId": "conv-1"})).await;
    assert_eq!(conversation.data.unwrap()["conversation"]["needs_review"], true);

    let audit = dispatcher
        .with_store(context(), |env| {
            Ok(env.conn.query_row(
                "SELECT details FROM audit_logs WHERE action = 'automation_triggered' AND entity_id = 'rule-1'",
                [],
                |row| row.get::<_, String>(0),
            )?)
        })
        .await
        .unwrap();
    let details: Value = serde_json::from_str(&audit).unwrap();
    assert_eq!(details["conversationIds"], json!(["conv-1"]));
}

#[tokio::test]
async fn flagged_conversations_are_not_drafted_twice() {
    let (dispatcher, model) = world_with_unreplied_rule();

    let first = call(&dispatcher, "run_automation_rules", json!({})).await;
    assert_eq!(first.data.unwrap()["actionsTaken"], 1);
    let second = call(&dispatcher, "run_automation_rules", json!({})).await;
    assert_eq!(second.data.unwrap()["actionsTaken"], 0);
    assert_eq!(model.requests().len(), 1);

    let reply = call(
        &dispatcher,
        "send_message",
        json!({"conversationId": "conv-1", "body": "We'll be there at 9."}),
    )
    .await;
    assert!(reply.success, "{:?}", reply.error);
    let conversation = call(&dispatcher, "get_conversation", json!({"conversationId": "conv-1"})).await;
    assert_eq!(conversation.data.unwrap()["conversation"]["needs_review"], false);
}

#[tokio::test]
async fn rules_created_through_the_tool_carry_their_minutes() {
    let conn = test_db();
    seed_world(&conn);
    let model = ScriptedModel::new();
    let dispatcher = test_dispatcher(conn, model.clone());

    let created = call(
        &dispatcher,
        "create_automation_rule",
        json!({"name": "Weekly", "trigger": "unreplied_time", "action": "create_draft",
               "triggerConfig": {"minutes": 525600}}),
    )
    .await;
    assert!(created.success, "{:?}", created.error);
    assert_eq!(created.data.unwrap()["rule"]["trigger_config"]["minutes"], 525600);

    // The seeded inbound message is younger than a year.
    let run = call(&dispatcher, "run_automation_rules", json!({})).await;
    assert_eq!(run.data.unwrap()["actionsTaken"], 0);
    assert!(model.requests().is_empty());
}

#[tokio::test]
async fn model_failure_is_reported_per_conversation() {
    let (dispatcher, model) = world_with_unreplied_rule();
    model.push_error("upstream down");

    let run = call(&dispatcher, "run_automation_rules", json!({})).await;
    assert!(run.success, "{:?}", run.error);
    let data = run.data.unwrap();
    assert_eq!(data["actionsTaken"], 0);
    assert_eq!(data["results"][0]["action"], "draft_failed");

    let conversation = call(&dispatcher, "get_conversation", json!({"conversationId": "conv-1"})).await;
    assert_eq!(conversation.data.unwrap()["conversation"]["needs_review"], false);
}
