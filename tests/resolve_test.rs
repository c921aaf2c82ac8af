mod helpers;

use crm_mcp::resolve::{find_contact_by_name, resolve_contact, resolve_conversation, resolve_tech};
use crm_mcp::tools::ToolCallRequest;
use helpers::*;
use serde_json::json;

#[test]
fn name_ties_go_to_the_earliest_contact() {
    let conn = test_db();
    seed_account(&conn, ACCOUNT);
    seed_contact(&conn, "c-late", "John", "Baker", "2025-03-01T00:00:00Z");
    seed_contact(&conn, "c-early", "John", "Adams", "2025-01-01T00:00:00Z");
    seed_contact(&conn, "c-other", "Mary", "Jones", "2024-12-01T00:00:00Z");

    let found = find_contact_by_name(&conn, ACCOUNT, "John").unwrap();
    assert_eq!(found.as_deref(), Some("c-early"));

    let full = find_contact_by_name(&conn, ACCOUNT, "john baker").unwrap();
    assert_eq!(full.as_deref(), Some("c-late"));
}

#[test]
fn wildcards_in_names_match_literally() {
    let conn = test_db();
    seed_account(&conn, ACCOUNT);
    seed_contact(&conn, "c-john", "John", "Smith", "2025-01-01T00:00:00Z");
    seed_contact(&conn, "c-mary", "Mary", "Jones", "2025-01-02T00:00:00Z");
    seed_contact(&conn, "c-under", "Ann_Marie", "Kent", "2025-01-03T00:00:00Z");

    assert_eq!(find_contact_by_name(&conn, ACCOUNT, "_").unwrap().as_deref(), Some("c-under"));
    assert_eq!(find_contact_by_name(&conn, ACCOUNT, "%").unwrap(), None);
    assert_eq!(find_contact_by_name(&conn, ACCOUNT, "j%n").unwrap(), None);
    assert_eq!(find_contact_by_name(&conn, ACCOUNT, "ann_m").unwrap().as_deref(), Some("c-under"));
}

#[test]
fn contact_reference_accepts_id_or_name() {
    let conn = test_db();
    seed_account(&conn, ACCOUNT);
    seed_contact(&conn, "c-1", "Sarah", "Lee", CREATED);

    assert_eq!(resolve_contact(&conn, ACCOUNT, "c-1").unwrap(), "c-1");
    assert_eq!(resolve_contact(&conn, ACCOUNT, "sarah").unwrap(), "c-1");
    let err = resolve_contact(&conn, ACCOUNT, "Nobody").unwrap_err();
    assert_eq!(err.kind(), "not_found");
}

#[test]
fn only_technicians_resolve_as_techs() {
    let conn = test_db();
    seed_account(&conn, ACCOUNT);
    seed_user(&conn, "u-owner", "Mike", "Owner", "owner");
    seed_user(&conn, "u-tech", "Mike", "Torres", "tech");

    assert_eq!(resolve_tech(&conn, ACCOUNT, "Mike").unwrap(), "u-tech");
    assert!(resolve_tech(&conn, ACCOUNT, "u-owner").is_err());
}

#[test]
fn conversation_resolves_through_contact_name() {
    let conn = test_db();
    let world = seed_world(&conn);
    assert_eq!(resolve_conversation(&conn, ACCOUNT, "John Smith").unwrap(), world.conversation);
}

#[tokio::test]
async fn last_placeholder_uses_the_carried_context() {
    let conn = test_db();
    let world = seed_world(&conn);
    let dispatcher = test_dispatcher(conn, ScriptedModel::new());

    let mut ctx = context();
    ctx.last_contact_id = Some(world.contact.to_string());
    let result = dispatcher
        .dispatch(ToolCallRequest {
            tool_name: "get_contact".into(),
            arguments: json!({"contactId": "current"}),
            context: ctx,
        })
        .await;
    assert!(result.success, "{:?}", result.error);
    assert_eq!(result.data.unwrap()["contactId"], world.contact);
}

#[tokio::test]
async fn relative_dates_use_the_dispatcher_clock() {
    let conn = test_db();
    let world = seed_world(&conn);
    let dispatcher = test_dispatcher(conn, ScriptedModel::new());

    let today = dispatcher
        .dispatch(ToolCallRequest {
            tool_name: "list_jobs".into(),
            arguments: json!({"date": "today"}),
            context: context(),
        })
        .await;
    let data = today.data.unwrap();
    assert_eq!(data["jobCount"], 1);
    assert_eq!(data["jobs"][0]["id"], world.job);

    let tomorrow = dispatcher
        .dispatch(ToolCallRequest {
            tool_name: "list_jobs".into(),
            arguments: json!({"date": "tomorrow"}),
            context: context(),
        })
        .await;
    assert_eq!(tomorrow.data.unwrap()["jobCount"], 0);
}
