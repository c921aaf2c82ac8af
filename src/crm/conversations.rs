use rusqlite::{params, params_from_iter, Connection};
use serde_json::{json, Map, Value};

use super::contacts::insert_note;
use super::{fetch_one, new_id, page_limit, page_offset, query_rows, require_text, write_audit, Filter, DEFAULT_LIMIT};
use crate::error::ToolResult;
use crate::resolve;
use crate::tools::conversations::*;
use crate::tools::{AnalysisRequest, ToolEnv};

const CONVERSATION_SELECT: &str = "SELECT v.id, v.account_id, v.contact_id, v.subject, v.channel, v.status,
        v.needs_review, v.last_message_at, v.created_at,
        CASE WHEN c.id IS NULL THEN NULL ELSE json_object(
            'id', c.id, 'first_name', c.first_name, 'last_name', c.last_name,
            'email', c.email, 'phone', c.phone) END AS contact
    FROM conversations v
    LEFT JOIN contacts c ON c.id = v.contact_id";

const LIST_DEFAULT_LIMIT: i64 = 100;

pub fn fetch_conversation(conn: &Connection, account_id: &str, id: &str) -> ToolResult<Value> {
    fetch_one(
        conn,
        &format!("{CONVERSATION_SELECT} WHERE v.id = ?1 AND v.account_id = ?2"),
        params![id, account_id],
        "Conversation",
    )
}

/// Messages of a conversation, oldest first.
fn recent_messages(conn: &Connection, conversation_id: &str, limit: i64) -> ToolResult<Vec<Value>> {
    let mut messages = query_rows(
        conn,
        "SELECT id, direction, sender_type, subject, body_text, created_at FROM messages
         WHERE conversation_id = ?1 ORDER BY created_at DESC, id DESC LIMIT ?2",
        params![conversation_id, limit],
    )?;
    messages.reverse();
    Ok(messages)
}

pub fn list_conversations(env: &ToolEnv<'_>, p: ListConversationsParams) -> ToolResult<Value> {
    let mut filter = Filter::account("v.account_id", env.account());
    if let Some(reference) = p.contact_id.as_deref() {
        let contact_id = resolve::resolve_contact(env.conn, env.account(), reference)?;
        filter.eq("v.contact_id", contact_id);
    }
    filter.eq_opt("v.status", p.status.map(|s| s.as_str().to_string()));

    let conversations = query_rows(
        env.conn,
        &format!(
            "{CONVERSATION_SELECT}{} ORDER BY v.last_message_at DESC, v.id DESC LIMIT ? OFFSET ?",
            filter.where_sql()
        ),
        params_from_iter(filter.values_with(&[
            page_limit(p.limit, LIST_DEFAULT_LIMIT),
            page_offset(p.offset),
        ])),
    )?;
    Ok(json!({ "conversationCount": conversations.len(), "conversations": conversations }))
}

pub fn get_conversation(env: &ToolEnv<'_>, p: GetConversationParams) -> ToolResult<Value> {
    let id = resolve::resolve_conversation(env.conn, env.account(), &p.conversation_id)?;
    let conversation = fetch_conversation(env.conn, env.account(), &id)?;
    let messages = recent_messages(env.conn, &id, page_limit(p.limit, DEFAULT_LIMIT))?;
    Ok(json!({ "conversation": conversation, "conversationId": id, "messages": messages }))
}

pub fn create_conversation(env: &ToolEnv<'_>, p: CreateConversationParams) -> ToolResult<Value> {
    let contact_id = resolve::resolve_contact(env.conn, env.account(), &p.contact_id)?;
    let channel = p.channel.as_deref().unwrap_or("email");
    let id = new_id();
    let now = env.timestamp();
    env.conn.execute(
        "INSERT INTO conversations (id, account_id, contact_id, subject, channel, status, last_message_at, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, 'open', ?6, ?6)",
        params![id, env.account(), contact_id, p.subject, channel, now],
    )?;
    write_audit(env, "create", "conversation", Some(&id), None)?;
    let conversation = fetch_conversation(env.conn, env.account(), &id)?;
    Ok(json!({ "success": true, "conversation": conversation, "conversationId": id }))
}

pub fn update_conversation_status(
    env: &ToolEnv<'_>,
    p: UpdateConversationStatusParams,
) -> ToolResult<Value> {
    let id = resolve::resolve_conversation(env.conn, env.account(), &p.conversation_id)?;
    env.conn.execute(
        "UPDATE conversations SET status = ?1 WHERE id = ?2 AND account_id = ?3",
        params![p.status.as_str(), id, env.account()],
    )?;
    write_audit(
        env,
        "update_status",
        "conversation",
        Some(&id),
        Some(&json!({"status": p.status.as_str()})),
    )?;
    let conversation = fetch_conversation(env.conn, env.account(), &id)?;
    Ok(json!({ "success": true, "conversation": conversation, "conversationId": id }))
}

/// Record an outbound message. Email conversations also queue the message in the
/// outbox for the contact's address.
pub fn send_message(env: &ToolEnv<'_>, p: SendMessageParams) -> ToolResult<Value> {
    let id = resolve::resolve_conversation(env.conn, env.account(), &p.conversation_id)?;
    let body = require_text(&p.body, "body")?;
    let conversation = fetch_conversation(env.conn, env.account(), &id)?;
    let now = env.timestamp();
    let subject = p
        .subject
        .clone()
        .or_else(|| conversation["subject"].as_str().map(str::to_string));

    let message_id = new_id();
    env.conn.execute(
        "INSERT INTO messages (id, conversation_id, direction, sender_type, subject, body_text, created_at)
         VALUES (?1, ?2, 'outbound', 'user', ?3, ?4, ?5)",
        params![message_id, id, subject, body, now],
    )?;
    env.conn.execute(
        "UPDATE conversations SET last_message_at = ?1, needs_review = 0 WHERE id = ?2",
        params![now, id],
    )?;

    let recipient = conversation["contact"]["email"].as_str();
    let queued = match (conversation["channel"].as_str(), recipient) {
        (Some("email"), Some(to)) => {
            super::marketing::queue_email(
                env,
                to,
                subject.as_deref().unwrap_or("(no subject)"),
                body,
                "message",
                Some(&message_id),
            )?;
            true
        }
        _ => false,
    };
    write_audit(env, "send_message", "conversation", Some(&id), Some(&json!({"messageId": message_id})))?;

    Ok(json!({
        "success": true,
        "conversationId": id,
        "messageId": message_id,
        "queued": queued,
    }))
}

pub fn add_conversation_note(env: &ToolEnv<'_>, p: AddConversationNoteParams) -> ToolResult<Value> {
    let id = resolve::resolve_conversation(env.conn, env.account(), &p.conversation_id)?;
    let note = insert_note(env, None, None, Some(&id), &p.content)?;
    Ok(json!({ "success": true, "note": note, "conversationId": id }))
}

pub fn generate_draft(env: &ToolEnv<'_>, p: GenerateDraftParams) -> ToolResult<AnalysisRequest> {
    let id = resolve::resolve_conversation(env.conn, env.account(), &p.conversation_id)?;
    let conversation = fetch_conversation(env.conn, env.account(), &id)?;
    let messages = recent_messages(env.conn, &id, 10)?;

    let customer = conversation["contact"]["first_name"].as_str().unwrap_or("the customer");
    let transcript: Vec<String> = messages
        .iter()
        .map(|m| {
            let who = if m["direction"] == "inbound" { "Customer" } else { "Us" };
            format!("{who}: {}", m["body_text"].as_str().unwrap_or_default())
        })
        .collect();

    let mut extra = Map::new();
    extra.insert("conversationId".into(), json!(id));

    Ok(AnalysisRequest {
        kind: "draft",
        entity_type: Some("conversation"),
        entity_id: Some(id),
        system_prompt: "You are a helpful customer service assistant for a field service business. \
            Write a professional, friendly reply to the customer's latest message. \
            Keep it concise and do not invent prices or appointment times."
            .to_string(),
        prompt: format!(
            "Conversation with {customer} (subject: {}):\n{}\n\nWrite the reply.",
            conversation["subject"].as_str().unwrap_or("none"),
            transcript.join("\n")
        ),
        result_key: "draft",
        id_key: "draftId",
        json_output: false,
        extra,
        derive: None,
    })
}
