use rusqlite::types::Value as SqlValue;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use serde_json::{json, Value};

use super::{fetch_one, new_id, page_limit, page_offset, query_rows, require_text, write_audit, Filter, DEFAULT_LIMIT};
use crate::error::{ToolError, ToolResult};
use crate::resolve;
use crate::tools::contacts::*;
use crate::tools::ToolEnv;

const CONTACT_SELECT: &str = "SELECT c.id, c.account_id, c.email, c.first_name, c.last_name, c.phone,
        c.address, c.created_at, c.updated_at
    FROM contacts c";

pub fn fetch_contact(conn: &Connection, account_id: &str, contact_id: &str) -> ToolResult<Value> {
    fetch_one(
        conn,
        &format!("{CONTACT_SELECT} WHERE c.id = ?1 AND c.account_id = ?2"),
        params![contact_id, account_id],
        "Contact",
    )
}

fn search_clause(filter: &mut Filter, term: &str) {
    let pattern = resolve::like_pattern(term);
    filter.clause(
        "(lower(c.first_name) LIKE ? ESCAPE '\\' OR lower(coalesce(c.last_name, '')) LIKE ? ESCAPE '\\'
          OR lower(c.first_name || ' ' || coalesce(c.last_name, '')) LIKE ? ESCAPE '\\'
          OR lower(coalesce(c.email, '')) LIKE ? ESCAPE '\\' OR lower(coalesce(c.phone, '')) LIKE ? ESCAPE '\\')",
        vec![SqlValue::from(pattern); 5],
    );
}

fn query_contacts(conn: &Connection, filter: &Filter, limit: i64, offset: i64) -> ToolResult<Vec<Value>> {
    query_rows(
        conn,
        &format!(
            "{CONTACT_SELECT}{} ORDER BY c.created_at DESC, c.id DESC LIMIT ? OFFSET ?",
            filter.where_sql()
        ),
        params_from_iter(filter.values_with(&[limit, offset])),
    )
}

fn contacts_payload(contacts: Vec<Value>) -> Value {
    json!({ "contactCount": contacts.len(), "contacts": contacts })
}

pub fn search_contacts(env: &ToolEnv<'_>, p: SearchContactsParams) -> ToolResult<Value> {
    let term = require_text(&p.search, "search")?;
    let mut filter = Filter::account("c.account_id", env.account());
    search_clause(&mut filter, term);
    Ok(contacts_payload(query_contacts(env.conn, &filter, DEFAULT_LIMIT, 0)?))
}

pub fn list_contacts(env: &ToolEnv<'_>, p: ListContactsParams) -> ToolResult<Value> {
    let mut filter = Filter::account("c.account_id", env.account());
    if let Some(term) = p.search.as_deref().filter(|s| !s.trim().is_empty()) {
        search_clause(&mut filter, term);
    }
    let contacts = query_contacts(
        env.conn,
        &filter,
        page_limit(p.limit, DEFAULT_LIMIT),
        page_offset(p.offset),
    )?;
    Ok(contacts_payload(contacts))
}

fn email_taken(env: &ToolEnv<'_>, email: &str, except: Option<&str>) -> ToolResult<bool> {
    let hit: Option<String> = env
        .conn
        .query_row(
            "SELECT id FROM contacts WHERE account_id = ?1 AND lower(email) = lower(?2)
               AND id != coalesce(?3, '')",
            params![env.account(), email, except],
            |row| row.get(0),
        )
        .optional()?;
    Ok(hit.is_some())
}

fn check_email(email: &str) -> ToolResult<&str> {
    let email = require_text(email, "email")?;
    if !email.contains('@') {
        return Err(ToolError::validation(format!("\"{email}\" is not a valid email address")));
    }
    Ok(email)
}

pub fn create_contact(env: &ToolEnv<'_>, p: CreateContactParams) -> ToolResult<Value> {
    let email = check_email(&p.email)?;
    let first_name = require_text(&p.first_name, "firstName")?;
    if email_taken(env, email, None)? {
        return Err(ToolError::validation("Contact with this email already exists"));
    }

    let id = new_id();
    let now = env.timestamp();
    env.conn.execute(
        "INSERT INTO contacts (id, account_id, email, first_name, last_name, phone, address, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)",
        params![id, env.account(), email, first_name, p.last_name, p.phone, p.address, now],
    )?;
    write_audit(env, "create", "contact", Some(&id), Some(&json!({"email": email})))?;
    tracing::info!(contact = %id, "contact created");

    let contact = fetch_contact(env.conn, env.account(), &id)?;
    Ok(json!({ "success": true, "contact": contact, "contactId": id }))
}

pub fn update_contact(env: &ToolEnv<'_>, p: UpdateContactParams) -> ToolResult<Value> {
    let contact_id = resolve::resolve_contact(env.conn, env.account(), &p.contact_id)?;

    let mut sets: Vec<&str> = Vec::new();
    let mut values: Vec<SqlValue> = Vec::new();
    let mut changed = serde_json::Map::new();

    if let Some(email) = p.email.as_deref() {
        let email = check_email(email)?;
        if email_taken(env, email, Some(&contact_id))? {
            return Err(ToolError::validation("Contact with this email already exists"));
        }
        sets.push("email = ?");
        values.push(email.to_string().into());
        changed.insert("email".into(), json!(email));
    }
    if let Some(first) = p.first_name.as_deref() {
        let first = require_text(first, "firstName")?;
        sets.push("first_name = ?");
        values.push(first.to_string().into());
        changed.insert("firstName".into(), json!(first));
    }
    for (column, key, value) in [
        ("last_name = ?", "lastName", p.last_name),
        ("phone = ?", "phone", p.phone),
        ("address = ?", "address", p.address),
    ] {
        if let Some(v) = value {
            sets.push(column);
            changed.insert(key.into(), json!(v));
            values.push(v.into());
        }
    }
    if sets.is_empty() {
        return Err(ToolError::validation("No fields to update"));
    }

    sets.push("updated_at = ?");
    values.push(env.timestamp().into());
    values.push(contact_id.clone().into());
    values.push(env.account().to_string().into());
    env.conn.execute(
        &format!("UPDATE contacts SET {} WHERE id = ? AND account_id = ?", sets.join(", ")),
        params_from_iter(values),
    )?;
    write_audit(env, "update", "contact", Some(&contact_id), Some(&Value::Object(changed)))?;

    let contact = fetch_contact(env.conn, env.account(), &contact_id)?;
    Ok(json!({ "success": true, "contact": contact, "contactId": contact_id }))
}

pub fn get_contact(env: &ToolEnv<'_>, p: ContactIdParams) -> ToolResult<Value> {
    let contact_id = resolve::resolve_contact(env.conn, env.account(), &p.contact_id)?;
    let contact = fetch_contact(env.conn, env.account(), &contact_id)?;
    let recent_jobs = query_rows(
        env.conn,
        "SELECT id, description, status, scheduled_start FROM jobs
         WHERE account_id = ?1 AND contact_id = ?2
         ORDER BY created_at DESC, id DESC LIMIT 10",
        params![env.account(), contact_id],
    )?;
    Ok(json!({ "contact": contact, "contactId": contact_id, "recentJobs": recent_jobs }))
}

pub fn delete_contact(env: &ToolEnv<'_>, p: ContactIdParams) -> ToolResult<Value> {
    let contact_id = resolve::resolve_contact(env.conn, env.account(), &p.contact_id)?;
    env.conn.execute(
        "DELETE FROM contacts WHERE id = ?1 AND account_id = ?2",
        params![contact_id, env.account()],
    )?;
    write_audit(env, "delete", "contact", Some(&contact_id), None)?;
    Ok(json!({ "success": true, "message": "Contact deleted successfully" }))
}

/// Insert a note attached to any mix of job, contact, and conversation.
pub(crate) fn insert_note(
    env: &ToolEnv<'_>,
    job_id: Option<&str>,
    contact_id: Option<&str>,
    conversation_id: Option<&str>,
    content: &str,
) -> ToolResult<Value> {
    let content = require_text(content, "content")?;
    let id = new_id();
    env.conn.execute(
        "INSERT INTO notes (id, account_id, job_id, contact_id, conversation_id, content, created_by, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![id, env.account(), job_id, contact_id, conversation_id, content, env.user_id(), env.timestamp()],
    )?;
    write_audit(env, "create", "note", Some(&id), None)?;
    fetch_one(env.conn, "SELECT * FROM notes WHERE id = ?1", params![id], "Note")
}

pub fn add_contact_note(env: &ToolEnv<'_>, p: AddContactNoteParams) -> ToolResult<Value> {
    let contact_id = resolve::resolve_contact(env.conn, env.account(), &p.contact_id)?;
    let note = insert_note(env, None, Some(&contact_id), None, &p.content)?;
    Ok(json!({ "success": true, "note": note, "contactId": contact_id }))
}
