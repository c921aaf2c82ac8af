use rusqlite::{params, params_from_iter, Connection};
use serde_json::{json, Value};

use super::{fetch_one, new_id, page_limit, page_offset, query_rows, require_text, write_audit, Filter, DEFAULT_LIMIT};
use crate::error::{ToolError, ToolResult};
use crate::resolve::{self, parse_relative_date};
use crate::tools::people::*;
use crate::tools::{NoParams, ToolEnv};

const USER_SELECT: &str = "SELECT u.id, u.account_id, u.email, u.first_name, u.last_name, u.role, u.phone, u.created_at
    FROM users u";

fn fetch_user(conn: &Connection, account_id: &str, id: &str) -> ToolResult<Value> {
    fetch_one(
        conn,
        &format!("{USER_SELECT} WHERE u.id = ?1 AND u.account_id = ?2"),
        params![id, account_id],
        "User",
    )
}

fn current_user(env: &ToolEnv<'_>) -> ToolResult<Value> {
    let user_id = env
        .user_id()
        .ok_or_else(|| ToolError::validation("No current user in context"))?;
    fetch_user(env.conn, env.account(), user_id)
}

pub fn list_users(env: &ToolEnv<'_>, p: ListUsersParams) -> ToolResult<Value> {
    let mut filter = Filter::account("u.account_id", env.account());
    filter.eq_opt("u.role", p.role.map(|r| r.as_str().to_string()));
    let users = query_rows(
        env.conn,
        &format!(
            "{USER_SELECT}{} ORDER BY u.first_name ASC, u.id ASC LIMIT ? OFFSET ?",
            filter.where_sql()
        ),
        params_from_iter(filter.values_with(&[page_limit(p.limit, DEFAULT_LIMIT), page_offset(p.offset)])),
    )?;
    Ok(json!({ "userCount": users.len(), "users": users }))
}

pub fn get_user(env: &ToolEnv<'_>, p: GetUserParams) -> ToolResult<Value> {
    Ok(json!({ "user": fetch_user(env.conn, env.account(), &p.user_id)? }))
}

pub fn get_user_email(env: &ToolEnv<'_>, _: NoParams) -> ToolResult<Value> {
    let user = current_user(env)?;
    Ok(json!({ "email": user["email"] }))
}

pub fn get_current_user(env: &ToolEnv<'_>, _: NoParams) -> ToolResult<Value> {
    Ok(json!({ "user": current_user(env)? }))
}

pub fn list_notifications(env: &ToolEnv<'_>, p: ListNotificationsParams) -> ToolResult<Value> {
    let mut filter = Filter::account("account_id", env.account());
    if let Some(user_id) = env.user_id() {
        filter.clause("(user_id = ? OR user_id IS NULL)", vec![user_id.to_string().into()]);
    }
    if p.unread_only.unwrap_or(false) {
        filter.clause("is_read = 0", Vec::new());
    }
    let notifications = query_rows(
        env.conn,
        &format!(
            "SELECT * FROM notifications{} ORDER BY created_at DESC, id DESC LIMIT ?",
            filter.where_sql()
        ),
        params_from_iter(filter.values_with(&[page_limit(p.limit, DEFAULT_LIMIT)])),
    )?;
    let unread = notifications.iter().filter(|n| n["is_read"] == false).count();
    Ok(json!({
        "notificationCount": notifications.len(),
        "unreadCount": unread,
        "notifications": notifications,
    }))
}

pub fn create_notification(env: &ToolEnv<'_>, p: CreateNotificationParams) -> ToolResult<Value> {
    fetch_user(env.conn, env.account(), &p.user_id)?;
    let title = require_text(&p.title, "title")?;
    let id = new_id();
    env.conn.execute(
        "INSERT INTO notifications (id, account_id, user_id, type, title, message, link, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![id, env.account(), p.user_id, p.kind, title, p.message, p.link, env.timestamp()],
    )?;
    let notification = fetch_one(env.conn, "SELECT * FROM notifications WHERE id = ?1", params![id], "Notification")?;
    Ok(json!({ "success": true, "notification": notification, "notificationId": id }))
}

pub fn mark_notification_read(env: &ToolEnv<'_>, p: MarkNotificationReadParams) -> ToolResult<Value> {
    let changed = env.conn.execute(
        "UPDATE notifications SET is_read = 1 WHERE id = ?1 AND account_id = ?2",
        params![p.notification_id, env.account()],
    )?;
    if changed == 0 {
        return Err(ToolError::not_found("Notification not found"));
    }
    Ok(json!({ "success": true, "notificationId": p.notification_id }))
}

pub fn list_call_logs(env: &ToolEnv<'_>, p: ListCallLogsParams) -> ToolResult<Value> {
    let mut filter = Filter::account("l.account_id", env.account());
    if let Some(reference) = p.contact_id.as_deref() {
        filter.eq("l.contact_id", resolve::resolve_contact(env.conn, env.account(), reference)?);
    }
    let calls = query_rows(
        env.conn,
        &format!(
            "SELECT l.*, c.first_name || ' ' || coalesce(c.last_name, '') AS contact_name
             FROM call_logs l LEFT JOIN contacts c ON c.id = l.contact_id{}
             ORDER BY l.created_at DESC, l.id DESC LIMIT ?",
            filter.where_sql()
        ),
        params_from_iter(filter.values_with(&[page_limit(p.limit, DEFAULT_LIMIT)])),
    )?;
    Ok(json!({ "callCount": calls.len(), "callLogs": calls }))
}

pub fn create_call_log(env: &ToolEnv<'_>, p: CreateCallLogParams) -> ToolResult<Value> {
    let contact_id = resolve::resolve_contact(env.conn, env.account(), &p.contact_id)?;
    if p.duration.is_some_and(|d| d < 0) {
        return Err(ToolError::validation("duration must not be negative"));
    }
    let id = new_id();
    env.conn.execute(
        "INSERT INTO call_logs (id, account_id, contact_id, user_id, direction, duration_seconds, notes, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![id, env.account(), contact_id, env.user_id(), p.direction.as_str(), p.duration, p.notes, env.timestamp()],
    )?;
    write_audit(env, "create", "call_log", Some(&id), None)?;
    let call = fetch_one(env.conn, "SELECT * FROM call_logs WHERE id = ?1", params![id], "Call log")?;
    Ok(json!({ "success": true, "callLog": call, "callLogId": id, "contactId": contact_id }))
}

/// Queue a navigation command for the web app and return the route to open.
pub fn navigate(env: &ToolEnv<'_>, p: NavigateParams) -> ToolResult<Value> {
    let route = match (p.page, p.job_id.as_deref(), p.contact_id.as_deref()) {
        (Page::Jobs, Some(job_id), _) => format!("/jobs/{job_id}"),
        (Page::Contacts, _, Some(contact_id)) => format!("/contacts/{contact_id}"),
        (page, _, _) => page.route().to_string(),
    };
    let params_json = json!({ "route": route, "jobId": p.job_id, "contactId": p.contact_id });

    let id = new_id();
    env.conn.execute(
        "INSERT INTO navigation_commands (id, account_id, page, params, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![id, env.account(), p.page.as_str(), params_json.to_string(), env.timestamp()],
    )?;

    Ok(json!({
        "success": true,
        "message": format!("Navigating to {}", p.page.as_str()),
        "navigation": { "page": p.page.as_str(), "route": route, "commandId": id },
    }))
}

fn account_settings(env: &ToolEnv<'_>) -> ToolResult<Value> {
    let account = fetch_one(
        env.conn,
        "SELECT settings FROM accounts WHERE id = ?1",
        params![env.account()],
        "Account",
    )?;
    Ok(match &account["settings"] {
        Value::Object(_) => account["settings"].clone(),
        _ => json!({}),
    })
}

pub fn get_account_settings(env: &ToolEnv<'_>, _: NoParams) -> ToolResult<Value> {
    Ok(json!({ "settings": account_settings(env)? }))
}

/// Shallow merge: top-level keys replace, a `null` value removes the key.
pub fn update_account_settings(env: &ToolEnv<'_>, p: UpdateAccountSettingsParams) -> ToolResult<Value> {
    let mut settings = account_settings(env)?;
    if let Some(current) = settings.as_object_mut() {
        for (key, value) in &p.settings {
            if value.is_null() {
                current.remove(key);
            } else {
                current.insert(key.clone(), value.clone());
            }
        }
    }
    env.conn.execute(
        "UPDATE accounts SET settings = ?1 WHERE id = ?2",
        params![settings.to_string(), env.account()],
    )?;
    let keys: Vec<&String> = p.settings.keys().collect();
    write_audit(env, "update", "account_settings", Some(env.account()), Some(&json!({"keys": keys})))?;
    Ok(json!({ "success": true, "settings": settings }))
}

/// Day-granular `[from, to]` range; either end may be open.
pub(crate) fn date_range(
    env: &ToolEnv<'_>,
    filter: &mut Filter,
    column: &str,
    from: Option<&str>,
    to: Option<&str>,
) -> ToolResult<()> {
    let parse = |raw: &str| {
        parse_relative_date(raw, env.today())
            .map(resolve::day_bounds)
            .ok_or_else(|| ToolError::validation(format!("unrecognized date \"{raw}\"")))
    };
    if let Some(from) = from {
        filter.at_least(column, parse(from)?.0);
    }
    if let Some(to) = to {
        filter.at_most(column, parse(to)?.1);
    }
    Ok(())
}

pub fn get_audit_logs(env: &ToolEnv<'_>, p: AuditLogParams) -> ToolResult<Value> {
    let mut filter = Filter::account("account_id", env.account());
    filter.eq_opt("action", p.action).eq_opt("user_id", p.user_id);
    date_range(env, &mut filter, "created_at", p.date_from.as_deref(), p.date_to.as_deref())?;
    let logs = query_rows(
        env.conn,
        &format!(
            "SELECT id, user_id, action, entity_type, entity_id, details, created_at
             FROM audit_logs{} ORDER BY id DESC LIMIT ?",
            filter.where_sql()
        ),
        params_from_iter(filter.values_with(&[page_limit(p.limit, DEFAULT_LIMIT)])),
    )?;
    Ok(json!({ "logCount": logs.len(), "logs": logs }))
}
