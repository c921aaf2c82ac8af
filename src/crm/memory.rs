//! Agent memory: one resumable conversation state per user identifier.
//!
//! A save merges into the stored row. History is appended and trimmed to the
//! configured cap, preferences are shallow-merged, staging data and context are
//! replaced. A read only finds state touched within the configured window.

use chrono::{DateTime, TimeDelta, Utc};
use rusqlite::{params, Connection};
use serde_json::{json, Map, Value};

use super::{new_id, query_one};
use crate::error::{ToolError, ToolResult};
use crate::tools::memory::*;
use crate::tools::ToolEnv;

const DEFAULT_INTENT: &str = "in_progress";

fn require_identifier(raw: &str) -> ToolResult<&str> {
    let id = raw.trim();
    if id.is_empty() {
        Err(ToolError::validation("User identifier is required"))
    } else {
        Ok(id)
    }
}

/// JSON text or an inline value; `field` names the argument in error messages.
fn parse_json_arg(value: Option<Value>, field: &str) -> ToolResult<Option<Value>> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(text)) if text.trim().is_empty() => Ok(None),
        Some(Value::String(text)) => serde_json::from_str(&text)
            .map(Some)
            .map_err(|_| ToolError::validation(format!("Invalid JSON in {field} parameter"))),
        Some(other) => Ok(Some(other)),
    }
}

fn stored_row(conn: &Connection, user: &str) -> ToolResult<Option<Value>> {
    query_one(
        conn,
        "SELECT id, user_identifier, conversation_summary, intent, staging_data, session_id,
                conversation_history, user_preferences, current_context, last_active_at
         FROM agent_memory WHERE user_identifier = ?1",
        params![user],
    )
}

/// Stored state for `user` if it was touched less than `window_hours` before `now`.
pub fn load_memory(
    conn: &Connection,
    user: &str,
    now: DateTime<Utc>,
    window_hours: i64,
) -> ToolResult<Value> {
    let user = require_identifier(user)?;
    let not_found = || {
        json!({
            "found": false,
            "message": format!("No previous conversation found within {window_hours} hours"),
        })
    };

    let Some(row) = stored_row(conn, user)? else {
        return Ok(not_found());
    };
    let last_active = row["last_active_at"]
        .as_str()
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|t| t.with_timezone(&Utc));
    match last_active {
        Some(t) if now - t <= TimeDelta::hours(window_hours) => {}
        _ => return Ok(not_found()),
    }

    Ok(json!({
        "found": true,
        "intent": row["intent"],
        "summary": row["conversation_summary"],
        "stagingData": row["staging_data"],
        "lastActive": row["last_active_at"],
        "sessionId": row["session_id"],
        "conversationHistory": row["conversation_history"],
        "userPreferences": row["user_preferences"],
        "currentContext": row["current_context"],
    }))
}

pub fn read_agent_memory(env: &ToolEnv<'_>, p: ReadAgentMemoryParams) -> ToolResult<Value> {
    let memory = load_memory(env.conn, &p.user_identifier, env.now, env.settings.memory_window_hours)?;
    tracing::debug!(user = %p.user_identifier, found = %memory["found"], "agent memory read");
    Ok(memory)
}

/// Append `new` turns (an array, or a single turn) and keep the newest `limit`.
fn merge_history(existing: &Value, new: Option<Value>, limit: usize) -> Vec<Value> {
    let mut history: Vec<Value> = existing.as_array().cloned().unwrap_or_default();
    match new {
        Some(Value::Array(turns)) => history.extend(turns),
        Some(turn) => history.push(turn),
        None => {}
    }
    if history.len() > limit {
        history.drain(..history.len() - limit);
    }
    history
}

fn merge_preferences(existing: &Value, new: Option<Value>) -> ToolResult<Map<String, Value>> {
    let mut prefs = existing.as_object().cloned().unwrap_or_default();
    match new {
        Some(Value::Object(update)) => prefs.extend(update),
        Some(_) => return Err(ToolError::validation("userPreferences must be a JSON object")),
        None => {}
    }
    Ok(prefs)
}

pub fn update_agent_memory(env: &ToolEnv<'_>, p: UpdateAgentMemoryParams) -> ToolResult<Value> {
    let user = require_identifier(&p.user_identifier)?.to_string();
    let staging = parse_json_arg(p.staging_data, "stagingData")?;
    let history_in = parse_json_arg(p.conversation_history, "conversationHistory")?;
    let prefs_in = parse_json_arg(p.user_preferences, "userPreferences")?;
    let context_in = parse_json_arg(p.current_context, "currentContext")?;

    let existing = stored_row(env.conn, &user)?.unwrap_or_else(|| json!({}));
    let history = merge_history(&existing["conversation_history"], history_in, env.settings.history_limit);
    let prefs = merge_preferences(&existing["user_preferences"], prefs_in)?;
    let staging = staging
        .or_else(|| existing.get("staging_data").cloned())
        .unwrap_or_else(|| json!({}));

    let mut context = match context_in {
        Some(Value::Object(map)) => map,
        Some(_) => return Err(ToolError::validation("currentContext must be a JSON object")),
        None => Map::new(),
    };
    let session_id = context
        .get("sessionId")
        .and_then(Value::as_str)
        .map(str::to_string)
        .or_else(|| existing["session_id"].as_str().map(str::to_string))
        .unwrap_or_else(new_id);
    let now = env.timestamp();
    context.insert("sessionId".into(), json!(session_id));
    context.insert("lastUpdated".into(), json!(now));
    context.entry("currentPage").or_insert_with(|| json!("unknown"));
    context.insert("lastAction".into(), json!(p.summary));
    context.insert("timestamp".into(), json!(now));

    let intent = p
        .intent
        .filter(|i| !i.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_INTENT.to_string());
    let memory_id = existing["id"].as_str().map(str::to_string).unwrap_or_else(new_id);

    env.conn.execute(
        "INSERT INTO agent_memory (id, user_identifier, conversation_summary, intent, staging_data,
                                   session_id, conversation_history, user_preferences, current_context,
                                   last_active_at, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?10)
         ON CONFLICT(user_identifier) DO UPDATE SET
             conversation_summary = excluded.conversation_summary,
             intent = excluded.intent,
             staging_data = excluded.staging_data,
             session_id = excluded.session_id,
             conversation_history = excluded.conversation_history,
             user_preferences = excluded.user_preferences,
             current_context = excluded.current_context,
             last_active_at = excluded.last_active_at",
        params![
            memory_id,
            user,
            p.summary,
            intent,
            staging.to_string(),
            session_id,
            Value::Array(history.clone()).to_string(),
            Value::Object(prefs.clone()).to_string(),
            Value::Object(context.clone()).to_string(),
            now,
        ],
    )?;
    tracing::info!(user = %user, history = history.len(), "agent memory saved");

    let context_keys: Vec<&String> = context.keys().collect();
    Ok(json!({
        "success": true,
        "message": "Rich conversation state saved successfully",
        "memoryId": memory_id,
        "sessionId": session_id,
        "historyCount": history.len(),
        "preferences": prefs.len(),
        "contextKeys": context_keys,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn history_keeps_the_newest_entries() {
        let existing = json!([1, 2, 3]);
        let merged = merge_history(&existing, Some(json!([4, 5])), 4);
        assert_eq!(merged, vec![json!(2), json!(3), json!(4), json!(5)]);
    }

    #[test]
    fn single_turn_is_appended() {
        let merged = merge_history(&Value::Null, Some(json!({"role": "user"})), 50);
        assert_eq!(merged.len(), 1);
    }

    #[test]
    fn preferences_merge_shallowly() {
        let prefs = merge_preferences(&json!({"a": 1, "b": 2}), Some(json!({"b": 3}))).unwrap();
        assert_eq!(Value::Object(prefs), json!({"a": 1, "b": 3}));
    }

    #[test]
    fn invalid_json_text_names_the_field() {
        let err = parse_json_arg(Some(json!("{oops")), "stagingData").unwrap_err();
        assert_eq!(err.to_string(), "Invalid JSON in stagingData parameter");
        assert_eq!(parse_json_arg(Some(json!("{\"a\":1}")), "x").unwrap(), Some(json!({"a": 1})));
    }
}
