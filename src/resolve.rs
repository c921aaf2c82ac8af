//! Reference resolution: context placeholders, name lookups, and relative dates.
//!
//! Voice callers rarely pass IDs. They say "that job", "John", or "tomorrow", and the
//! functions here turn those into concrete values before a handler touches the store.

use chrono::{DateTime, Months, NaiveDate, NaiveTime, TimeDelta, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;

use crate::error::{ToolError, ToolResult};
use crate::tools::CallerContext;

/// Argument keys that accept the `"last"` / `"current"` placeholders.
const PLACEHOLDER_KEYS: [&str; 3] = ["jobId", "contactId", "conversationId"];

/// Candidates considered by a name lookup.
const NAME_CANDIDATE_LIMIT: i64 = 5;

/// True for the sentinel values that point back at the conversation context.
pub fn is_placeholder(value: &str) -> bool {
    value.eq_ignore_ascii_case("last") || value.eq_ignore_ascii_case("current")
}

/// Replace placeholder values in the top-level ID arguments with the IDs carried in
/// the caller context. A placeholder with nothing to point at is a validation error.
pub fn resolve_placeholders(args: &mut Value, context: &CallerContext) -> ToolResult<()> {
    let Some(map) = args.as_object_mut() else {
        return Ok(());
    };

    for key in PLACEHOLDER_KEYS {
        let Some(Value::String(raw)) = map.get(key) else {
            continue;
        };
        if !is_placeholder(raw) {
            continue;
        }

        let carried = match key {
            "jobId" => context.last_job_id.as_deref(),
            "contactId" => context.last_contact_id.as_deref(),
            _ => context.last_conversation_id.as_deref(),
        };
        let Some(id) = carried else {
            return Err(ToolError::validation(format!(
                "{key} \"{raw}\" has no previous reference in this conversation"
            )));
        };
        tracing::debug!(key, id, "resolved context placeholder");
        map.insert(key.to_string(), Value::String(id.to_string()));
    }

    Ok(())
}

#[derive(Debug)]
struct NameCandidate {
    id: String,
    first_name: String,
    last_name: Option<String>,
}

/// Pick the best candidate for `term`, falling back to the first row.
///
/// A candidate matches when its full name contains the term, or when the term
/// contains the candidate's non-empty first or last name.
fn pick_candidate(term: &str, candidates: &[NameCandidate]) -> Option<String> {
    let needle = term.to_lowercase();
    let matched = candidates.iter().find(|c| {
        let first = c.first_name.to_lowercase();
        let last = c.last_name.as_deref().unwrap_or_default().to_lowercase();
        let full = format!("{first} {last}");
        full.contains(&needle)
            || (!first.is_empty() && needle.contains(&first))
            || (!last.is_empty() && needle.contains(&last))
    });
    matched.or(candidates.first()).map(|c| c.id.clone())
}

/// Lowercased `%term%` for a `LIKE ... ESCAPE '\'` clause, with the wildcards
/// and the escape character in `term` matched literally.
pub fn like_pattern(term: &str) -> String {
    let mut pattern = String::with_capacity(term.len() + 2);
    pattern.push('%');
    for ch in term.trim().to_lowercase().chars() {
        if matches!(ch, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(ch);
    }
    pattern.push('%');
    pattern
}

fn query_candidates(
    conn: &Connection,
    sql: &str,
    account_id: &str,
    term: &str,
) -> ToolResult<Vec<NameCandidate>> {
    let pattern = like_pattern(term);
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(params![account_id, pattern, NAME_CANDIDATE_LIMIT], |row| {
            Ok(NameCandidate {
                id: row.get("id")?,
                first_name: row.get("first_name")?,
                last_name: row.get("last_name")?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Find a contact by (partial) name. Ties go to the contact created first.
pub fn find_contact_by_name(
    conn: &Connection,
    account_id: &str,
    name: &str,
) -> ToolResult<Option<String>> {
    let term = name.trim();
    if term.is_empty() {
        return Ok(None);
    }
    let candidates = query_candidates(
        conn,
        "SELECT id, first_name, last_name FROM contacts
         WHERE account_id = ?1
           AND (lower(first_name) LIKE ?2 ESCAPE '\\'
                OR lower(coalesce(last_name, '')) LIKE ?2 ESCAPE '\\'
                OR lower(first_name || ' ' || coalesce(last_name, '')) LIKE ?2 ESCAPE '\\')
         ORDER BY created_at ASC, id ASC
         LIMIT ?3",
        account_id,
        term,
    )?;
    Ok(pick_candidate(term, &candidates))
}

/// Find a technician (a user with role `tech`) by (partial) name.
pub fn find_tech_by_name(
    conn: &Connection,
    account_id: &str,
    name: &str,
) -> ToolResult<Option<String>> {
    let term = name.trim();
    if term.is_empty() {
        return Ok(None);
    }
    let candidates = query_candidates(
        conn,
        "SELECT id, first_name, last_name FROM users
         WHERE account_id = ?1 AND role = 'tech'
           AND (lower(first_name) LIKE ?2 ESCAPE '\\'
                OR lower(coalesce(last_name, '')) LIKE ?2 ESCAPE '\\'
                OR lower(first_name || ' ' || coalesce(last_name, '')) LIKE ?2 ESCAPE '\\')
         ORDER BY created_at ASC, id ASC
         LIMIT ?3",
        account_id,
        term,
    )?;
    Ok(pick_candidate(term, &candidates))
}

fn exists(conn: &Connection, table: &str, account_id: &str, id: &str) -> ToolResult<bool> {
    let found = conn
        .query_row(
            &format!("SELECT 1 FROM {table} WHERE id = ?1 AND account_id = ?2"),
            params![id, account_id],
            |_| Ok(()),
        )
        .optional()?;
    Ok(found.is_some())
}

/// Resolve a contact reference that may be an ID or a name.
pub fn resolve_contact(conn: &Connection, account_id: &str, reference: &str) -> ToolResult<String> {
    if exists(conn, "contacts", account_id, reference)? {
        return Ok(reference.to_string());
    }
    find_contact_by_name(conn, account_id, reference)?
        .ok_or_else(|| ToolError::not_found(format!("Contact \"{reference}\" not found")))
}

/// Resolve a technician reference that may be a user ID or a name.
pub fn resolve_tech(conn: &Connection, account_id: &str, reference: &str) -> ToolResult<String> {
    let is_tech = conn
        .query_row(
            "SELECT 1 FROM users WHERE id = ?1 AND account_id = ?2 AND role = 'tech'",
            params![reference, account_id],
            |_| Ok(()),
        )
        .optional()?
        .is_some();
    if is_tech {
        return Ok(reference.to_string());
    }
    find_tech_by_name(conn, account_id, reference)?
        .ok_or_else(|| ToolError::not_found(format!("Technician \"{reference}\" not found")))
}

/// Resolve a conversation reference: an ID, or the newest conversation of a contact
/// found by name.
pub fn resolve_conversation(
    conn: &Connection,
    account_id: &str,
    reference: &str,
) -> ToolResult<String> {
    if exists(conn, "conversations", account_id, reference)? {
        return Ok(reference.to_string());
    }
    let not_found = || ToolError::not_found(format!("Conversation \"{reference}\" not found"));
    let Some(contact_id) = find_contact_by_name(conn, account_id, reference)? else {
        return Err(not_found());
    };
    conn.query_row(
        "SELECT id FROM conversations WHERE account_id = ?1 AND contact_id = ?2
         ORDER BY last_message_at DESC, id DESC LIMIT 1",
        params![account_id, contact_id],
        |row| row.get::<_, String>(0),
    )
    .optional()?
    .ok_or_else(not_found)
}

/// Require that `id` names a row of `table` in the account.
pub fn require_entity(
    conn: &Connection,
    table: &str,
    label: &str,
    account_id: &str,
    id: &str,
) -> ToolResult<()> {
    if exists(conn, table, account_id, id)? {
        Ok(())
    } else {
        Err(ToolError::not_found(format!("{label} not found")))
    }
}

/// Parse a spoken or written date relative to `today` (UTC).
///
/// Accepts `today`, `tomorrow`, `yesterday`, anything containing `next week` or
/// `next month`, an ISO date, or an RFC 3339 timestamp.
pub fn parse_relative_date(input: &str, today: NaiveDate) -> Option<NaiveDate> {
    let lower = input.trim().to_lowercase();
    match lower.as_str() {
        "today" => return Some(today),
        "tomorrow" => return today.succ_opt(),
        "yesterday" => return today.pred_opt(),
        _ => {}
    }
    if lower.contains("next week") {
        return today.checked_add_signed(TimeDelta::days(7));
    }
    if lower.contains("next month") {
        return today.checked_add_months(Months::new(1));
    }
    if let Ok(date) = NaiveDate::parse_from_str(input.trim(), "%Y-%m-%d") {
        return Some(date);
    }
    DateTime::parse_from_rfc3339(input.trim())
        .ok()
        .map(|dt| dt.with_timezone(&Utc).date_naive())
}

/// `[start, end]` timestamps covering one UTC day, in canonical form.
pub fn day_bounds(date: NaiveDate) -> (String, String) {
    let start = date.and_time(NaiveTime::MIN).and_utc();
    let end = start + TimeDelta::days(1) - TimeDelta::seconds(1);
    (format_timestamp(start), format_timestamp(end))
}

/// Canonical storage form: RFC 3339 UTC with second precision.
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

/// Normalize a caller-supplied date or datetime into canonical storage form.
///
/// Relative words resolve to midnight of that day.
pub fn normalize_timestamp(input: &str, today: NaiveDate) -> ToolResult<String> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(input.trim()) {
        return Ok(format_timestamp(dt.with_timezone(&Utc)));
    }
    if let Ok(naive) = chrono::NaiveDateTime::parse_from_str(input.trim(), "%Y-%m-%dT%H:%M:%S") {
        return Ok(format_timestamp(naive.and_utc()));
    }
    if let Ok(naive) = chrono::NaiveDateTime::parse_from_str(input.trim(), "%Y-%m-%dT%H:%M") {
        return Ok(format_timestamp(naive.and_utc()));
    }
    parse_relative_date(input, today)
        .map(|date| format_timestamp(date.and_time(NaiveTime::MIN).and_utc()))
        .ok_or_else(|| ToolError::validation(format!("unrecognized date \"{input}\"")))
}

/// Resolve an optional date filter to day bounds; an unparseable value is an error.
pub fn date_filter(input: Option<&str>, today: NaiveDate) -> ToolResult<Option<(String, String)>> {
    match input {
        None => Ok(None),
        Some(raw) => parse_relative_date(raw, today)
            .map(|d| Some(day_bounds(d)))
            .ok_or_else(|| ToolError::validation(format!("unrecognized date \"{raw}\""))),
    }
}
