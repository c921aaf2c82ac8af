//! CRM data access: the handler bodies behind every store-backed tool.
//!
//! Handlers take a [`ToolEnv`] (the open transaction plus caller context) and typed
//! parameters, and return the JSON payload the caller sees. Rows are returned with
//! their column names, the same shape the CRM web app reads.

pub mod ai;
pub mod analytics;
pub mod automation;
pub mod billing;
pub mod contacts;
pub mod conversations;
pub mod field;
pub mod jobs;
pub mod marketing;
pub mod memory;
pub mod people;

use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::{params, Connection, Params, Row};
use serde_json::{Map, Number, Value};

use crate::error::{ToolError, ToolResult};
use crate::tools::ToolEnv;

/// Columns holding JSON text that should be returned as nested JSON.
const JSON_COLUMNS: &[&str] = &[
    "contact",
    "tech",
    "job",
    "persona_config",
    "settings",
    "details",
    "params",
    "result",
    "staging_data",
    "conversation_history",
    "user_preferences",
    "current_context",
    "trigger_config",
];

/// Integer columns that are really booleans.
const BOOL_COLUMNS: &[&str] = &["is_read", "active", "executed", "needs_review"];

pub const DEFAULT_LIMIT: i64 = 50;
const MAX_LIMIT: i64 = 500;

/// New entity ID (UUID v7, time ordered).
pub fn new_id() -> String {
    uuid::Uuid::now_v7().to_string()
}

fn column_to_json(name: &str, value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) if BOOL_COLUMNS.contains(&name) => Value::Bool(i != 0),
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null),
        ValueRef::Text(bytes) => {
            let text = String::from_utf8_lossy(bytes);
            if JSON_COLUMNS.contains(&name) {
                serde_json::from_str(&text).unwrap_or_else(|_| Value::String(text.into_owned()))
            } else {
                Value::String(text.into_owned())
            }
        }
        ValueRef::Blob(bytes) => Value::from(bytes.len()),
    }
}

/// Convert a row to a JSON object keyed by column name.
pub fn row_to_json(row: &Row<'_>) -> rusqlite::Result<Value> {
    let stmt = row.as_ref();
    let mut obj = Map::with_capacity(stmt.column_count());
    for (i, name) in stmt.column_names().into_iter().enumerate() {
        obj.insert(name.to_string(), column_to_json(name, row.get_ref(i)?));
    }
    Ok(Value::Object(obj))
}

pub fn query_rows<P: Params>(conn: &Connection, sql: &str, params: P) -> ToolResult<Vec<Value>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(params, |row| row_to_json(row))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn query_one<P: Params>(conn: &Connection, sql: &str, params: P) -> ToolResult<Option<Value>> {
    let mut stmt = conn.prepare(sql)?;
    let mut rows = stmt.query(params)?;
    match rows.next()? {
        Some(row) => Ok(Some(row_to_json(row)?)),
        None => Ok(None),
    }
}

/// `query_one`, with a miss reported as "<label> not found".
pub fn fetch_one<P: Params>(conn: &Connection, sql: &str, params: P, label: &str) -> ToolResult<Value> {
    query_one(conn, sql, params)?.ok_or_else(|| ToolError::not_found(format!("{label} not found")))
}

pub fn count<P: Params>(conn: &Connection, sql: &str, params: P) -> ToolResult<i64> {
    Ok(conn.query_row(sql, params, |row| row.get(0))?)
}

/// Accumulates `WHERE` clauses and their positional values.
#[derive(Debug, Default)]
pub struct Filter {
    clauses: Vec<String>,
    values: Vec<SqlValue>,
}

impl Filter {
    /// Start with `<column> = <account>`.
    pub fn account(column: &str, account_id: &str) -> Self {
        let mut filter = Self::default();
        filter.eq(column, account_id.to_string());
        filter
    }

    pub fn eq(&mut self, column: &str, value: impl Into<SqlValue>) -> &mut Self {
        self.clauses.push(format!("{column} = ?"));
        self.values.push(value.into());
        self
    }

    pub fn eq_opt<V: Into<SqlValue>>(&mut self, column: &str, value: Option<V>) -> &mut Self {
        if let Some(v) = value {
            self.eq(column, v);
        }
        self
    }

    pub fn between(&mut self, column: &str, bounds: (String, String)) -> &mut Self {
        self.clauses.push(format!("{column} BETWEEN ? AND ?"));
        self.values.push(bounds.0.into());
        self.values.push(bounds.1.into());
        self
    }

    pub fn at_least(&mut self, column: &str, value: String) -> &mut Self {
        self.clauses.push(format!("{column} >= ?"));
        self.values.push(value.into());
        self
    }

    pub fn at_most(&mut self, column: &str, value: String) -> &mut Self {
        self.clauses.push(format!("{column} <= ?"));
        self.values.push(value.into());
        self
    }

    /// Raw clause with one `?` per value.
    pub fn clause(&mut self, clause: &str, values: Vec<SqlValue>) -> &mut Self {
        self.clauses.push(clause.to_string());
        self.values.extend(values);
        self
    }

    pub fn where_sql(&self) -> String {
        if self.clauses.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", self.clauses.join(" AND "))
        }
    }

    /// Bound values, followed by `extra` (for `LIMIT` / `OFFSET`).
    pub fn values_with(&self, extra: &[i64]) -> Vec<SqlValue> {
        let mut values = self.values.clone();
        values.extend(extra.iter().map(|&v| SqlValue::Integer(v)));
        values
    }

    pub fn values(&self) -> Vec<SqlValue> {
        self.values.clone()
    }
}

/// Clamp a caller-supplied page size.
pub fn page_limit(limit: Option<i64>, default: i64) -> i64 {
    limit.unwrap_or(default).clamp(1, MAX_LIMIT)
}

pub fn page_offset(offset: Option<i64>) -> i64 {
    offset.unwrap_or(0).max(0)
}

/// Dollars (as spoken) to stored cents.
pub fn dollars_to_cents(amount: f64, field: &str) -> ToolResult<i64> {
    if !amount.is_finite() || amount < 0.0 {
        return Err(ToolError::validation(format!("{field} must be a non-negative amount")));
    }
    Ok((amount * 100.0).round() as i64)
}

pub fn cents_to_dollars(cents: i64) -> f64 {
    cents as f64 / 100.0
}

/// Reject empty strings in required text arguments.
pub fn require_text<'a>(value: &'a str, field: &str) -> ToolResult<&'a str> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        Err(ToolError::validation(format!("{field} must not be empty")))
    } else {
        Ok(trimmed)
    }
}

/// Append an audit log entry for a mutation.
pub fn write_audit(
    env: &ToolEnv<'_>,
    action: &str,
    entity_type: &str,
    entity_id: Option<&str>,
    details: Option<&Value>,
) -> ToolResult<()> {
    let details_json = details.map(|d| d.to_string());
    env.conn.execute(
        "INSERT INTO audit_logs (account_id, user_id, action, entity_type, entity_id, details, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            env.account(),
            env.user_id(),
            action,
            entity_type,
            entity_id,
            details_json,
            env.timestamp()
        ],
    )?;
    Ok(())
}

/// Render rows as CSV with the given column order.
pub fn to_csv(rows: &[Value], columns: &[&str]) -> String {
    fn escape(value: &Value) -> String {
        let raw = match value {
            Value::Null => String::new(),
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        if raw.contains(&[',', '"', '\n', '\r'][..]) {
            format!("\"{}\"", raw.replace('"', "\"\""))
        } else {
            raw
        }
    }

    let mut out = columns.join(",");
    out.push('\n');
    for row in rows {
        let line: Vec<String> = columns
            .iter()
            .map(|c| escape(row.get(*c).unwrap_or(&Value::Null)))
            .collect();
        out.push_str(&line.join(","));
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn filter_builds_positional_where() {
        let mut f = Filter::account("j.account_id", "acct");
        f.eq("j.status", "scheduled".to_string())
            .eq_opt::<String>("j.contact_id", None)
            .between("j.scheduled_start", ("a".into(), "b".into()));
        assert_eq!(
            f.where_sql(),
            " WHERE j.account_id = ? AND j.status = ? AND j.scheduled_start BETWEEN ? AND ?"
        );
        assert_eq!(f.values_with(&[10, 0]).len(), 6);
    }

    #[test]
    fn rows_map_bools_and_json_columns() {
        let conn = Connection::open_in_memory().unwrap();
        let row = query_one(
            &conn,
            "SELECT 1 AS is_read, '{\"a\":1}' AS settings, 'x' AS name, 2.5 AS amount",
            [],
        )
        .unwrap()
        .unwrap();
        assert_eq!(row, json!({"is_read": true, "settings": {"a": 1}, "name": "x", "amount": 2.5}));
    }

    #[test]
    fn money_conversion_rounds_to_cents() {
        assert_eq!(dollars_to_cents(199.999, "amount").unwrap(), 20000);
        assert_eq!(dollars_to_cents(0.1 + 0.2, "amount").unwrap(), 30);
        assert!(dollars_to_cents(-1.0, "amount").is_err());
    }

    #[test]
    fn csv_escapes_quotes_and_commas() {
        let rows = vec![json!({"name": "Smith, John", "note": "said \"hi\""})];
        let csv = to_csv(&rows, &["name", "note", "missing"]);
        assert_eq!(csv, "name,note,missing\n\"Smith, John\",\"said \"\"hi\"\"\",\n");
    }

    #[test]
    fn page_limit_is_clamped() {
        assert_eq!(page_limit(None, 50), 50);
        assert_eq!(page_limit(Some(0), 50), 1);
        assert_eq!(page_limit(Some(10_000), 50), 500);
    }
}
