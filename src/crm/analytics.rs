//! Aggregates over the store. Money totals are cents.

use chrono::{Datelike, NaiveDate, NaiveTime, TimeDelta};
use rusqlite::{params, params_from_iter, Connection, Params};
use serde_json::{json, Map, Value};

use super::people::date_range;
use super::{count, query_rows, to_csv, Filter};
use crate::error::ToolResult;
use crate::resolve::{day_bounds, format_timestamp};
use crate::tools::analytics::*;
use crate::tools::{NoParams, ToolEnv};

const EXPORT_LIMIT: i64 = 10_000;

const CONTACT_COLUMNS: &[&str] = &["id", "first_name", "last_name", "email", "phone", "address", "created_at"];
const JOB_COLUMNS: &[&str] = &[
    "id",
    "description",
    "status",
    "contact_name",
    "scheduled_start",
    "scheduled_end",
    "tech_assigned_id",
    "total_amount",
    "created_at",
];
const INVOICE_COLUMNS: &[&str] = &[
    "id",
    "invoice_number",
    "job_id",
    "contact_id",
    "total_amount",
    "status",
    "due_date",
    "created_at",
];

/// `{key: count}` from a two-column `SELECT key, count(*) ... GROUP BY key`.
fn tally<P: Params>(conn: &Connection, sql: &str, params: P) -> ToolResult<Map<String, Value>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(params, |row| Ok((row.get::<_, Option<String>>(0)?, row.get::<_, i64>(1)?)))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows
        .into_iter()
        .map(|(key, n)| (key.unwrap_or_else(|| "unknown".into()), Value::from(n)))
        .collect())
}

fn sum<P: Params>(conn: &Connection, sql: &str, params: P) -> ToolResult<i64> {
    Ok(conn.query_row(sql, params, |row| row.get::<_, Option<i64>>(0))?.unwrap_or(0))
}

fn period_start(period: Period, today: NaiveDate) -> NaiveDate {
    match period {
        Period::Today => today,
        Period::Week => today - TimeDelta::days(7),
        Period::Month => today.with_day(1).unwrap_or(today),
        Period::Year => today.with_ordinal(1).unwrap_or(today),
    }
}

fn period_name(period: Period) -> &'static str {
    match period {
        Period::Today => "today",
        Period::Week => "week",
        Period::Month => "month",
        Period::Year => "year",
    }
}

pub fn get_analytics(env: &ToolEnv<'_>, p: GetAnalyticsParams) -> ToolResult<Value> {
    let period = p.period.unwrap_or(Period::Month);
    let since = format_timestamp(period_start(period, env.today()).and_time(NaiveTime::MIN).and_utc());
    let account = env.account();

    let mut out = match p.kind {
        AnalyticsType::Jobs => {
            let by_status = tally(
                env.conn,
                "SELECT status, count(*) FROM jobs WHERE account_id = ?1 AND created_at >= ?2 GROUP BY status",
                params![account, since],
            )?;
            let total: i64 = by_status.values().filter_map(Value::as_i64).sum();
            json!({ "type": "jobs", "totalJobs": total, "byStatus": by_status })
        }
        AnalyticsType::Contacts => {
            let new_contacts = count(
                env.conn,
                "SELECT count(*) FROM contacts WHERE account_id = ?1 AND created_at >= ?2",
                params![account, since],
            )?;
            let total = count(env.conn, "SELECT count(*) FROM contacts WHERE account_id = ?1", params![account])?;
            json!({ "type": "contacts", "newContacts": new_contacts, "totalContacts": total })
        }
        AnalyticsType::Revenue => {
            let revenue = sum(
                env.conn,
                "SELECT sum(total_amount) FROM invoices WHERE account_id = ?1 AND status = 'paid' AND paid_at >= ?2",
                params![account, since],
            )?;
            let outstanding = sum(
                env.conn,
                "SELECT sum(total_amount) FROM invoices WHERE account_id = ?1 AND status = 'sent'",
                params![account],
            )?;
            json!({ "type": "revenue", "revenue": revenue, "outstanding": outstanding })
        }
    };
    out["period"] = json!(period_name(period));
    out["since"] = json!(since);
    Ok(out)
}

pub fn get_dashboard_stats(env: &ToolEnv<'_>, _: NoParams) -> ToolResult<Value> {
    let account = env.account();
    let (day_start, day_end) = day_bounds(env.today());
    let month_start = format_timestamp(
        period_start(Period::Month, env.today())
            .and_time(NaiveTime::MIN)
            .and_utc(),
    );

    let by_status = tally(
        env.conn,
        "SELECT status, count(*) FROM jobs WHERE account_id = ?1 GROUP BY status",
        params![account],
    )?;
    let total_jobs: i64 = by_status.values().filter_map(Value::as_i64).sum();
    let jobs_today = count(
        env.conn,
        "SELECT count(*) FROM jobs WHERE account_id = ?1 AND scheduled_start BETWEEN ?2 AND ?3",
        params![account, day_start, day_end],
    )?;
    let contacts = count(env.conn, "SELECT count(*) FROM contacts WHERE account_id = ?1", params![account])?;
    let open_conversations = count(
        env.conn,
        "SELECT count(*) FROM conversations WHERE account_id = ?1 AND status = 'open'",
        params![account],
    )?;
    let unread = count(
        env.conn,
        "SELECT count(*) FROM notifications WHERE account_id = ?1 AND is_read = 0
           AND (?2 IS NULL OR user_id = ?2 OR user_id IS NULL)",
        params![account, env.user_id()],
    )?;
    let revenue = sum(
        env.conn,
        "SELECT sum(total_amount) FROM invoices WHERE account_id = ?1 AND status = 'paid' AND paid_at >= ?2",
        params![account, month_start],
    )?;
    let (outstanding_count, outstanding_amount) = env.conn.query_row(
        "SELECT count(*), coalesce(sum(total_amount), 0) FROM invoices WHERE account_id = ?1 AND status = 'sent'",
        params![account],
        |row| Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?)),
    )?;

    Ok(json!({
        "totalJobs": total_jobs,
        "jobsToday": jobs_today,
        "jobsByStatus": by_status,
        "totalContacts": contacts,
        "openConversations": open_conversations,
        "unreadNotifications": unread,
        "revenueThisMonth": revenue,
        "outstandingInvoices": outstanding_count,
        "outstandingAmount": outstanding_amount,
    }))
}

pub fn get_job_analytics(env: &ToolEnv<'_>, p: JobAnalyticsParams) -> ToolResult<Value> {
    let mut filter = Filter::account("account_id", env.account());
    filter.eq_opt("status", p.status.map(|s| s.as_str().to_string()));
    date_range(env, &mut filter, "created_at", p.date_from.as_deref(), p.date_to.as_deref())?;
    let where_sql = filter.where_sql();

    let by_status = tally(
        env.conn,
        &format!("SELECT status, count(*) FROM jobs{where_sql} GROUP BY status"),
        params_from_iter(filter.values()),
    )?;
    let total: i64 = by_status.values().filter_map(Value::as_i64).sum();
    let done: i64 = ["completed", "invoiced", "paid"]
        .iter()
        .filter_map(|s| by_status.get(*s).and_then(Value::as_i64))
        .sum();
    let (value_total, value_avg) = env.conn.query_row(
        &format!("SELECT coalesce(sum(total_amount), 0), coalesce(avg(total_amount), 0) FROM jobs{where_sql}"),
        params_from_iter(filter.values()),
        |row| Ok((row.get::<_, i64>(0)?, row.get::<_, f64>(1)?)),
    )?;
    let completion_rate = if total > 0 { done as f64 / total as f64 } else { 0.0 };

    Ok(json!({
        "totalJobs": total,
        "byStatus": by_status,
        "completedJobs": done,
        "completionRate": (completion_rate * 1000.0).round() / 1000.0,
        "totalValue": value_total,
        "averageJobValue": value_avg.round() as i64,
    }))
}

pub fn get_revenue_analytics(env: &ToolEnv<'_>, p: RevenueAnalyticsParams) -> ToolResult<Value> {
    let mut filter = Filter::account("i.account_id", env.account());
    date_range(env, &mut filter, "i.created_at", p.date_from.as_deref(), p.date_to.as_deref())?;
    let where_sql = filter.where_sql();

    let (paid, outstanding, invoices) = env.conn.query_row(
        &format!(
            "SELECT coalesce(sum(CASE WHEN i.status = 'paid' THEN i.total_amount END), 0),
                    coalesce(sum(CASE WHEN i.status = 'sent' THEN i.total_amount END), 0),
                    count(*)
             FROM invoices i{where_sql}"
        ),
        params_from_iter(filter.values()),
        |row| Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?, row.get::<_, i64>(2)?)),
    )?;

    let mut out = json!({
        "totalRevenue": paid,
        "outstanding": outstanding,
        "invoiceCount": invoices,
    });
    if let Some(grouping) = p.group_by {
        let key = match grouping {
            RevenueGrouping::Date => "substr(coalesce(i.paid_at, i.created_at), 1, 10)",
            RevenueGrouping::Tech => {
                "coalesce(u.first_name || ' ' || coalesce(u.last_name, ''), 'Unassigned')"
            }
            RevenueGrouping::Status => "i.status",
        };
        let breakdown = query_rows(
            env.conn,
            &format!(
                "SELECT {key} AS group_key, sum(i.total_amount) AS total, count(*) AS invoice_count
                 FROM invoices i
                 LEFT JOIN jobs j ON j.id = i.job_id
                 LEFT JOIN users u ON u.id = j.tech_assigned_id{where_sql}
                 GROUP BY group_key ORDER BY group_key"
            ),
            params_from_iter(filter.values()),
        )?;
        out["breakdown"] = Value::Array(breakdown);
    }
    Ok(out)
}

pub fn get_contact_analytics(env: &ToolEnv<'_>, p: DateRangeParams) -> ToolResult<Value> {
    let mut filter = Filter::account("c.account_id", env.account());
    date_range(env, &mut filter, "c.created_at", p.date_from.as_deref(), p.date_to.as_deref())?;
    let where_sql = filter.where_sql();

    let new_contacts = count(
        env.conn,
        &format!("SELECT count(*) FROM contacts c{where_sql}"),
        params_from_iter(filter.values()),
    )?;
    let with_jobs = count(
        env.conn,
        &format!(
            "SELECT count(*) FROM contacts c{where_sql}
               {} EXISTS (SELECT 1 FROM jobs j WHERE j.contact_id = c.id)",
            if where_sql.is_empty() { "WHERE" } else { "AND" }
        ),
        params_from_iter(filter.values()),
    )?;
    let by_day = tally(
        env.conn,
        &format!("SELECT substr(c.created_at, 1, 10) AS day, count(*) FROM contacts c{where_sql} GROUP BY day"),
        params_from_iter(filter.values()),
    )?;
    let total = count(env.conn, "SELECT count(*) FROM contacts WHERE account_id = ?1", params![env.account()])?;

    Ok(json!({
        "newContacts": new_contacts,
        "contactsWithJobs": with_jobs,
        "totalContacts": total,
        "byDay": by_day,
    }))
}

/// Rows of one dataset within an optional `created_at` range.
fn dataset_rows(
    env: &ToolEnv<'_>,
    kind: DatasetType,
    from: Option<&str>,
    to: Option<&str>,
) -> ToolResult<(Vec<Value>, &'static [&'static str])> {
    let (sql, alias, columns) = match kind {
        DatasetType::Contacts => (
            "SELECT c.id, c.first_name, c.last_name, c.email, c.phone, c.address, c.created_at FROM contacts c",
            "c",
            CONTACT_COLUMNS,
        ),
        DatasetType::Jobs => (
            "SELECT j.id, j.description, j.status,
                    trim(coalesce(c.first_name, '') || ' ' || coalesce(c.last_name, '')) AS contact_name,
                    j.scheduled_start, j.scheduled_end, j.tech_assigned_id, j.total_amount, j.created_at
             FROM jobs j LEFT JOIN contacts c ON c.id = j.contact_id",
            "j",
            JOB_COLUMNS,
        ),
        DatasetType::Invoices => (
            "SELECT i.id, i.invoice_number, i.job_id, i.contact_id, i.total_amount, i.status, i.due_date, i.created_at
             FROM invoices i",
            "i",
            INVOICE_COLUMNS,
        ),
    };
    let mut filter = Filter::account(&format!("{alias}.account_id"), env.account());
    date_range(env, &mut filter, &format!("{alias}.created_at"), from, to)?;
    let rows = query_rows(
        env.conn,
        &format!(
            "{sql}{} ORDER BY {alias}.created_at ASC, {alias}.id ASC LIMIT ?",
            filter.where_sql()
        ),
        params_from_iter(filter.values_with(&[EXPORT_LIMIT])),
    )?;
    Ok((rows, columns))
}

pub fn generate_report(env: &ToolEnv<'_>, p: GenerateReportParams) -> ToolResult<Value> {
    let (rows, _) = dataset_rows(env, p.kind, p.date_from.as_deref(), p.date_to.as_deref())?;

    let mut by_status = Map::new();
    let mut amount = 0i64;
    for row in &rows {
        if let Some(status) = row["status"].as_str() {
            let n = by_status.get(status).and_then(Value::as_i64).unwrap_or(0);
            by_status.insert(status.to_string(), json!(n + 1));
        }
        amount += row["total_amount"].as_i64().unwrap_or(0);
    }
    let mut summary = json!({ "count": rows.len() });
    if p.kind != DatasetType::Contacts {
        summary["byStatus"] = Value::Object(by_status);
        summary["totalAmount"] = json!(amount);
    }

    Ok(json!({
        "report": {
            "type": p.kind.as_str(),
            "dateFrom": p.date_from,
            "dateTo": p.date_to,
            "generatedAt": env.timestamp(),
            "summary": summary,
            "rows": rows,
        }
    }))
}

fn export(
    env: &ToolEnv<'_>,
    kind: DatasetType,
    format: ExportFormat,
    from: Option<&str>,
    to: Option<&str>,
) -> ToolResult<Value> {
    let (rows, columns) = dataset_rows(env, kind, from, to)?;
    let count = rows.len();
    let data = match format {
        ExportFormat::Csv => Value::String(to_csv(&rows, columns)),
        ExportFormat::Json => Value::Array(rows),
    };
    tracing::info!(kind = kind.as_str(), format = format.as_str(), count, "export built");
    Ok(json!({
        "success": true,
        "message": format!("Export completed. {} data exported as {}.", kind.as_str(), format.as_str()),
        "type": kind.as_str(),
        "format": format.as_str(),
        "rowCount": count,
        "data": data,
    }))
}

pub fn export_data(env: &ToolEnv<'_>, p: ExportDataParams) -> ToolResult<Value> {
    export(env, p.kind, p.format.unwrap_or_default(), None, None)
}

pub fn export_contacts(env: &ToolEnv<'_>, p: ExportContactsParams) -> ToolResult<Value> {
    export(env, DatasetType::Contacts, p.format.unwrap_or_default(), None, None)
}

pub fn export_jobs(env: &ToolEnv<'_>, p: ExportJobsParams) -> ToolResult<Value> {
    export(
        env,
        DatasetType::Jobs,
        p.format.unwrap_or_default(),
        p.date_from.as_deref(),
        p.date_to.as_deref(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn month_and_year_periods_start_on_the_first() {
        let today = NaiveDate::from_ymd_opt(2025, 3, 18).unwrap();
        assert_eq!(period_start(Period::Month, today), NaiveDate::from_ymd_opt(2025, 3, 1).unwrap());
        assert_eq!(period_start(Period::Year, today), NaiveDate::from_ymd_opt(2025, 1, 1).unwrap());
        assert_eq!(period_start(Period::Week, today), NaiveDate::from_ymd_opt(2025, 3, 11).unwrap());
    }
}
