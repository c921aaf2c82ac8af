use rusqlite::{params, params_from_iter, Connection};
use serde_json::{json, Value};

use super::{fetch_one, new_id, page_limit, page_offset, query_rows, require_text, write_audit, Filter, DEFAULT_LIMIT};
use crate::error::{ToolError, ToolResult};
use crate::resolve::{self, date_filter, normalize_timestamp};
use crate::tools::jobs::*;
use crate::tools::ToolEnv;

/// Jobs with their contact and technician folded in as nested objects.
pub(crate) const JOB_SELECT: &str = "SELECT j.id, j.account_id, j.contact_id, j.description, j.status,
        j.scheduled_start, j.scheduled_end, j.tech_assigned_id, j.total_amount,
        j.latitude, j.longitude, j.location_captured_at, j.created_at, j.updated_at,
        CASE WHEN c.id IS NULL THEN NULL ELSE json_object(
            'id', c.id, 'first_name', c.first_name, 'last_name', c.last_name,
            'email', c.email, 'phone', c.phone, 'address', c.address) END AS contact,
        CASE WHEN u.id IS NULL THEN NULL ELSE json_object(
            'id', u.id, 'first_name', u.first_name, 'last_name', u.last_name,
            'email', u.email, 'phone', u.phone) END AS tech
    FROM jobs j
    LEFT JOIN contacts c ON c.id = j.contact_id
    LEFT JOIN users u ON u.id = j.tech_assigned_id";

pub fn fetch_job(conn: &Connection, account_id: &str, job_id: &str) -> ToolResult<Value> {
    fetch_one(
        conn,
        &format!("{JOB_SELECT} WHERE j.id = ?1 AND j.account_id = ?2"),
        params![job_id, account_id],
        "Job",
    )
}

/// Jobs matching `filter`, newest first.
pub fn query_jobs(conn: &Connection, filter: &Filter, limit: i64, offset: i64) -> ToolResult<Vec<Value>> {
    query_rows(
        conn,
        &format!(
            "{JOB_SELECT}{} ORDER BY j.created_at DESC, j.id DESC LIMIT ? OFFSET ?",
            filter.where_sql()
        ),
        params_from_iter(filter.values_with(&[limit, offset])),
    )
}

fn jobs_payload(jobs: Vec<Value>) -> Value {
    json!({ "jobCount": jobs.len(), "jobs": jobs })
}

fn touch(env: &ToolEnv<'_>, job_id: &str, column: &str, value: Option<&str>) -> ToolResult<()> {
    env.conn.execute(
        &format!("UPDATE jobs SET {column} = ?1, updated_at = ?2 WHERE id = ?3 AND account_id = ?4"),
        params![value, env.timestamp(), job_id, env.account()],
    )?;
    Ok(())
}

pub fn create_job(env: &ToolEnv<'_>, p: CreateJobParams) -> ToolResult<Value> {
    let description = require_text(&p.description, "description")?;
    let reference = p.contact_id.as_deref().unwrap_or(&p.contact_name);
    let contact_id = resolve::resolve_contact(env.conn, env.account(), reference).map_err(|e| match e {
        ToolError::NotFound(_) => {
            ToolError::not_found("Contact not found. Please specify contact name or ID.")
        }
        other => other,
    })?;

    let tech_id = p
        .tech_assigned_id
        .as_deref()
        .map(|t| resolve::resolve_tech(env.conn, env.account(), t))
        .transpose()?;
    let start = p
        .scheduled_start
        .as_deref()
        .map(|s| normalize_timestamp(s, env.today()))
        .transpose()?;
    let end = p
        .scheduled_end
        .as_deref()
        .map(|s| normalize_timestamp(s, env.today()))
        .transpose()?;
    if let (Some(s), Some(e)) = (&start, &end) {
        if e < s {
            return Err(ToolError::validation("scheduledEnd must not be before scheduledStart"));
        }
    }
    let status = if start.is_some() {
        JobStatus::Scheduled
    } else {
        JobStatus::Lead
    };

    let id = new_id();
    let now = env.timestamp();
    env.conn.execute(
        "INSERT INTO jobs (id, account_id, contact_id, description, status, scheduled_start,
                           scheduled_end, tech_assigned_id, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9)",
        params![id, env.account(), contact_id, description, status.as_str(), start, end, tech_id, now],
    )?;
    write_audit(env, "create", "job", Some(&id), Some(&json!({"contactId": contact_id})))?;
    tracing::info!(job = %id, contact = %contact_id, "job created");

    let job = fetch_job(env.conn, env.account(), &id)?;
    Ok(json!({ "success": true, "job": job, "jobId": id }))
}

pub fn get_job(env: &ToolEnv<'_>, p: JobIdParams) -> ToolResult<Value> {
    let job = fetch_job(env.conn, env.account(), &p.job_id)?;
    Ok(json!({ "job": job }))
}

pub fn update_job_status(env: &ToolEnv<'_>, p: UpdateJobStatusParams) -> ToolResult<Value> {
    let before = fetch_job(env.conn, env.account(), &p.job_id)?;
    touch(env, &p.job_id, "status", Some(p.status.as_str()))?;
    write_audit(
        env,
        "update_status",
        "job",
        Some(&p.job_id),
        Some(&json!({"from": before["status"], "to": p.status.as_str()})),
    )?;
    let job = fetch_job(env.conn, env.account(), &p.job_id)?;
    Ok(json!({ "success": true, "job": job, "jobId": p.job_id }))
}

fn assign(env: &ToolEnv<'_>, job_id: &str, tech_id: &str) -> ToolResult<Value> {
    fetch_job(env.conn, env.account(), job_id)?;
    touch(env, job_id, "tech_assigned_id", Some(tech_id))?;
    write_audit(env, "assign_tech", "job", Some(job_id), Some(&json!({"techId": tech_id})))?;
    let job = fetch_job(env.conn, env.account(), job_id)?;
    Ok(json!({ "success": true, "job": job, "jobId": job_id }))
}

pub fn assign_tech(env: &ToolEnv<'_>, p: AssignTechParams) -> ToolResult<Value> {
    let tech_id = resolve::resolve_tech(env.conn, env.account(), &p.tech_assigned_id)?;
    assign(env, &p.job_id, &tech_id)
}

pub fn assign_tech_by_name(env: &ToolEnv<'_>, p: AssignTechByNameParams) -> ToolResult<Value> {
    let tech_id = resolve::find_tech_by_name(env.conn, env.account(), &p.tech_name)?
        .ok_or_else(|| ToolError::not_found(format!("Technician \"{}\" not found", p.tech_name)))?;
    assign(env, &p.job_id, &tech_id)
}

pub fn list_jobs(env: &ToolEnv<'_>, p: ListJobsParams) -> ToolResult<Value> {
    let mut filter = Filter::account("j.account_id", env.account());
    filter
        .eq_opt("j.status", p.status.map(|s| s.as_str().to_string()))
        .eq_opt("j.tech_assigned_id", p.tech_id)
        .eq_opt("j.contact_id", p.contact_id);
    if let Some(bounds) = date_filter(p.date.as_deref(), env.today())? {
        filter.between("j.scheduled_start", bounds);
    }
    let jobs = query_jobs(
        env.conn,
        &filter,
        page_limit(p.limit, DEFAULT_LIMIT),
        page_offset(p.offset),
    )?;
    Ok(jobs_payload(jobs))
}

pub fn search_jobs(env: &ToolEnv<'_>, p: SearchJobsParams) -> ToolResult<Value> {
    let mut filter = Filter::account("j.account_id", env.account());
    filter.eq_opt("j.status", p.status.map(|s| s.as_str().to_string()));
    if let Some(bounds) = date_filter(p.date.as_deref(), env.today())? {
        filter.between("j.scheduled_start", bounds);
    }
    if let Some(name) = p.contact_name.as_deref() {
        match resolve::find_contact_by_name(env.conn, env.account(), name)? {
            Some(contact_id) => {
                filter.eq("j.contact_id", contact_id);
            }
            None => return Ok(jobs_payload(Vec::new())),
        }
    }
    Ok(jobs_payload(query_jobs(env.conn, &filter, DEFAULT_LIMIT, 0)?))
}

pub fn filter_jobs(env: &ToolEnv<'_>, p: FilterJobsParams) -> ToolResult<Value> {
    let mut filter = Filter::account("j.account_id", env.account());
    filter
        .eq_opt("j.status", p.status.map(|s| s.as_str().to_string()))
        .eq_opt("j.tech_assigned_id", p.tech_id)
        .eq_opt("j.contact_id", p.contact_id);
    Ok(jobs_payload(query_jobs(env.conn, &filter, DEFAULT_LIMIT, 0)?))
}

pub fn update_job(env: &ToolEnv<'_>, p: UpdateJobParams) -> ToolResult<Value> {
    fetch_job(env.conn, env.account(), &p.job_id)?;

    let mut changed = serde_json::Map::new();
    if let Some(description) = p.description.as_deref() {
        let description = require_text(description, "description")?;
        touch(env, &p.job_id, "description", Some(description))?;
        changed.insert("description".into(), json!(description));
    }
    if let Some(start) = p.scheduled_start.as_deref() {
        let start = normalize_timestamp(start, env.today())?;
        touch(env, &p.job_id, "scheduled_start", Some(&start))?;
        changed.insert("scheduledStart".into(), json!(start));
    }
    if let Some(end) = p.scheduled_end.as_deref() {
        let end = normalize_timestamp(end, env.today())?;
        touch(env, &p.job_id, "scheduled_end", Some(&end))?;
        changed.insert("scheduledEnd".into(), json!(end));
    }
    if changed.is_empty() {
        return Err(ToolError::validation("No fields to update"));
    }

    write_audit(env, "update", "job", Some(&p.job_id), Some(&Value::Object(changed)))?;
    let job = fetch_job(env.conn, env.account(), &p.job_id)?;
    Ok(json!({ "success": true, "job": job, "jobId": p.job_id }))
}

pub fn delete_job(env: &ToolEnv<'_>, p: JobIdParams) -> ToolResult<Value> {
    fetch_job(env.conn, env.account(), &p.job_id)?;
    env.conn.execute(
        "DELETE FROM jobs WHERE id = ?1 AND account_id = ?2",
        params![p.job_id, env.account()],
    )?;
    write_audit(env, "delete", "job", Some(&p.job_id), None)?;
    Ok(json!({ "success": true, "message": "Job deleted successfully" }))
}

pub fn bulk_operations(env: &ToolEnv<'_>, p: BulkOperationsParams) -> ToolResult<Value> {
    // Check the action's own argument before touching any rows.
    let tech_id = match p.action {
        BulkAction::Status if p.status.is_none() => {
            return Err(ToolError::validation("status is required when action is status"));
        }
        BulkAction::Assign => {
            let tech = p
                .tech_id
                .as_deref()
                .ok_or_else(|| ToolError::validation("techId is required when action is assign"))?;
            Some(resolve::resolve_tech(env.conn, env.account(), tech)?)
        }
        BulkAction::Status => None,
    };

    let mut job_ids = p.job_ids;
    if job_ids.is_empty() {
        if let Some(criteria) = p.filter {
            let mut filter = Filter::account("j.account_id", env.account());
            filter.eq_opt("j.status", criteria.status.map(|s| s.as_str().to_string()));
            if let Some(bounds) = date_filter(criteria.date.as_deref(), env.today())? {
                filter.between("j.scheduled_start", bounds);
            }
            let mut stmt = env.conn.prepare(&format!("SELECT j.id FROM jobs j{}", filter.where_sql()))?;
            job_ids = stmt
                .query_map(params_from_iter(filter.values()), |row| row.get(0))?
                .collect::<Result<Vec<String>, _>>()?;
        }
    }
    if job_ids.is_empty() {
        return Err(ToolError::not_found("No jobs found to perform bulk operation"));
    }

    let now = env.timestamp();
    let mut updated = 0usize;
    for job_id in &job_ids {
        updated += match (p.action, p.status, tech_id.as_deref()) {
            (BulkAction::Status, Some(status), _) => env.conn.execute(
                "UPDATE jobs SET status = ?1, updated_at = ?2 WHERE id = ?3 AND account_id = ?4",
                params![status.as_str(), now, job_id, env.account()],
            )?,
            (BulkAction::Assign, _, Some(tech)) => env.conn.execute(
                "UPDATE jobs SET tech_assigned_id = ?1, updated_at = ?2 WHERE id = ?3 AND account_id = ?4",
                params![tech, now, job_id, env.account()],
            )?,
            _ => 0,
        };
    }

    write_audit(
        env,
        "bulk_update",
        "job",
        None,
        Some(&json!({"jobIds": job_ids, "updated": updated})),
    )?;
    tracing::info!(count = updated, "bulk job update");
    Ok(json!({ "success": true, "updatedCount": updated, "jobIds": job_ids }))
}

pub fn get_tech_jobs(env: &ToolEnv<'_>, p: TechJobsParams) -> ToolResult<Value> {
    let tech_id = match p.tech_id.as_deref() {
        Some(reference) => resolve::resolve_tech(env.conn, env.account(), reference)?,
        None => env
            .user_id()
            .map(str::to_string)
            .ok_or_else(|| ToolError::validation("techId is required when no user is signed in"))?,
    };
    let mut filter = Filter::account("j.account_id", env.account());
    filter
        .eq("j.tech_assigned_id", tech_id.clone())
        .eq_opt("j.status", p.status.map(|s| s.as_str().to_string()));
    if let Some(bounds) = date_filter(p.date.as_deref(), env.today())? {
        filter.between("j.scheduled_start", bounds);
    }
    let jobs = query_jobs(env.conn, &filter, page_limit(p.limit, DEFAULT_LIMIT), 0)?;
    Ok(json!({ "techId": tech_id, "jobCount": jobs.len(), "jobs": jobs }))
}
