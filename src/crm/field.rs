use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};
use serde_json::{json, Value};

use super::contacts::insert_note;
use super::jobs::{fetch_job, query_jobs};
use super::{fetch_one, new_id, query_rows, write_audit, Filter, DEFAULT_LIMIT};
use crate::error::{ToolError, ToolResult};
use crate::resolve::{self, date_filter};
use crate::tools::field::*;
use crate::tools::ToolEnv;

fn store_photo(
    env: &ToolEnv<'_>,
    job_id: &str,
    url: Option<String>,
    data: Option<String>,
    caption: Option<String>,
) -> ToolResult<Value> {
    fetch_job(env.conn, env.account(), job_id)?;
    let photo_url = match (url, data) {
        (Some(url), _) if !url.trim().is_empty() => url,
        (_, Some(data)) if data.starts_with("data:") => data,
        (_, Some(data)) if !data.trim().is_empty() => format!("data:image/jpeg;base64,{data}"),
        _ => return Err(ToolError::validation("Either photoUrl or photo data is required")),
    };

    let id = new_id();
    env.conn.execute(
        "INSERT INTO job_photos (id, account_id, job_id, photo_url, caption, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![id, env.account(), job_id, photo_url, caption, env.timestamp()],
    )?;
    write_audit(env, "upload_photo", "job", Some(job_id), Some(&json!({"photoId": id})))?;

    let photo = fetch_one(env.conn, "SELECT * FROM job_photos WHERE id = ?1", params![id], "Photo")?;
    Ok(json!({ "success": true, "photo": photo, "photoId": id, "jobId": job_id }))
}

pub fn upload_photo(env: &ToolEnv<'_>, p: UploadPhotoParams) -> ToolResult<Value> {
    store_photo(env, &p.job_id, p.photo_url, p.photo_data, None)
}

pub fn upload_job_photo(env: &ToolEnv<'_>, p: UploadJobPhotoParams) -> ToolResult<Value> {
    store_photo(env, &p.job_id, p.photo_url, p.base64_data, p.caption)
}

pub fn list_job_photos(env: &ToolEnv<'_>, p: ListJobPhotosParams) -> ToolResult<Value> {
    fetch_job(env.conn, env.account(), &p.job_id)?;
    let photos = query_rows(
        env.conn,
        "SELECT id, job_id, photo_url, caption, created_at FROM job_photos
         WHERE job_id = ?1 AND account_id = ?2 ORDER BY created_at ASC, id ASC",
        params![p.job_id, env.account()],
    )?;
    Ok(json!({ "jobId": p.job_id, "photoCount": photos.len(), "photos": photos }))
}

pub fn capture_location(env: &ToolEnv<'_>, p: CaptureLocationParams) -> ToolResult<Value> {
    if !(-90.0..=90.0).contains(&p.lat) || !(-180.0..=180.0).contains(&p.lng) {
        return Err(ToolError::validation("lat must be within ±90 and lng within ±180"));
    }
    fetch_job(env.conn, env.account(), &p.job_id)?;
    let now = env.timestamp();
    env.conn.execute(
        "UPDATE jobs SET latitude = ?1, longitude = ?2, location_captured_at = ?3, updated_at = ?3
         WHERE id = ?4 AND account_id = ?5",
        params![p.lat, p.lng, now, p.job_id, env.account()],
    )?;
    write_audit(
        env,
        "capture_location",
        "job",
        Some(&p.job_id),
        Some(&json!({"lat": p.lat, "lng": p.lng})),
    )?;
    let job = fetch_job(env.conn, env.account(), &p.job_id)?;
    Ok(json!({ "success": true, "job": job, "jobId": p.job_id }))
}

/// Newest time entry of the caller that has no end time.
fn open_entry(env: &ToolEnv<'_>) -> ToolResult<Option<String>> {
    Ok(env
        .conn
        .query_row(
            "SELECT id FROM time_entries
             WHERE account_id = ?1 AND user_id IS ?2 AND end_time IS NULL
             ORDER BY start_time DESC, id DESC LIMIT 1",
            params![env.account(), env.user_id()],
            |row| row.get(0),
        )
        .optional()?)
}

fn fetch_entry(env: &ToolEnv<'_>, id: &str) -> ToolResult<Value> {
    fetch_one(
        env.conn,
        "SELECT * FROM time_entries WHERE id = ?1 AND account_id = ?2",
        params![id, env.account()],
        "Time entry",
    )
}

pub fn clock_in(env: &ToolEnv<'_>, p: ClockInParams) -> ToolResult<Value> {
    if let Some(open) = open_entry(env)? {
        return Err(ToolError::validation(format!(
            "Already clocked in (time entry {open}). Clock out first."
        )));
    }
    if let Some(job_id) = p.job_id.as_deref() {
        fetch_job(env.conn, env.account(), job_id)?;
    }

    let id = new_id();
    env.conn.execute(
        "INSERT INTO time_entries (id, account_id, user_id, job_id, start_time, notes)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![id, env.account(), env.user_id(), p.job_id, env.timestamp(), p.notes],
    )?;
    write_audit(env, "clock_in", "time_entry", Some(&id), None)?;

    let entry = fetch_entry(env, &id)?;
    Ok(json!({ "success": true, "timeEntry": entry, "timeEntryId": id, "jobId": p.job_id }))
}

pub fn clock_out(env: &ToolEnv<'_>, p: ClockOutParams) -> ToolResult<Value> {
    let id = match p.time_entry_id {
        Some(id) => {
            let entry = fetch_entry(env, &id)?;
            if !entry["end_time"].is_null() {
                return Err(ToolError::validation("Time entry is already clocked out"));
            }
            id
        }
        None => open_entry(env)?
            .ok_or_else(|| ToolError::not_found("No active time entry found to clock out"))?,
    };

    let now = env.timestamp();
    env.conn.execute(
        "UPDATE time_entries SET end_time = ?1, notes = coalesce(?2, notes) WHERE id = ?3",
        params![now, p.notes, id],
    )?;
    write_audit(env, "clock_out", "time_entry", Some(&id), None)?;

    let entry = fetch_entry(env, &id)?;
    let minutes = entry["start_time"]
        .as_str()
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|start| (env.now - start.with_timezone(&Utc)).num_minutes())
        .unwrap_or(0);
    Ok(json!({
        "success": true,
        "timeEntry": entry,
        "timeEntryId": id,
        "durationMinutes": minutes,
    }))
}

pub fn add_job_note(env: &ToolEnv<'_>, p: AddJobNoteParams) -> ToolResult<Value> {
    if p.job_id.is_none() && p.contact_id.is_none() && p.conversation_id.is_none() {
        return Err(ToolError::validation("One of jobId, contactId, or conversationId is required"));
    }
    if let Some(job_id) = p.job_id.as_deref() {
        fetch_job(env.conn, env.account(), job_id)?;
    }
    let contact_id = p
        .contact_id
        .as_deref()
        .map(|c| resolve::resolve_contact(env.conn, env.account(), c))
        .transpose()?;
    let conversation_id = p
        .conversation_id
        .as_deref()
        .map(|c| resolve::resolve_conversation(env.conn, env.account(), c))
        .transpose()?;

    let note = insert_note(
        env,
        p.job_id.as_deref(),
        contact_id.as_deref(),
        conversation_id.as_deref(),
        &p.content,
    )?;
    Ok(json!({ "success": true, "note": note, "jobId": p.job_id }))
}

pub fn get_my_jobs(env: &ToolEnv<'_>, p: GetMyJobsParams) -> ToolResult<Value> {
    let user_id = env
        .user_id()
        .ok_or_else(|| ToolError::validation("A signed-in user is required to list your jobs"))?;
    let mut filter = Filter::account("j.account_id", env.account());
    filter
        .eq("j.tech_assigned_id", user_id.to_string())
        .eq_opt("j.status", p.status.map(|s| s.as_str().to_string()));
    if let Some(bounds) = date_filter(p.date.as_deref(), env.today())? {
        filter.between("j.scheduled_start", bounds);
    }
    let jobs = query_jobs(env.conn, &filter, DEFAULT_LIMIT, 0)?;
    Ok(json!({ "jobCount": jobs.len(), "jobs": jobs }))
}
