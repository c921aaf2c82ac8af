use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use serde_json::{json, Value};

use super::jobs::fetch_job;
use super::{fetch_one, new_id, page_limit, query_rows, require_text, write_audit, Filter, DEFAULT_LIMIT};
use crate::error::{ToolError, ToolResult};
use crate::resolve::{self, require_entity};
use crate::tools::marketing::*;
use crate::tools::ToolEnv;

/// Queue an email in the outbox. Returns the outbox row ID.
pub(crate) fn queue_email(
    env: &ToolEnv<'_>,
    to: &str,
    subject: &str,
    body: &str,
    kind: &str,
    related_id: Option<&str>,
) -> ToolResult<String> {
    let id = new_id();
    env.conn.execute(
        "INSERT INTO outbound_emails (id, account_id, recipient, subject, body, kind, related_id, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![id, env.account(), to, subject, body, kind, related_id, env.timestamp()],
    )?;
    tracing::debug!(outbox = %id, kind, "email queued");
    Ok(id)
}

fn fetch_campaign(conn: &Connection, account_id: &str, id: &str) -> ToolResult<Value> {
    fetch_one(
        conn,
        "SELECT * FROM campaigns WHERE id = ?1 AND account_id = ?2",
        params![id, account_id],
        "Campaign",
    )
}

pub fn list_campaigns(env: &ToolEnv<'_>, p: ListCampaignsParams) -> ToolResult<Value> {
    let mut filter = Filter::account("account_id", env.account());
    filter.eq_opt("status", p.status.map(|s| s.as_str().to_string()));
    let campaigns = query_rows(
        env.conn,
        &format!(
            "SELECT * FROM campaigns{} ORDER BY created_at DESC, id DESC LIMIT ?",
            filter.where_sql()
        ),
        params_from_iter(filter.values_with(&[page_limit(p.limit, DEFAULT_LIMIT)])),
    )?;
    Ok(json!({ "campaignCount": campaigns.len(), "campaigns": campaigns }))
}

pub fn get_campaign(env: &ToolEnv<'_>, p: CampaignIdParams) -> ToolResult<Value> {
    Ok(json!({ "campaign": fetch_campaign(env.conn, env.account(), &p.campaign_id)? }))
}

pub fn create_campaign(env: &ToolEnv<'_>, p: CreateCampaignParams) -> ToolResult<Value> {
    let name = require_text(&p.name, "name")?;
    let subject = require_text(&p.subject, "subject")?;
    let body = require_text(&p.body, "body")?;
    if let Some(template_id) = p.template_id.as_deref() {
        require_entity(env.conn, "email_templates", "Email template", env.account(), template_id)?;
    }

    let id = new_id();
    env.conn.execute(
        "INSERT INTO campaigns (id, account_id, name, subject, body, template_id, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![id, env.account(), name, subject, body, p.template_id, env.timestamp()],
    )?;
    write_audit(env, "create", "campaign", Some(&id), None)?;
    let campaign = fetch_campaign(env.conn, env.account(), &id)?;
    Ok(json!({ "success": true, "campaign": campaign, "campaignId": id }))
}

/// Queue the campaign for every contact that has an email address.
pub fn send_campaign(env: &ToolEnv<'_>, p: CampaignIdParams) -> ToolResult<Value> {
    let campaign = fetch_campaign(env.conn, env.account(), &p.campaign_id)?;
    if campaign["status"] == "sent" {
        return Err(ToolError::validation("Campaign has already been sent"));
    }
    let subject = campaign["subject"].as_str().unwrap_or_default();
    let body = campaign["body"].as_str().unwrap_or_default();

    let recipients: Vec<String> = {
        let mut stmt = env.conn.prepare(
            "SELECT email FROM contacts WHERE account_id = ?1 AND email IS NOT NULL AND email != ''
             ORDER BY created_at ASC",
        )?;
        let emails = stmt
            .query_map(params![env.account()], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        emails
    };
    for to in &recipients {
        queue_email(env, to, subject, body, "campaign", Some(&p.campaign_id))?;
    }

    let now = env.timestamp();
    env.conn.execute(
        "UPDATE campaigns SET status = 'sent', recipient_count = ?1, sent_at = ?2 WHERE id = ?3",
        params![recipients.len() as i64, now, p.campaign_id],
    )?;
    write_audit(
        env,
        "send",
        "campaign",
        Some(&p.campaign_id),
        Some(&json!({"recipients": recipients.len()})),
    )?;
    tracing::info!(campaign = %p.campaign_id, count = recipients.len(), "campaign queued");
    Ok(json!({
        "success": true,
        "campaignId": p.campaign_id,
        "recipientCount": recipients.len(),
    }))
}

pub fn list_email_templates(env: &ToolEnv<'_>, p: ListEmailTemplatesParams) -> ToolResult<Value> {
    let mut filter = Filter::account("account_id", env.account());
    filter.eq_opt("template_type", p.kind);
    let templates = query_rows(
        env.conn,
        &format!(
            "SELECT * FROM email_templates{} ORDER BY name ASC, id ASC LIMIT ?",
            filter.where_sql()
        ),
        params_from_iter(filter.values_with(&[page_limit(p.limit, DEFAULT_LIMIT)])),
    )?;
    Ok(json!({ "templateCount": templates.len(), "templates": templates }))
}

pub fn create_email_template(env: &ToolEnv<'_>, p: CreateEmailTemplateParams) -> ToolResult<Value> {
    let name = require_text(&p.name, "name")?;
    let id = new_id();
    env.conn.execute(
        "INSERT INTO email_templates (id, account_id, name, template_type, subject, body, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![id, env.account(), name, p.kind, p.subject, p.body, env.timestamp()],
    )?;
    write_audit(env, "create", "email_template", Some(&id), None)?;
    let template = fetch_one(env.conn, "SELECT * FROM email_templates WHERE id = ?1", params![id], "Email template")?;
    Ok(json!({ "success": true, "template": template, "templateId": id }))
}

pub fn send_email(env: &ToolEnv<'_>, p: SendEmailParams) -> ToolResult<Value> {
    let to = require_text(&p.to, "to")?;
    if !to.contains('@') {
        return Err(ToolError::validation(format!("\"{to}\" is not a valid email address")));
    }
    if let Some(job_id) = p.job_id.as_deref() {
        fetch_job(env.conn, env.account(), job_id)?;
    }
    let id = queue_email(env, to, &p.subject, &p.body, "direct", p.job_id.as_deref())?;
    write_audit(env, "send", "email", Some(&id), Some(&json!({"to": to})))?;
    Ok(json!({ "success": true, "emailId": id, "message": format!("Email to {to} queued") }))
}

pub fn send_review_request(env: &ToolEnv<'_>, p: ReviewRequestParams) -> ToolResult<Value> {
    let job = fetch_job(env.conn, env.account(), &p.job_id)?;
    let contact_id = match p.contact_id.as_deref() {
        Some(reference) => resolve::resolve_contact(env.conn, env.account(), reference)?,
        None => job["contact_id"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| ToolError::validation("Job has no contact to ask for a review"))?,
    };
    let contact = super::contacts::fetch_contact(env.conn, env.account(), &contact_id)?;
    let to = contact["email"]
        .as_str()
        .filter(|e| !e.is_empty())
        .ok_or_else(|| ToolError::validation("Contact has no email address"))?;
    let first_name = contact["first_name"].as_str().unwrap_or("there");

    let id = queue_email(
        env,
        to,
        "How did we do?",
        &format!(
            "Hi {first_name}, thanks for choosing us for \"{}\". We'd love to hear how it went. Please leave us a review.",
            job["description"].as_str().unwrap_or("your recent job")
        ),
        "review_request",
        Some(&p.job_id),
    )?;
    write_audit(env, "review_request", "job", Some(&p.job_id), Some(&json!({"contactId": contact_id})))?;
    Ok(json!({ "success": true, "emailId": id, "jobId": p.job_id, "contactId": contact_id }))
}

pub fn list_contact_tags(env: &ToolEnv<'_>, p: ListTagsParams) -> ToolResult<Value> {
    let tags = query_rows(
        env.conn,
        "SELECT t.id, t.name, t.color, t.created_at,
                (SELECT count(*) FROM contact_tag_assignments a WHERE a.tag_id = t.id) AS contact_count
         FROM contact_tags t WHERE t.account_id = ?1 ORDER BY t.name ASC LIMIT ?2",
        params![env.account(), page_limit(p.limit, DEFAULT_LIMIT)],
    )?;
    Ok(json!({ "tagCount": tags.len(), "tags": tags }))
}

pub fn create_contact_tag(env: &ToolEnv<'_>, p: CreateTagParams) -> ToolResult<Value> {
    let name = require_text(&p.name, "name")?;
    if find_tag(env, name)?.is_some() {
        return Err(ToolError::validation(format!("Tag \"{name}\" already exists")));
    }
    let id = new_id();
    env.conn.execute(
        "INSERT INTO contact_tags (id, account_id, name, color, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
        params![id, env.account(), name, p.color, env.timestamp()],
    )?;
    let tag = fetch_one(env.conn, "SELECT * FROM contact_tags WHERE id = ?1", params![id], "Tag")?;
    Ok(json!({ "success": true, "tag": tag, "tagId": id }))
}

/// Tag by ID or case-insensitive name.
fn find_tag(env: &ToolEnv<'_>, reference: &str) -> ToolResult<Option<String>> {
    Ok(env
        .conn
        .query_row(
            "SELECT id FROM contact_tags WHERE account_id = ?1 AND (id = ?2 OR lower(name) = lower(?2))",
            params![env.account(), reference],
            |row| row.get(0),
        )
        .optional()?)
}

pub fn assign_tag_to_contact(env: &ToolEnv<'_>, p: AssignTagParams) -> ToolResult<Value> {
    let contact_id = resolve::resolve_contact(env.conn, env.account(), &p.contact_id)?;
    let tag_id = find_tag(env, &p.tag_id)?
        .ok_or_else(|| ToolError::not_found(format!("Tag \"{}\" not found", p.tag_id)))?;
    let inserted = env.conn.execute(
        "INSERT OR IGNORE INTO contact_tag_assignments (contact_id, tag_id, created_at) VALUES (?1, ?2, ?3)",
        params![contact_id, tag_id, env.timestamp()],
    )?;
    if inserted > 0 {
        write_audit(env, "assign_tag", "contact", Some(&contact_id), Some(&json!({"tagId": tag_id})))?;
    }
    Ok(json!({
        "success": true,
        "contactId": contact_id,
        "tagId": tag_id,
        "alreadyAssigned": inserted == 0,
    }))
}

pub fn list_automation_rules(env: &ToolEnv<'_>, p: ListAutomationRulesParams) -> ToolResult<Value> {
    let mut filter = Filter::account("account_id", env.account());
    filter.eq_opt("active", p.active.map(i64::from));
    let rules = query_rows(
        env.conn,
        &format!(
            "SELECT * FROM automation_rules{} ORDER BY created_at DESC, id DESC LIMIT ?",
            filter.where_sql()
        ),
        params_from_iter(filter.values_with(&[page_limit(p.limit, DEFAULT_LIMIT)])),
    )?;
    Ok(json!({ "ruleCount": rules.len(), "rules": rules }))
}

pub fn create_automation_rule(env: &ToolEnv<'_>, p: CreateAutomationRuleParams) -> ToolResult<Value> {
    let name = require_text(&p.name, "name")?;
    let trigger = require_text(&p.trigger, "trigger")?;
    let action = require_text(&p.action, "action")?;
    let trigger_config = match p.trigger_config {
        None | Some(Value::Null) => json!({}),
        Some(config @ Value::Object(_)) => config,
        Some(_) => return Err(ToolError::validation("triggerConfig must be an object")),
    };
    let id = new_id();
    env.conn.execute(
        "INSERT INTO automation_rules (id, account_id, name, trigger, trigger_config, action, active, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            id,
            env.account(),
            name,
            trigger,
            trigger_config.to_string(),
            action,
            p.active.unwrap_or(true),
            env.timestamp()
        ],
    )?;
    write_audit(env, "create", "automation_rule", Some(&id), None)?;
    let rule = fetch_one(env.conn, "SELECT * FROM automation_rules WHERE id = ?1", params![id], "Automation rule")?;
    Ok(json!({ "success": true, "rule": rule, "ruleId": id }))
}
