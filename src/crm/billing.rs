use rusqlite::{params, params_from_iter, Connection};
use serde_json::{json, Value};

use super::jobs::fetch_job;
use super::{
    cents_to_dollars, count, dollars_to_cents, fetch_one, new_id, page_limit, page_offset, query_rows,
    write_audit, Filter, DEFAULT_LIMIT,
};
use crate::error::{ToolError, ToolResult};
use crate::resolve::normalize_timestamp;
use crate::tools::billing::*;
use crate::tools::jobs::JobStatus;
use crate::tools::ToolEnv;

const INVOICE_SELECT: &str = "SELECT i.id, i.account_id, i.job_id, i.contact_id, i.invoice_number,
        i.description, i.total_amount, i.status, i.due_date, i.notes, i.sent_at, i.paid_at,
        i.created_at, i.updated_at,
        (SELECT coalesce(sum(p.amount), 0) FROM payments p WHERE p.invoice_id = i.id) AS amount_paid,
        CASE WHEN c.id IS NULL THEN NULL ELSE json_object(
            'id', c.id, 'first_name', c.first_name, 'last_name', c.last_name, 'email', c.email) END AS contact
    FROM invoices i
    LEFT JOIN contacts c ON c.id = i.contact_id";

pub fn fetch_invoice(conn: &Connection, account_id: &str, id: &str) -> ToolResult<Value> {
    fetch_one(
        conn,
        &format!("{INVOICE_SELECT} WHERE i.id = ?1 AND i.account_id = ?2"),
        params![id, account_id],
        "Invoice",
    )
}

fn invoice_payload(conn: &Connection, account_id: &str, id: &str) -> ToolResult<Value> {
    let invoice = fetch_invoice(conn, account_id, id)?;
    Ok(json!({ "success": true, "invoice": invoice, "invoiceId": id }))
}

fn set_job_status(env: &ToolEnv<'_>, job_id: Option<&str>, status: JobStatus) -> ToolResult<()> {
    if let Some(job_id) = job_id {
        env.conn.execute(
            "UPDATE jobs SET status = ?1, updated_at = ?2 WHERE id = ?3 AND account_id = ?4",
            params![status.as_str(), env.timestamp(), job_id, env.account()],
        )?;
    }
    Ok(())
}

pub fn create_invoice(env: &ToolEnv<'_>, p: CreateInvoiceParams) -> ToolResult<Value> {
    let job = fetch_job(env.conn, env.account(), &p.job_id)?;
    let amount = match p.amount {
        Some(dollars) => dollars_to_cents(dollars, "amount")?,
        None => job["total_amount"].as_i64().unwrap_or(0),
    };
    let description = p
        .description
        .or_else(|| job["description"].as_str().map(str::to_string));

    let sequence = count(
        env.conn,
        "SELECT count(*) FROM invoices WHERE account_id = ?1",
        params![env.account()],
    )? + 1;
    let number = format!("INV-{sequence:05}");

    let id = new_id();
    let now = env.timestamp();
    env.conn.execute(
        "INSERT INTO invoices (id, account_id, job_id, contact_id, invoice_number, description,
                               total_amount, status, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 'draft', ?8, ?8)",
        params![id, env.account(), p.job_id, job["contact_id"].as_str(), number, description, amount, now],
    )?;
    write_audit(
        env,
        "create",
        "invoice",
        Some(&id),
        Some(&json!({"jobId": p.job_id, "totalAmount": amount})),
    )?;
    tracing::info!(invoice = %id, number = %number, "invoice created");
    invoice_payload(env.conn, env.account(), &id)
}

/// Mark the invoice sent, move its job to `invoiced`, and queue the email.
pub fn send_invoice(env: &ToolEnv<'_>, p: InvoiceIdParams) -> ToolResult<Value> {
    let invoice = fetch_invoice(env.conn, env.account(), &p.invoice_id)?;
    match invoice["status"].as_str() {
        Some("void") => return Err(ToolError::validation("Cannot send a void invoice")),
        Some("paid") => return Err(ToolError::validation("Invoice is already paid")),
        _ => {}
    }

    let now = env.timestamp();
    env.conn.execute(
        "UPDATE invoices SET status = 'sent', sent_at = ?1, updated_at = ?1 WHERE id = ?2",
        params![now, p.invoice_id],
    )?;
    set_job_status(env, invoice["job_id"].as_str(), JobStatus::Invoiced)?;

    let number = invoice["invoice_number"].as_str().unwrap_or_default();
    let queued = match invoice["contact"]["email"].as_str() {
        Some(to) => {
            let total = cents_to_dollars(invoice["total_amount"].as_i64().unwrap_or(0));
            super::marketing::queue_email(
                env,
                to,
                &format!("Invoice {number}"),
                &format!("Your invoice {number} for ${total:.2} is ready."),
                "invoice",
                Some(&p.invoice_id),
            )?;
            true
        }
        None => false,
    };
    write_audit(env, "send", "invoice", Some(&p.invoice_id), Some(&json!({"emailQueued": queued})))?;

    let mut payload = invoice_payload(env.conn, env.account(), &p.invoice_id)?;
    payload["emailQueued"] = json!(queued);
    Ok(payload)
}

pub fn list_invoices(env: &ToolEnv<'_>, p: ListInvoicesParams) -> ToolResult<Value> {
    let mut filter = Filter::account("i.account_id", env.account());
    filter.eq_opt("i.status", p.status.map(|s| s.as_str().to_string()));
    let invoices = query_rows(
        env.conn,
        &format!(
            "{INVOICE_SELECT}{} ORDER BY i.created_at DESC, i.id DESC LIMIT ? OFFSET ?",
            filter.where_sql()
        ),
        params_from_iter(filter.values_with(&[page_limit(p.limit, DEFAULT_LIMIT), page_offset(p.offset)])),
    )?;
    Ok(json!({ "invoiceCount": invoices.len(), "invoices": invoices }))
}

pub fn get_invoice(env: &ToolEnv<'_>, p: InvoiceIdParams) -> ToolResult<Value> {
    let invoice = fetch_invoice(env.conn, env.account(), &p.invoice_id)?;
    let payments = query_rows(
        env.conn,
        "SELECT id, amount, method, created_at FROM payments WHERE invoice_id = ?1 ORDER BY created_at ASC",
        params![p.invoice_id],
    )?;
    Ok(json!({ "invoice": invoice, "invoiceId": p.invoice_id, "payments": payments }))
}

pub fn update_invoice(env: &ToolEnv<'_>, p: UpdateInvoiceParams) -> ToolResult<Value> {
    fetch_invoice(env.conn, env.account(), &p.invoice_id)?;
    if p.total_amount.is_none() && p.due_date.is_none() && p.notes.is_none() {
        return Err(ToolError::validation("No fields to update"));
    }
    if p.total_amount.is_some_and(|cents| cents < 0) {
        return Err(ToolError::validation("totalAmount must not be negative"));
    }
    let due_date = p
        .due_date
        .as_deref()
        .map(|d| normalize_timestamp(d, env.today()))
        .transpose()?;

    env.conn.execute(
        "UPDATE invoices SET total_amount = coalesce(?1, total_amount), due_date = coalesce(?2, due_date),
                notes = coalesce(?3, notes), updated_at = ?4
         WHERE id = ?5 AND account_id = ?6",
        params![p.total_amount, due_date, p.notes, env.timestamp(), p.invoice_id, env.account()],
    )?;
    write_audit(
        env,
        "update",
        "invoice",
        Some(&p.invoice_id),
        Some(&json!({"totalAmount": p.total_amount, "dueDate": due_date})),
    )?;
    invoice_payload(env.conn, env.account(), &p.invoice_id)
}

fn mark_paid(env: &ToolEnv<'_>, invoice: &Value, invoice_id: &str) -> ToolResult<()> {
    let now = env.timestamp();
    env.conn.execute(
        "UPDATE invoices SET status = 'paid', paid_at = ?1, updated_at = ?1 WHERE id = ?2",
        params![now, invoice_id],
    )?;
    set_job_status(env, invoice["job_id"].as_str(), JobStatus::Paid)
}

pub fn mark_invoice_paid(env: &ToolEnv<'_>, p: InvoiceIdParams) -> ToolResult<Value> {
    let invoice = fetch_invoice(env.conn, env.account(), &p.invoice_id)?;
    if invoice["status"] == "void" {
        return Err(ToolError::validation("Cannot mark a void invoice as paid"));
    }
    mark_paid(env, &invoice, &p.invoice_id)?;
    write_audit(env, "mark_paid", "invoice", Some(&p.invoice_id), None)?;
    invoice_payload(env.conn, env.account(), &p.invoice_id)
}

pub fn list_payments(env: &ToolEnv<'_>, p: ListPaymentsParams) -> ToolResult<Value> {
    let mut filter = Filter::account("p.account_id", env.account());
    filter.eq_opt("p.invoice_id", p.invoice_id);
    let payments = query_rows(
        env.conn,
        &format!(
            "SELECT p.id, p.invoice_id, i.invoice_number, p.amount, p.method, p.created_at
             FROM payments p JOIN invoices i ON i.id = p.invoice_id{}
             ORDER BY p.created_at DESC, p.id DESC LIMIT ?",
            filter.where_sql()
        ),
        params_from_iter(filter.values_with(&[page_limit(p.limit, DEFAULT_LIMIT)])),
    )?;
    Ok(json!({ "paymentCount": payments.len(), "payments": payments }))
}

/// Record a payment; an invoice whose payments cover its total becomes paid.
pub fn create_payment(env: &ToolEnv<'_>, p: CreatePaymentParams) -> ToolResult<Value> {
    let invoice = fetch_invoice(env.conn, env.account(), &p.invoice_id)?;
    let amount = dollars_to_cents(p.amount, "amount")?;
    if amount == 0 {
        return Err(ToolError::validation("amount must be greater than zero"));
    }
    if invoice["status"] == "void" {
        return Err(ToolError::validation("Cannot record a payment on a void invoice"));
    }

    let id = new_id();
    env.conn.execute(
        "INSERT INTO payments (id, account_id, invoice_id, amount, method, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![id, env.account(), p.invoice_id, amount, p.method, env.timestamp()],
    )?;

    let paid = invoice["amount_paid"].as_i64().unwrap_or(0) + amount;
    let total = invoice["total_amount"].as_i64().unwrap_or(0);
    let settled = total > 0 && paid >= total && invoice["status"] != "paid";
    if settled {
        mark_paid(env, &invoice, &p.invoice_id)?;
    }
    write_audit(
        env,
        "create",
        "payment",
        Some(&id),
        Some(&json!({"invoiceId": p.invoice_id, "amount": amount})),
    )?;

    let payment = fetch_one(env.conn, "SELECT * FROM payments WHERE id = ?1", params![id], "Payment")?;
    let status = if settled { "paid" } else { invoice["status"].as_str().unwrap_or("draft") };
    Ok(json!({
        "success": true,
        "payment": payment,
        "paymentId": id,
        "invoiceId": p.invoice_id,
        "invoiceStatus": status,
        "balanceDue": (total - paid).max(0),
    }))
}
