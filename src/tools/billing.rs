//! Invoice and payment tools. Spoken amounts are dollars; stored amounts are cents.

use schemars::JsonSchema;
use serde::Deserialize;

use super::Catalog;
use crate::crm::billing;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum InvoiceStatus {
    Draft,
    Sent,
    Paid,
    Void,
}

impl InvoiceStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Sent => "sent",
            Self::Paid => "paid",
            Self::Void => "void",
        }
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateInvoiceParams {
    #[schemars(description = "UUID of the job or \"last\" or \"current\" for context")]
    pub job_id: String,
    #[schemars(description = "Invoice amount in dollars (optional, defaults to the job total)")]
    pub amount: Option<f64>,
    #[schemars(description = "Invoice description (optional)")]
    pub description: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceIdParams {
    #[schemars(description = "UUID of the invoice")]
    pub invoice_id: String,
}

#[derive(Debug, Default, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ListInvoicesParams {
    #[schemars(description = "Filter by status")]
    pub status: Option<InvoiceStatus>,
    #[schemars(description = "Maximum number of results (default: 50)")]
    pub limit: Option<i64>,
    #[schemars(description = "Offset for pagination (default: 0)")]
    pub offset: Option<i64>,
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateInvoiceParams {
    #[schemars(description = "UUID of the invoice")]
    pub invoice_id: String,
    #[schemars(description = "Total amount in cents")]
    pub total_amount: Option<i64>,
    #[schemars(description = "Due date (ISO 8601 or relative like \"next week\")")]
    pub due_date: Option<String>,
    #[schemars(description = "Invoice notes")]
    pub notes: Option<String>,
}

#[derive(Debug, Default, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ListPaymentsParams {
    #[schemars(description = "Filter by invoice (optional)")]
    pub invoice_id: Option<String>,
    #[schemars(description = "Maximum number of results (default: 50)")]
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreatePaymentParams {
    #[schemars(description = "UUID of the invoice")]
    pub invoice_id: String,
    #[schemars(description = "Payment amount in dollars")]
    pub amount: f64,
    #[schemars(description = "Payment method (e.g., cash, check, card)")]
    pub method: Option<String>,
}

pub fn register(catalog: &mut Catalog) {
    catalog.store(
        "create_invoice",
        "Create an invoice for a job. Use this when user says \"Create invoice for job 123\"",
        billing::create_invoice,
    );
    catalog.store(
        "send_invoice",
        "Send an invoice to the customer. Use this when user says \"Send invoice\"",
        billing::send_invoice,
    );
    catalog.store("list_invoices", "List invoices", billing::list_invoices);
    catalog.store("get_invoice", "Get invoice details", billing::get_invoice);
    catalog.store("update_invoice", "Update invoice details", billing::update_invoice);
    catalog.store(
        "mark_invoice_paid",
        "Mark an invoice as paid. Use this when user says \"Mark invoice as paid\"",
        billing::mark_invoice_paid,
    );
    catalog.store("list_payments", "List payments received", billing::list_payments);
    catalog.store(
        "create_payment",
        "Record a payment against an invoice. Use this when user says \"Record a $200 payment\"",
        billing::create_payment,
    );
}
