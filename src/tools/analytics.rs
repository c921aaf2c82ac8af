//! Analytics, reports, and data exports.

use schemars::JsonSchema;
use serde::Deserialize;

use super::jobs::JobStatus;
use super::{Catalog, NoParams};
use crate::crm::analytics;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum AnalyticsType {
    Jobs,
    Contacts,
    Revenue,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Period {
    Today,
    Week,
    Month,
    Year,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum RevenueGrouping {
    Date,
    Tech,
    Status,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum DatasetType {
    Contacts,
    Jobs,
    Invoices,
}

impl DatasetType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Contacts => "contacts",
            Self::Jobs => "jobs",
            Self::Invoices => "invoices",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    #[default]
    Csv,
    Json,
}

impl ExportFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::Json => "json",
        }
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct GetAnalyticsParams {
    #[schemars(description = "Type of analytics")]
    #[serde(rename = "type")]
    pub kind: AnalyticsType,
    #[schemars(description = "Time period (default: month)")]
    pub period: Option<Period>,
}

#[derive(Debug, Default, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct JobAnalyticsParams {
    #[schemars(description = "Start date (ISO 8601 or relative)")]
    pub date_from: Option<String>,
    #[schemars(description = "End date (ISO 8601 or relative)")]
    pub date_to: Option<String>,
    #[schemars(description = "Filter by status")]
    pub status: Option<JobStatus>,
}

#[derive(Debug, Default, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RevenueAnalyticsParams {
    #[schemars(description = "Start date (ISO 8601 or relative)")]
    pub date_from: Option<String>,
    #[schemars(description = "End date (ISO 8601 or relative)")]
    pub date_to: Option<String>,
    #[schemars(description = "Group revenue by date, technician, or invoice status")]
    pub group_by: Option<RevenueGrouping>,
}

#[derive(Debug, Default, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DateRangeParams {
    #[schemars(description = "Start date (ISO 8601 or relative)")]
    pub date_from: Option<String>,
    #[schemars(description = "End date (ISO 8601 or relative)")]
    pub date_to: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct GenerateReportParams {
    #[schemars(description = "Report type")]
    #[serde(rename = "type")]
    pub kind: DatasetType,
    #[schemars(description = "Start date (ISO 8601 or relative)")]
    pub date_from: Option<String>,
    #[schemars(description = "End date (ISO 8601 or relative)")]
    pub date_to: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ExportDataParams {
    #[schemars(description = "Type of data to export")]
    #[serde(rename = "type")]
    pub kind: DatasetType,
    #[schemars(description = "Export format (default: csv)")]
    pub format: Option<ExportFormat>,
}

#[derive(Debug, Default, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ExportContactsParams {
    #[schemars(description = "Export format (default: csv)")]
    pub format: Option<ExportFormat>,
}

#[derive(Debug, Default, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ExportJobsParams {
    #[schemars(description = "Export format (default: csv)")]
    pub format: Option<ExportFormat>,
    #[schemars(description = "Start date (ISO 8601 or relative)")]
    pub date_from: Option<String>,
    #[schemars(description = "End date (ISO 8601 or relative)")]
    pub date_to: Option<String>,
}

pub fn register(catalog: &mut Catalog) {
    catalog.store(
        "get_analytics",
        "Get analytics for jobs, contacts, or revenue. Use this when user asks \"How many jobs did we do this month?\"",
        analytics::get_analytics,
    );
    catalog.store::<NoParams>(
        "get_dashboard_stats",
        "Get dashboard statistics. Use this when user asks \"How are we doing?\" or \"Give me an overview\"",
        analytics::get_dashboard_stats,
    );
    catalog.store("get_job_analytics", "Get job analytics for a date range", analytics::get_job_analytics);
    catalog.store(
        "get_revenue_analytics",
        "Get revenue analytics for a date range, optionally grouped",
        analytics::get_revenue_analytics,
    );
    catalog.store(
        "get_contact_analytics",
        "Get contact growth analytics for a date range",
        analytics::get_contact_analytics,
    );
    catalog.store(
        "generate_report",
        "Generate a summary report for jobs, contacts, or invoices",
        analytics::generate_report,
    );
    catalog.store(
        "export_data",
        "Export data to CSV or JSON. Use this when user says \"Export my contacts\"",
        analytics::export_data,
    );
    catalog.store("export_contacts", "Export contacts to CSV or JSON", analytics::export_contacts);
    catalog.store("export_jobs", "Export jobs to CSV or JSON", analytics::export_jobs);
}
