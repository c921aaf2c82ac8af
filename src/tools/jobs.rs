//! Job tools: create, read, update, assign, list, and bulk changes.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::Catalog;
use crate::crm::jobs;

/// Lifecycle of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Lead,
    Scheduled,
    #[serde(alias = "en-route")]
    EnRoute,
    #[serde(alias = "in-progress")]
    InProgress,
    Completed,
    Invoiced,
    Paid,
}

impl JobStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Lead => "lead",
            Self::Scheduled => "scheduled",
            Self::EnRoute => "en_route",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Invoiced => "invoiced",
            Self::Paid => "paid",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateJobParams {
    #[schemars(description = "Name of the customer/contact (e.g., \"John Smith\")")]
    pub contact_name: String,
    #[schemars(description = "Description of the work to be done")]
    pub description: String,
    #[schemars(description = "UUID of the contact, used instead of the name when known (optional)")]
    pub contact_id: Option<String>,
    #[schemars(description = "ISO 8601 datetime for scheduled start (optional)")]
    pub scheduled_start: Option<String>,
    #[schemars(description = "ISO 8601 datetime for scheduled end (optional)")]
    pub scheduled_end: Option<String>,
    #[schemars(description = "UUID or name of assigned technician (optional)")]
    pub tech_assigned_id: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct JobIdParams {
    #[schemars(description = "UUID of the job or \"last\" or \"current\" for context")]
    pub job_id: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateJobStatusParams {
    #[schemars(description = "UUID of the job or \"last\" or \"current\" for context")]
    pub job_id: String,
    #[schemars(description = "New status for the job")]
    pub status: JobStatus,
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AssignTechParams {
    #[schemars(description = "UUID of the job or \"last\" or \"current\" for context")]
    pub job_id: String,
    #[schemars(description = "UUID of the technician user")]
    pub tech_assigned_id: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AssignTechByNameParams {
    #[schemars(description = "UUID of the job or \"last\" or \"current\" for context")]
    pub job_id: String,
    #[schemars(description = "Name of the technician to assign")]
    pub tech_name: String,
}

#[derive(Debug, Default, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ListJobsParams {
    #[schemars(description = "Filter by status")]
    pub status: Option<JobStatus>,
    #[schemars(description = "Filter by assigned technician ID")]
    pub tech_id: Option<String>,
    #[schemars(description = "Filter by contact ID")]
    pub contact_id: Option<String>,
    #[schemars(description = "Filter by date (ISO 8601 date string or relative like \"today\", \"tomorrow\")")]
    pub date: Option<String>,
    #[schemars(description = "Maximum number of results (default: 50)")]
    pub limit: Option<i64>,
    #[schemars(description = "Offset for pagination (default: 0)")]
    pub offset: Option<i64>,
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SearchJobsParams {
    #[schemars(description = "Date filter (ISO 8601 or relative like \"today\", \"tomorrow\", \"next week\")")]
    pub date: Option<String>,
    #[schemars(description = "Filter by status")]
    pub status: Option<JobStatus>,
    #[schemars(description = "Filter by contact name")]
    pub contact_name: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct FilterJobsParams {
    #[schemars(description = "Filter by status")]
    pub status: Option<JobStatus>,
    #[schemars(description = "Filter by technician ID")]
    pub tech_id: Option<String>,
    #[schemars(description = "Filter by contact ID")]
    pub contact_id: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateJobParams {
    #[schemars(description = "UUID of the job or \"last\" or \"current\" for context")]
    pub job_id: String,
    #[schemars(description = "New description")]
    pub description: Option<String>,
    #[schemars(description = "New scheduled start time (ISO 8601)")]
    pub scheduled_start: Option<String>,
    #[schemars(description = "New scheduled end time (ISO 8601)")]
    pub scheduled_end: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum BulkAction {
    Assign,
    Status,
}

#[derive(Debug, Default, Deserialize, JsonSchema)]
pub struct BulkJobFilter {
    pub status: Option<JobStatus>,
    pub date: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct BulkOperationsParams {
    #[schemars(description = "Action to perform")]
    pub action: BulkAction,
    #[schemars(description = "Array of job IDs")]
    #[serde(default)]
    pub job_ids: Vec<String>,
    #[schemars(description = "New status (required if action is status)")]
    pub status: Option<JobStatus>,
    #[schemars(description = "Technician ID or name (required if action is assign)")]
    pub tech_id: Option<String>,
    #[schemars(description = "Filter criteria instead of jobIds (e.g., {status: \"scheduled\", date: \"today\"})")]
    pub filter: Option<BulkJobFilter>,
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TechJobsParams {
    #[schemars(description = "UUID of the technician (optional, uses current user if not provided)")]
    pub tech_id: Option<String>,
    #[schemars(description = "Filter by status")]
    pub status: Option<JobStatus>,
    #[schemars(description = "Filter by date (ISO 8601)")]
    pub date: Option<String>,
    #[schemars(description = "Maximum number of results (default: 50)")]
    pub limit: Option<i64>,
}

pub fn register(catalog: &mut Catalog) {
    catalog.store(
        "create_job",
        "Create a new job/work order. Use this when the user wants to create a job. You will need to collect: contact name, description, and optionally scheduled time and technician.",
        jobs::create_job,
    );
    catalog.store("get_job", "Get details of a specific job by ID", jobs::get_job);
    catalog.store("update_job_status", "Update the status of a job", jobs::update_job_status);
    catalog.store("assign_tech", "Assign a technician to a job", jobs::assign_tech);
    catalog.store(
        "list_jobs",
        "List jobs with optional filters. Use this when user asks \"What jobs do I have today?\" or \"Show me jobs\"",
        jobs::list_jobs,
    );
    catalog.store(
        "assign_tech_by_name",
        "Assign a technician to a job by technician name. Use this when user says \"Assign Mike to job 123\"",
        jobs::assign_tech_by_name,
    );
    catalog.store(
        "bulk_operations",
        "Perform bulk operations on jobs. Use this when user says \"Mark all today's jobs as completed\"",
        jobs::bulk_operations,
    );
    catalog.store(
        "search_jobs",
        "Search jobs by date or other criteria. Use this when user says \"Find jobs scheduled for tomorrow\"",
        jobs::search_jobs,
    );
    catalog.store(
        "filter_jobs",
        "Filter jobs by status or other criteria. Use this when user says \"Show me all in-progress jobs\"",
        jobs::filter_jobs,
    );
    catalog.store(
        "update_job",
        "Update job details. Use this when user wants to modify job information",
        jobs::update_job,
    );
    catalog.store("delete_job", "Delete a job. Use this when user says \"Delete job 123\"", jobs::delete_job);
    catalog.store("get_tech_jobs", "Get jobs assigned to a technician", jobs::get_tech_jobs);
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn status_accepts_hyphenated_aliases() {
        let s: JobStatus = serde_json::from_value(json!("in-progress")).unwrap();
        assert_eq!(s, JobStatus::InProgress);
        assert_eq!(s.to_string(), "in_progress");
    }

    #[test]
    fn status_schema_lists_every_state() {
        let schema = super::super::registry::input_schema::<UpdateJobStatusParams>();
        let states = schema["properties"]["status"]["enum"].as_array().unwrap();
        assert_eq!(states.len(), 7);
    }
}
