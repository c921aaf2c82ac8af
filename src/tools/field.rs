//! Field operation tools used by technicians on site.

use schemars::JsonSchema;
use serde::Deserialize;

use super::jobs::JobStatus;
use super::Catalog;
use crate::crm::field;

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct UploadPhotoParams {
    #[schemars(description = "UUID of the job or \"last\" or \"current\" for context")]
    pub job_id: String,
    #[schemars(description = "URL of the photo (if already uploaded)")]
    pub photo_url: Option<String>,
    #[schemars(description = "Base64 encoded photo data")]
    pub photo_data: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct UploadJobPhotoParams {
    #[schemars(description = "UUID of the job or \"last\" or \"current\" for context")]
    pub job_id: String,
    #[schemars(description = "URL of the photo (if already uploaded)")]
    pub photo_url: Option<String>,
    #[schemars(description = "Base64 encoded photo data")]
    pub base64_data: Option<String>,
    #[schemars(description = "Photo caption (optional)")]
    pub caption: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ListJobPhotosParams {
    #[schemars(description = "UUID of the job or \"last\" or \"current\" for context")]
    pub job_id: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CaptureLocationParams {
    #[schemars(description = "UUID of the job or \"last\" or \"current\" for context")]
    pub job_id: String,
    #[schemars(description = "Latitude")]
    pub lat: f64,
    #[schemars(description = "Longitude")]
    pub lng: f64,
}

#[derive(Debug, Default, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ClockInParams {
    #[schemars(description = "UUID of the job (optional)")]
    pub job_id: Option<String>,
    #[schemars(description = "Notes (optional)")]
    pub notes: Option<String>,
}

#[derive(Debug, Default, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ClockOutParams {
    #[schemars(description = "UUID of the time entry (optional, uses the open entry if not provided)")]
    pub time_entry_id: Option<String>,
    #[schemars(description = "Notes (optional)")]
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AddJobNoteParams {
    #[schemars(description = "UUID of the job or \"last\" or \"current\" for context")]
    pub job_id: Option<String>,
    #[schemars(description = "UUID of the contact")]
    pub contact_id: Option<String>,
    #[schemars(description = "UUID of the conversation")]
    pub conversation_id: Option<String>,
    #[schemars(description = "Note content")]
    pub content: String,
}

#[derive(Debug, Default, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct GetMyJobsParams {
    #[schemars(description = "Filter by status")]
    pub status: Option<JobStatus>,
    #[schemars(description = "Filter by date (ISO 8601 or relative like \"today\")")]
    pub date: Option<String>,
}

pub fn register(catalog: &mut Catalog) {
    catalog.store(
        "upload_photo",
        "Upload a photo for a job. Use this when tech says \"Take a photo\" or \"Upload photo\"",
        field::upload_photo,
    );
    catalog.store(
        "upload_job_photo",
        "Upload a photo to a job with an optional caption",
        field::upload_job_photo,
    );
    catalog.store("list_job_photos", "List photos attached to a job", field::list_job_photos);
    catalog.store(
        "capture_location",
        "Capture GPS location for a job. Use this when tech arrives on site",
        field::capture_location,
    );
    catalog.store(
        "clock_in",
        "Clock in for time tracking. Use this when tech says \"Clock in\" or \"Start work\"",
        field::clock_in,
    );
    catalog.store(
        "clock_out",
        "Clock out from time tracking. Use this when tech says \"Clock out\" or \"Done for the day\"",
        field::clock_out,
    );
    catalog.store(
        "add_job_note",
        "Add a note to a job, contact, or conversation. Use this when user says \"Add note: ...\"",
        field::add_job_note,
    );
    catalog.store(
        "get_my_jobs",
        "Get jobs assigned to the current user. Use this when tech asks \"What are my jobs?\"",
        field::get_my_jobs,
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::registry::input_schema;

    #[test]
    fn note_content_is_the_only_required_field() {
        let schema = input_schema::<AddJobNoteParams>();
        assert_eq!(schema["required"], serde_json::json!(["content"]));
    }
}
