//! Marketing tools: campaigns, email templates, outgoing email, tags, and automation.

use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::Value;

use super::Catalog;
use crate::crm::marketing;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum CampaignStatus {
    Draft,
    Sent,
}

impl CampaignStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Sent => "sent",
        }
    }
}

#[derive(Debug, Default, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ListCampaignsParams {
    #[schemars(description = "Filter by status")]
    pub status: Option<CampaignStatus>,
    #[schemars(description = "Maximum number of results (default: 50)")]
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CampaignIdParams {
    #[schemars(description = "UUID of the campaign")]
    pub campaign_id: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateCampaignParams {
    #[schemars(description = "Campaign name")]
    pub name: String,
    #[schemars(description = "Email subject")]
    pub subject: String,
    #[schemars(description = "Email body")]
    pub body: String,
    #[schemars(description = "Email template to base the campaign on (optional)")]
    pub template_id: Option<String>,
}

#[derive(Debug, Default, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ListEmailTemplatesParams {
    #[schemars(description = "Filter by template type")]
    #[serde(rename = "type")]
    pub kind: Option<String>,
    #[schemars(description = "Maximum number of results (default: 50)")]
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateEmailTemplateParams {
    #[schemars(description = "Template name")]
    pub name: String,
    #[schemars(description = "Template type (e.g., review_request, invoice, follow_up)")]
    #[serde(rename = "type")]
    pub kind: String,
    #[schemars(description = "Email subject")]
    pub subject: String,
    #[schemars(description = "Email body")]
    pub body: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SendEmailParams {
    #[schemars(description = "Recipient email address")]
    pub to: String,
    #[schemars(description = "Email subject")]
    pub subject: String,
    #[schemars(description = "Email body")]
    pub body: String,
    #[schemars(description = "Related job (optional)")]
    pub job_id: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReviewRequestParams {
    #[schemars(description = "UUID of the job or \"last\" or \"current\" for context")]
    pub job_id: String,
    #[schemars(description = "Contact to ask (optional, defaults to the job's contact)")]
    pub contact_id: Option<String>,
}

#[derive(Debug, Default, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ListTagsParams {
    #[schemars(description = "Maximum number of results (default: 50)")]
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateTagParams {
    #[schemars(description = "Tag name")]
    pub name: String,
    #[schemars(description = "Tag color (optional, e.g. #ff0000)")]
    pub color: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AssignTagParams {
    #[schemars(description = "UUID or name of the contact, or \"last\" or \"current\" for context")]
    pub contact_id: String,
    #[schemars(description = "UUID or name of the tag")]
    pub tag_id: String,
}

#[derive(Debug, Default, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ListAutomationRulesParams {
    #[schemars(description = "Filter by active flag")]
    pub active: Option<bool>,
    #[schemars(description = "Maximum number of results (default: 50)")]
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateAutomationRuleParams {
    #[schemars(description = "Rule name")]
    pub name: String,
    #[schemars(description = "Trigger event (e.g., unreplied_time, job_completed)")]
    pub trigger: String,
    #[schemars(description = "Trigger settings, e.g. {\"minutes\": 30} for unreplied_time")]
    pub trigger_config: Option<Value>,
    #[schemars(description = "Action to run (e.g., create_draft, send_review_request)")]
    pub action: String,
    #[schemars(description = "Whether the rule is active (default: true)")]
    pub active: Option<bool>,
}

pub fn register(catalog: &mut Catalog) {
    catalog.store("list_campaigns", "List email campaigns", marketing::list_campaigns);
    catalog.store("get_campaign", "Get campaign details", marketing::get_campaign);
    catalog.store(
        "create_campaign",
        "Create an email marketing campaign. Use this when user says \"Create a campaign\"",
        marketing::create_campaign,
    );
    catalog.store(
        "send_campaign",
        "Send a campaign to every contact with an email address",
        marketing::send_campaign,
    );
    catalog.store("list_email_templates", "List email templates", marketing::list_email_templates);
    catalog.store("create_email_template", "Create an email template", marketing::create_email_template);
    catalog.store(
        "send_email",
        "Send an email. Use this when user says \"Email John about ...\"",
        marketing::send_email,
    );
    catalog.store(
        "send_review_request",
        "Send a review request to the customer of a job. Use this when user says \"Ask for a review\"",
        marketing::send_review_request,
    );
    catalog.store("list_contact_tags", "List contact tags", marketing::list_contact_tags);
    catalog.store("create_contact_tag", "Create a contact tag", marketing::create_contact_tag);
    catalog.store(
        "assign_tag_to_contact",
        "Assign a tag to a contact. Use this when user says \"Tag John as VIP\"",
        marketing::assign_tag_to_contact,
    );
    catalog.store(
        "list_automation_rules",
        "List automation rules",
        marketing::list_automation_rules,
    );
    catalog.store(
        "create_automation_rule",
        "Create an automation rule. Use this when user says \"When a job completes, send a review request\"",
        marketing::create_automation_rule,
    );
}
