//! Users, notifications, call logs, navigation, and account administration.

use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::{Map, Value};

use super::{Catalog, NoParams};
use crate::crm::people;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    Owner,
    Admin,
    Dispatcher,
    Tech,
    Sales,
}

impl UserRole {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Owner => "owner",
            Self::Admin => "admin",
            Self::Dispatcher => "dispatcher",
            Self::Tech => "tech",
            Self::Sales => "sales",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum CallDirection {
    Inbound,
    Outbound,
}

impl CallDirection {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Inbound => "inbound",
            Self::Outbound => "outbound",
        }
    }
}

/// Pages of the CRM web app that `navigate` can open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, JsonSchema)]
#[serde(rename_all = "kebab-case")]
pub enum Page {
    Inbox,
    Jobs,
    Contacts,
    Analytics,
    Finance,
    Tech,
    Campaigns,
    EmailTemplates,
    Tags,
    Settings,
    Integrations,
    Dashboard,
}

impl Page {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Inbox => "inbox",
            Self::Jobs => "jobs",
            Self::Contacts => "contacts",
            Self::Analytics => "analytics",
            Self::Finance => "finance",
            Self::Tech => "tech",
            Self::Campaigns => "campaigns",
            Self::EmailTemplates => "email-templates",
            Self::Tags => "tags",
            Self::Settings => "settings",
            Self::Integrations => "integrations",
            Self::Dashboard => "dashboard",
        }
    }

    /// App route for the page.
    pub fn route(self) -> &'static str {
        match self {
            Self::Inbox => "/inbox",
            Self::Jobs | Self::Dashboard => "/jobs",
            Self::Contacts => "/contacts",
            Self::Analytics => "/analytics",
            Self::Finance => "/finance/dashboard",
            Self::Tech => "/tech/dashboard",
            Self::Campaigns => "/marketing/campaigns",
            Self::EmailTemplates => "/marketing/email-templates",
            Self::Tags => "/marketing/tags",
            Self::Settings => "/admin/settings",
            Self::Integrations => "/settings/integrations",
        }
    }
}

#[derive(Debug, Default, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ListUsersParams {
    #[schemars(description = "Filter by role")]
    pub role: Option<UserRole>,
    #[schemars(description = "Maximum number of results (default: 50)")]
    pub limit: Option<i64>,
    #[schemars(description = "Offset for pagination (default: 0)")]
    pub offset: Option<i64>,
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct GetUserParams {
    #[schemars(description = "UUID of the user")]
    pub user_id: String,
}

#[derive(Debug, Default, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ListNotificationsParams {
    #[schemars(description = "Only return unread notifications")]
    pub unread_only: Option<bool>,
    #[schemars(description = "Maximum number of results (default: 50)")]
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateNotificationParams {
    #[schemars(description = "UUID of the user to notify")]
    pub user_id: String,
    #[schemars(description = "Notification type (e.g., job_assigned, message_received)")]
    #[serde(rename = "type")]
    pub kind: String,
    #[schemars(description = "Notification title")]
    pub title: String,
    #[schemars(description = "Notification message")]
    pub message: String,
    #[schemars(description = "Link to open (optional)")]
    pub link: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct MarkNotificationReadParams {
    #[schemars(description = "UUID of the notification")]
    pub notification_id: String,
}

#[derive(Debug, Default, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ListCallLogsParams {
    #[schemars(description = "Filter by contact (UUID or name)")]
    pub contact_id: Option<String>,
    #[schemars(description = "Maximum number of results (default: 50)")]
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateCallLogParams {
    #[schemars(description = "UUID or name of the contact, or \"last\" or \"current\" for context")]
    pub contact_id: String,
    #[schemars(description = "Call direction")]
    pub direction: CallDirection,
    #[schemars(description = "Call duration in seconds (optional)")]
    pub duration: Option<i64>,
    #[schemars(description = "Call notes (optional)")]
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct NavigateParams {
    #[schemars(description = "Page to navigate to")]
    pub page: Page,
    #[schemars(description = "Job to open on the jobs page (optional)")]
    pub job_id: Option<String>,
    #[schemars(description = "Contact to open on the contacts page (optional)")]
    pub contact_id: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateAccountSettingsParams {
    #[schemars(description = "Settings to merge into the account settings")]
    pub settings: Map<String, Value>,
}

#[derive(Debug, Default, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AuditLogParams {
    #[schemars(description = "Filter by action (e.g., create, update, delete)")]
    pub action: Option<String>,
    #[schemars(description = "Filter by user")]
    pub user_id: Option<String>,
    #[schemars(description = "Start date (ISO 8601 or relative)")]
    pub date_from: Option<String>,
    #[schemars(description = "End date (ISO 8601 or relative)")]
    pub date_to: Option<String>,
    #[schemars(description = "Maximum number of results (default: 50)")]
    pub limit: Option<i64>,
}

pub fn register(catalog: &mut Catalog) {
    catalog.store("list_users", "List users in the account, optionally by role", people::list_users);
    catalog.store("get_user", "Get details of a user", people::get_user);
    catalog.store::<NoParams>(
        "get_user_email",
        "Get the email address of the current user",
        people::get_user_email,
    );
    catalog.store::<NoParams>(
        "get_current_user",
        "Get the current user's profile",
        people::get_current_user,
    );
    catalog.store(
        "list_notifications",
        "List notifications. Use this when user asks \"Do I have any notifications?\"",
        people::list_notifications,
    );
    catalog.store("create_notification", "Create a notification for a user", people::create_notification);
    catalog.store(
        "mark_notification_read",
        "Mark a notification as read",
        people::mark_notification_read,
    );
    catalog.store("list_call_logs", "List call logs", people::list_call_logs);
    catalog.store(
        "create_call_log",
        "Log a phone call with a contact. Use this when user says \"Log a call with John\"",
        people::create_call_log,
    );
    catalog.store(
        "navigate",
        "Navigate the CRM app to a page. Use this when user says \"Go to inbox\" or \"Open the jobs page\"",
        people::navigate,
    );
    catalog.store::<NoParams>(
        "get_account_settings",
        "Get the account settings",
        people::get_account_settings,
    );
    catalog.store(
        "update_account_settings",
        "Update account settings",
        people::update_account_settings,
    );
    catalog.store("get_audit_logs", "Get audit log entries", people::get_audit_logs);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_names_are_kebab_case() {
        let page: Page = serde_json::from_value(serde_json::json!("email-templates")).unwrap();
        assert_eq!(page, Page::EmailTemplates);
        assert_eq!(page.route(), "/marketing/email-templates");
        assert_eq!(Page::Dashboard.route(), "/jobs");
    }
}
