//! Contact tools.

use schemars::JsonSchema;
use serde::Deserialize;

use super::Catalog;
use crate::crm::contacts;

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SearchContactsParams {
    #[schemars(description = "Search query (name, email, or phone)")]
    pub search: String,
}

#[derive(Debug, Default, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ListContactsParams {
    #[schemars(description = "Optional search term to filter by name, email, or phone")]
    pub search: Option<String>,
    #[schemars(description = "Maximum number of results (default: 50)")]
    pub limit: Option<i64>,
    #[schemars(description = "Offset for pagination (default: 0)")]
    pub offset: Option<i64>,
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateContactParams {
    #[schemars(description = "Email address")]
    pub email: String,
    #[schemars(description = "First name")]
    pub first_name: String,
    #[schemars(description = "Last name (optional)")]
    pub last_name: Option<String>,
    #[schemars(description = "Phone number (optional)")]
    pub phone: Option<String>,
    #[schemars(description = "Address (optional)")]
    pub address: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateContactParams {
    #[schemars(description = "UUID of the contact or \"last\" or \"current\" for context")]
    pub contact_id: String,
    #[schemars(description = "New email address")]
    pub email: Option<String>,
    #[schemars(description = "New first name")]
    pub first_name: Option<String>,
    #[schemars(description = "New last name")]
    pub last_name: Option<String>,
    #[schemars(description = "New phone number")]
    pub phone: Option<String>,
    #[schemars(description = "New address")]
    pub address: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ContactIdParams {
    #[schemars(description = "UUID or name of the contact, or \"last\" or \"current\" for context")]
    pub contact_id: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AddContactNoteParams {
    #[schemars(description = "UUID or name of the contact, or \"last\" or \"current\" for context")]
    pub contact_id: String,
    #[schemars(description = "Note content")]
    pub content: String,
}

pub fn register(catalog: &mut Catalog) {
    catalog.store(
        "search_contacts",
        "Search for contacts by name, email, or phone number",
        contacts::search_contacts,
    );
    catalog.store(
        "list_contacts",
        "List all contacts with optional search filter. Use this when user asks \"Show me contacts\" or \"List customers\"",
        contacts::list_contacts,
    );
    catalog.store(
        "create_contact",
        "Create a new contact/customer. Use this when user wants to add a new customer",
        contacts::create_contact,
    );
    catalog.store(
        "update_contact",
        "Update contact information. Use this when user wants to modify customer details",
        contacts::update_contact,
    );
    catalog.store("get_contact", "Get details of a specific contact", contacts::get_contact);
    catalog.store(
        "delete_contact",
        "Delete a contact. Use this when user says \"Delete contact John Smith\"",
        contacts::delete_contact,
    );
    catalog.store(
        "add_contact_note",
        "Add a note to a contact. Use this when user says \"Add note to contact John Smith\"",
        contacts::add_contact_note,
    );
}
