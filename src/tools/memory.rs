//! Voice agent conversation memory tools.

use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::Value;

use super::Catalog;
use crate::crm::memory;

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReadAgentMemoryParams {
    #[schemars(description = "Unique identifier of the user (phone number, email, or user ID)")]
    pub user_identifier: String,
}

/// JSON-valued fields arrive as JSON text from most voice clients; objects are
/// accepted too.
#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateAgentMemoryParams {
    #[schemars(description = "Unique identifier of the user (phone number, email, or user ID)")]
    pub user_identifier: String,
    #[schemars(description = "Summary of the conversation so far")]
    pub summary: String,
    #[schemars(description = "Current intent (e.g., creating_job, in_progress, completed)")]
    pub intent: Option<String>,
    #[schemars(with = "Option<String>", description = "JSON string of partially collected data")]
    pub staging_data: Option<Value>,
    #[schemars(with = "Option<String>", description = "JSON string array of new conversation turns")]
    pub conversation_history: Option<Value>,
    #[schemars(with = "Option<String>", description = "JSON string object of learned user preferences")]
    pub user_preferences: Option<Value>,
    #[schemars(with = "Option<String>", description = "JSON string object of the current context (page, selected entities)")]
    pub current_context: Option<Value>,
}

pub fn register(catalog: &mut Catalog) {
    catalog.store(
        "read_agent_memory",
        "Read the saved conversation state for a user. Call this at the start of every conversation to resume where the user left off.",
        memory::read_agent_memory,
    );
    catalog.store(
        "update_agent_memory",
        "Save the conversation state for a user so it can be resumed later. Call this after each meaningful step.",
        memory::update_agent_memory,
    );
}
