//! Inbox tools: conversations, messages, and reply drafts.

use schemars::JsonSchema;
use serde::Deserialize;

use super::Catalog;
use crate::crm::conversations;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum ConversationStatus {
    Open,
    Closed,
    Snoozed,
}

impl ConversationStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Closed => "closed",
            Self::Snoozed => "snoozed",
        }
    }
}

#[derive(Debug, Default, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ListConversationsParams {
    #[schemars(description = "Filter by contact (UUID or name)")]
    pub contact_id: Option<String>,
    #[schemars(description = "Filter by status")]
    pub status: Option<ConversationStatus>,
    #[schemars(description = "Maximum number of results (default: 100)")]
    pub limit: Option<i64>,
    #[schemars(description = "Offset for pagination (default: 0)")]
    pub offset: Option<i64>,
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct GetConversationParams {
    #[schemars(description = "UUID of the conversation, a contact name, or \"last\" or \"current\" for context")]
    pub conversation_id: String,
    #[schemars(description = "Maximum number of messages to return (default: 50)")]
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateConversationParams {
    #[schemars(description = "UUID or name of the contact")]
    pub contact_id: String,
    #[schemars(description = "Conversation subject (optional)")]
    pub subject: Option<String>,
    #[schemars(description = "Channel (default: email)")]
    pub channel: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateConversationStatusParams {
    #[schemars(description = "UUID of the conversation or \"last\" or \"current\" for context")]
    pub conversation_id: String,
    #[schemars(description = "New status")]
    pub status: ConversationStatus,
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageParams {
    #[schemars(description = "UUID of the conversation or \"last\" or \"current\" for context")]
    pub conversation_id: String,
    #[schemars(description = "Message body")]
    pub body: String,
    #[schemars(description = "Subject line (optional)")]
    pub subject: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AddConversationNoteParams {
    #[schemars(description = "UUID of the conversation or \"last\" or \"current\" for context")]
    pub conversation_id: String,
    #[schemars(description = "Note content")]
    pub content: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct GenerateDraftParams {
    #[schemars(description = "UUID of the conversation or \"last\" or \"current\" for context")]
    pub conversation_id: String,
}

pub fn register(catalog: &mut Catalog) {
    catalog.store(
        "list_conversations",
        "List conversations in the inbox. Use this when user asks \"Show me my messages\" or \"What conversations do I have?\"",
        conversations::list_conversations,
    );
    catalog.store(
        "get_conversation",
        "Get a conversation with its messages. Use this when user says \"Show me the conversation with John\"",
        conversations::get_conversation,
    );
    catalog.store(
        "create_conversation",
        "Start a new conversation with a contact",
        conversations::create_conversation,
    );
    catalog.store(
        "update_conversation_status",
        "Update conversation status. Use this when user says \"Close this conversation\"",
        conversations::update_conversation_status,
    );
    catalog.store(
        "send_message",
        "Send a message in a conversation. Use this when user says \"Reply to John saying ...\"",
        conversations::send_message,
    );
    catalog.store(
        "add_conversation_note",
        "Add an internal note to a conversation",
        conversations::add_conversation_note,
    );
    catalog.model(
        "generate_draft",
        "Generate an AI draft reply for a conversation. Use this when user says \"Draft a reply to John\"",
        conversations::generate_draft,
    );
}
