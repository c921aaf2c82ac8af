//! Read-only MCP resources. Each one is a snapshot of a tool call, so resources and
//! tools never disagree about what a record looks like.

use rmcp::model::{
    AnnotateAble, ListResourceTemplatesResult, ListResourcesResult, RawResource, RawResourceTemplate,
    ReadResourceResult, ResourceContents,
};
use rmcp::ErrorData;
use serde_json::{json, Value};

use crate::tools::{CallerContext, Dispatcher, ToolCallRequest};

pub const CATALOG_URI: &str = "crm://catalog";
pub const MEMORY_PREFIX: &str = "crm://memory/";
const JSON_MIME: &str = "application/json";

struct StaticResource {
    uri: &'static str,
    name: &'static str,
    description: &'static str,
}

const RESOURCES: &[StaticResource] = &[
    StaticResource {
        uri: CATALOG_URI,
        name: "Tool catalog",
        description: "Every callable tool with its argument schema",
    },
    StaticResource {
        uri: "crm://dashboard",
        name: "Dashboard",
        description: "Job, revenue, and contact totals for the account",
    },
    StaticResource {
        uri: "crm://jobs/today",
        name: "Today's jobs",
        description: "Jobs scheduled for today",
    },
    StaticResource {
        uri: "crm://notifications/unread",
        name: "Unread notifications",
        description: "Unread notifications for the calling user",
    },
];

#[derive(Debug, thiserror::Error)]
pub enum ResourceError {
    #[error("unknown resource: {0}")]
    Unknown(String),
    #[error("{0}")]
    Failed(String),
}

impl From<ResourceError> for ErrorData {
    fn from(e: ResourceError) -> Self {
        match e {
            ResourceError::Unknown(_) => ErrorData::resource_not_found(e.to_string(), None),
            ResourceError::Failed(_) => ErrorData::internal_error(e.to_string(), None),
        }
    }
}

pub fn list() -> ListResourcesResult {
    let resources = RESOURCES
        .iter()
        .map(|r| {
            RawResource {
                description: Some(r.description.to_string()),
                mime_type: Some(JSON_MIME.to_string()),
                ..RawResource::new(r.uri, r.name)
            }
            .no_annotation()
        })
        .collect();
    ListResourcesResult::with_all_items(resources)
}

pub fn templates() -> ListResourceTemplatesResult {
    let memory = RawResourceTemplate {
        uri_template: format!("{MEMORY_PREFIX}{{userIdentifier}}"),
        name: "Agent memory".to_string(),
        title: None,
        description: Some("Saved voice conversation state for a user".to_string()),
        mime_type: Some(JSON_MIME.to_string()),
        icons: None,
    };
    ListResourceTemplatesResult::with_all_items(vec![memory.no_annotation()])
}

/// The tool call behind a resource URI.
fn backing_call(uri: &str) -> Option<(&'static str, Value)> {
    match uri {
        "crm://dashboard" => Some(("get_dashboard_stats", json!({}))),
        "crm://jobs/today" => Some(("list_jobs", json!({"date": "today"}))),
        "crm://notifications/unread" => Some(("list_notifications", json!({"unreadOnly": true}))),
        _ => {
            let user = uri.strip_prefix(MEMORY_PREFIX).filter(|u| !u.is_empty())?;
            Some(("read_agent_memory", json!({"userIdentifier": user})))
        }
    }
}

pub async fn read(
    dispatcher: &Dispatcher,
    uri: &str,
    context: CallerContext,
) -> Result<ReadResourceResult, ResourceError> {
    let payload = if uri == CATALOG_URI {
        let tools: Vec<_> = dispatcher.catalog().definitions().collect();
        serde_json::to_value(tools).map_err(|e| ResourceError::Failed(e.to_string()))?
    } else {
        let (tool_name, arguments) = backing_call(uri).ok_or_else(|| ResourceError::Unknown(uri.to_string()))?;
        dispatcher
            .call(ToolCallRequest {
                tool_name: tool_name.to_string(),
                arguments,
                context,
            })
            .await
            .map_err(|e| ResourceError::Failed(e.to_string()))?
    };

    let text = serde_json::to_string_pretty(&payload).map_err(|e| ResourceError::Failed(e.to_string()))?;
    Ok(ReadResourceResult {
        contents: vec![ResourceContents::TextResourceContents {
            uri: uri.to_string(),
            mime_type: Some(JSON_MIME.to_string()),
            text,
            meta: None,
        }],
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_uri_maps_to_memory_read() {
        let (tool, args) = backing_call("crm://memory/+15550100").unwrap();
        assert_eq!(tool, "read_agent_memory");
        assert_eq!(args["userIdentifier"], "+15550100");
        assert!(backing_call("crm://memory/").is_none());
        assert!(backing_call("crm://nope").is_none());
    }

    #[test]
    fn memory_is_offered_as_a_template() {
        assert_eq!(list().resources.len(), RESOURCES.len());
        let templates = templates();
        assert_eq!(templates.resource_templates[0].raw.uri_template, "crm://memory/{userIdentifier}");
    }

    #[test]
    fn unknown_uri_maps_to_resource_not_found() {
        let error: ErrorData = ResourceError::Unknown("crm://nope".into()).into();
        assert_eq!(error.code.0, -32002);
    }
}
