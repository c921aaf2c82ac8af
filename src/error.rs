//! Error taxonomy shared by the tool handlers and the dispatcher.
//!
//! Every variant flattens to a plain `{"error": "..."}` payload at the MCP and voice
//! boundaries; the variants only exist so callers inside the crate can tell a missing
//! record from a bad argument or an upstream model failure.

use thiserror::Error;

/// Convenience alias for handler return types.
pub type ToolResult<T> = Result<T, ToolError>;

#[derive(Debug, Error)]
pub enum ToolError {
    /// The requested tool name is not in the catalog.
    #[error("unknown tool: {0}")]
    UnknownTool(String),

    /// Missing or malformed arguments.
    #[error("{0}")]
    Validation(String),

    /// An entity lookup came back empty.
    #[error("{0}")]
    NotFound(String),

    /// The language model (or another upstream service) failed.
    #[error("upstream failure: {0}")]
    Upstream(String),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ToolError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    /// Short machine-readable label, used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::UnknownTool(_) => "unknown_tool",
            Self::Validation(_) => "validation",
            Self::NotFound(_) => "not_found",
            Self::Upstream(_) => "upstream",
            Self::Database(_) => "database",
            Self::Internal(_) => "internal",
        }
    }
}

impl From<serde_json::Error> for ToolError {
    fn from(e: serde_json::Error) -> Self {
        Self::Internal(format!("serialization failed: {e}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_message_is_passed_through() {
        let err = ToolError::validation("contactId is required");
        assert_eq!(err.to_string(), "contactId is required");
        assert_eq!(err.kind(), "validation");
    }

    #[test]
    fn unknown_tool_names_the_tool() {
        let err = ToolError::UnknownTool("fly_to_moon".into());
        assert_eq!(err.to_string(), "unknown tool: fly_to_moon");
    }
}
