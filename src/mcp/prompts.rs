//! Prompt templates offered to MCP clients.

use rmcp::model::{
    GetPromptResult, JsonObject, ListPromptsResult, Prompt, PromptArgument, PromptMessage, PromptMessageRole,
};
use rmcp::ErrorData;
use serde_json::Value;

use crate::voice::intent::DEFAULT_SYSTEM_PROMPT;

struct PromptArg {
    name: &'static str,
    description: &'static str,
    required: bool,
}

struct PromptTemplate {
    name: &'static str,
    description: &'static str,
    arguments: &'static [PromptArg],
}

const PROMPTS: &[PromptTemplate] = &[
    PromptTemplate {
        name: "voice_command",
        description: "Turn a spoken command into one or more CRM tool calls",
        arguments: &[PromptArg {
            name: "transcription",
            description: "What the user said",
            required: true,
        }],
    },
    PromptTemplate {
        name: "confirm_action",
        description: "Phrase a short spoken confirmation of a completed action",
        arguments: &[
            PromptArg {
                name: "action",
                description: "Tool that was called",
                required: true,
            },
            PromptArg {
                name: "result",
                description: "JSON result of the call",
                required: false,
            },
        ],
    },
    PromptTemplate {
        name: "draft_reply",
        description: "Draft a reply to the latest customer message in a conversation",
        arguments: &[PromptArg {
            name: "conversationId",
            description: "UUID of the conversation",
            required: true,
        }],
    },
];

#[derive(Debug, thiserror::Error)]
pub enum PromptError {
    #[error("unknown prompt: {0}")]
    Unknown(String),
    #[error("missing required argument: {0}")]
    MissingArgument(&'static str),
}

impl From<PromptError> for ErrorData {
    fn from(e: PromptError) -> Self {
        ErrorData::invalid_params(e.to_string(), None)
    }
}

pub fn list() -> ListPromptsResult {
    let prompts = PROMPTS
        .iter()
        .map(|p| {
            let arguments = p
                .arguments
                .iter()
                .map(|a| PromptArgument {
                    name: a.name.to_string(),
                    title: None,
                    description: Some(a.description.to_string()),
                    required: Some(a.required),
                })
                .collect();
            Prompt::new(p.name, Some(p.description), Some(arguments))
        })
        .collect();
    ListPromptsResult::with_all_items(prompts)
}

pub fn get(name: &str, arguments: &JsonObject) -> Result<GetPromptResult, PromptError> {
    let template = PROMPTS
        .iter()
        .find(|p| p.name == name)
        .ok_or_else(|| PromptError::Unknown(name.to_string()))?;

    let arg = |key: &'static str| -> Result<String, PromptError> {
        match arguments.get(key) {
            Some(Value::String(s)) if !s.trim().is_empty() => Ok(s.clone()),
            Some(v) if !v.is_null() && !v.is_string() => Ok(v.to_string()),
            _ => Err(PromptError::MissingArgument(key)),
        }
    };

    let messages = match template.name {
        "voice_command" => vec![
            PromptMessage::new_text(PromptMessageRole::Assistant, DEFAULT_SYSTEM_PROMPT),
            PromptMessage::new_text(
                PromptMessageRole::User,
                format!("Parse this voice command and call the appropriate tool: \"{}\"", arg("transcription")?),
            ),
        ],
        "confirm_action" => {
            let result = arg("result").unwrap_or_else(|_| "{}".to_string());
            vec![PromptMessage::new_text(
                PromptMessageRole::User,
                format!(
                    "Based on this information, generate a brief, natural voice response (1-2 sentences max) \
                     confirming what was done:\nAction: {}\nResult: {result}",
                    arg("action")?
                ),
            )]
        }
        _ => vec![PromptMessage::new_text(
            PromptMessageRole::User,
            format!(
                "Read conversation {} with get_conversation, then write a professional, friendly reply \
                 to the customer's latest message. Do not invent prices or appointment times.",
                arg("conversationId")?
            ),
        )],
    };

    Ok(GetPromptResult {
        description: Some(template.description.to_string()),
        messages,
    })
}
