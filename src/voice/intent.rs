//! Natural-language intent parsing: utterance in, ordered tool calls out.

use serde_json::Value;
use std::sync::Arc;

use crate::llm::{ChatMessage, CompletionRequest, FunctionSpec, LanguageModel, LlmError, ModelUse};
use crate::tools::{CallerContext, Catalog};

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are an AI assistant for a service business.
Parse voice commands and determine the appropriate action using the available tools.
Be precise and extract all necessary parameters from the user's request.

When parsing dates and times:
- \"today\" = current date
- \"tomorrow\" = next day
- \"next week\" = 7 days from now
- \"2pm\" = 14:00 in ISO format
- \"tomorrow at 2pm\" = next day at 14:00

When resolving references:
- \"that job\" or \"the last job\" = pass \"last\" as the jobId
- \"that customer\" = pass \"last\" as the contactId
- \"John\" = search for contact named John
- \"Mike\" = search for technician named Mike

Always use the most specific tool available. For example, use \"list_jobs\" with filters rather than \"get_job\" when user asks for multiple jobs.";

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedCall {
    pub tool_name: String,
    pub arguments: Value,
}

#[derive(Debug, Clone, Default)]
pub struct ParsedCommand {
    pub calls: Vec<ParsedCall>,
    /// Assistant text returned alongside (or instead of) tool calls.
    pub text: Option<String>,
}

pub struct IntentParser {
    model: Arc<dyn LanguageModel>,
    functions: Vec<FunctionSpec>,
}

/// Known record IDs, appended to the system prompt so the model can name them.
fn context_note(context: &CallerContext) -> Option<String> {
    let known: Vec<String> = [
        ("lastJobId", &context.last_job_id),
        ("lastContactId", &context.last_contact_id),
        ("lastConversationId", &context.last_conversation_id),
    ]
    .into_iter()
    .filter_map(|(key, id)| id.as_ref().map(|id| format!("{key}={id}")))
    .collect();
    (!known.is_empty()).then(|| format!("Current context: {}", known.join(", ")))
}

impl IntentParser {
    pub fn new(model: Arc<dyn LanguageModel>, catalog: &Catalog) -> Self {
        Self {
            model,
            functions: catalog.function_specs(),
        }
    }

    pub async fn parse(
        &self,
        transcription: &str,
        history: &[ChatMessage],
        context: &CallerContext,
        system_prompt: Option<&str>,
    ) -> Result<ParsedCommand, LlmError> {
        let mut system = system_prompt.unwrap_or(DEFAULT_SYSTEM_PROMPT).to_string();
        if let Some(note) = context_note(context) {
            system.push_str("\n\n");
            system.push_str(&note);
        }

        let mut messages = history.to_vec();
        messages.push(ChatMessage::user(format!(
            "Parse this voice command and call the appropriate tool: \"{transcription}\""
        )));

        let completion = self
            .model
            .complete(CompletionRequest {
                model_use: ModelUse::Voice,
                system_prompt: system,
                messages,
                functions: self.functions.clone(),
                json_output: false,
            })
            .await?;

        let calls: Vec<ParsedCall> = completion
            .tool_calls
            .into_iter()
            .map(|tc| ParsedCall {
                tool_name: tc.name,
                arguments: tc.arguments,
            })
            .collect();
        tracing::info!(calls = calls.len(), "voice command parsed");

        Ok(ParsedCommand {
            calls,
            text: completion.text,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_note_lists_known_ids() {
        let mut ctx = CallerContext::for_account("a");
        assert!(context_note(&ctx).is_none());
        ctx.last_job_id = Some("j1".into());
        ctx.last_conversation_id = Some("v1".into());
        assert_eq!(
            context_note(&ctx).as_deref(),
            Some("Current context: lastJobId=j1, lastConversationId=v1")
        );
    }
}
