//! Spoken replies for voice command results.
//!
//! List results use fixed templates. Errors get a canned apology. Anything else is
//! phrased by the summary model, with a fixed sentence when the model is unavailable.

use serde_json::Value;

use crate::llm::{CompletionRequest, LanguageModel, ModelUse};

pub const HELP_REPLY: &str = "I didn't understand that command. You can ask me to create jobs, list contacts, \
update job status, search for information, and much more. What would you like to do?";

pub const COMPLETED_REPLY: &str = "Operation completed.";

const SUMMARY_SYSTEM_PROMPT: &str =
    "Generate a brief, natural voice response (1-2 sentences). Be conversational and friendly.";

/// Most items named individually in a spoken list.
const SPOKEN_LIST_MAX: usize = 5;

fn text<'a>(value: &'a Value, key: &str) -> &'a str {
    value.get(key).and_then(Value::as_str).unwrap_or_default()
}

fn person(value: &Value) -> String {
    format!("{} {}", text(value, "first_name"), text(value, "last_name"))
}

fn job_description(job: &Value) -> &str {
    match text(job, "description") {
        "" => "No description",
        d => d,
    }
}

pub fn format_jobs(jobs: &[Value]) -> String {
    match jobs.len() {
        0 => "No jobs found.".to_string(),
        1 => {
            let job = &jobs[0];
            let status = match text(job, "status") {
                "" => "unknown",
                s => s,
            };
            format!(
                "You have 1 job: {} for {} at {status} status.",
                job_description(job),
                person(&job["contact"]),
            )
        }
        n if n <= SPOKEN_LIST_MAX => {
            let items: Vec<String> = jobs
                .iter()
                .enumerate()
                .map(|(i, j)| format!("Job {}: {} for {}", i + 1, job_description(j), person(&j["contact"])))
                .collect();
            format!("You have {n} jobs: {}.", items.join(". "))
        }
        n => {
            let items: Vec<String> = jobs
                .iter()
                .take(SPOKEN_LIST_MAX)
                .enumerate()
                .map(|(i, j)| format!("Job {}: {}", i + 1, job_description(j)))
                .collect();
            format!("You have {n} jobs. Here are the first 5: {}.", items.join(". "))
        }
    }
}

pub fn format_contacts(contacts: &[Value]) -> String {
    match contacts.len() {
        0 => "No contacts found.".to_string(),
        1 => {
            let contact = &contacts[0];
            let email = match text(contact, "email") {
                "" => "no email",
                e => e,
            };
            format!("Found 1 contact: {}, email {email}.", person(contact))
        }
        n => {
            let names: Vec<String> = contacts.iter().take(SPOKEN_LIST_MAX).map(person).collect();
            if n <= SPOKEN_LIST_MAX {
                format!("Found {n} contacts: {}.", names.join(", "))
            } else {
                format!("Found {n} contacts. Here are the first 5: {}.", names.join(", "))
            }
        }
    }
}

pub fn error_reply(error: &str) -> String {
    let hint = if error.contains("not found") {
        "Please check the name or ID and try again."
    } else {
        "Please try again or ask for help."
    };
    format!("Sorry, {error}. {hint}")
}

/// Facts about the outcome, handed to the summary model.
pub fn summary_context(transcription: &str, action: &str, result: Option<&Value>, success: bool) -> String {
    let mut context = format!("Voice command: \"{transcription}\"\nAction: {action}\n");
    if let Some(result) = result {
        if let Some(jobs) = result["jobs"].as_array().filter(|j| !j.is_empty()) {
            context.push_str(&format!("Found {} job(s).", jobs.len()));
        }
        if let Some(contacts) = result["contacts"].as_array().filter(|c| !c.is_empty()) {
            context.push_str(&format!("Found {} contact(s).", contacts.len()));
        }
        if result["job"].is_object() {
            context.push_str(&format!("Job: {}", job_description(&result["job"])));
        }
        if result["contact"].is_object() {
            context.push_str(&format!("Contact: {}", person(&result["contact"])));
        }
        if let Some(message) = result["message"].as_str() {
            context.push_str(&format!("Message: {message}"));
        }
    }
    if success {
        context.push_str("Operation completed successfully.");
    }
    context
}

/// Ask the summary model for a confirmation; fall back to `fallback` on any failure.
pub async fn confirm(model: &dyn LanguageModel, context: &str, fallback: &str) -> String {
    let prompt = format!(
        "Based on this information, generate a brief, natural voice response (1-2 sentences max) \
         confirming what was done:\n{context}"
    );
    match model
        .complete(CompletionRequest::prompt(ModelUse::Summary, SUMMARY_SYSTEM_PROMPT, prompt))
        .await
    {
        Ok(completion) => completion
            .text
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| fallback.to_string()),
        Err(e) => {
            tracing::warn!(error = %e, "summary model failed, using canned reply");
            fallback.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn job(desc: &str, first: &str, last: &str) -> Value {
        json!({"description": desc, "status": "scheduled", "contact": {"first_name": first, "last_name": last}})
    }

    #[test]
    fn job_templates() {
        assert_eq!(format_jobs(&[]), "No jobs found.");
        assert_eq!(
            format_jobs(&[job("Fix sink", "Ann", "Lee")]),
            "You have 1 job: Fix sink for Ann Lee at scheduled status."
        );
        assert_eq!(
            format_jobs(&[job("Fix sink", "Ann", "Lee"), job("", "Bo", "Chen")]),
            "You have 2 jobs: Job 1: Fix sink for Ann Lee. Job 2: No description for Bo Chen."
        );
        let many: Vec<Value> = (1..=7).map(|i| job(&format!("J{i}"), "A", "B")).collect();
        assert_eq!(
            format_jobs(&many),
            "You have 7 jobs. Here are the first 5: Job 1: J1. Job 2: J2. Job 3: J3. Job 4: J4. Job 5: J5."
        );
    }

    #[test]
    fn contact_templates() {
        assert_eq!(format_contacts(&[]), "No contacts found.");
        assert_eq!(
            format_contacts(&[json!({"first_name": "Ann", "last_name": "Lee"})]),
            "Found 1 contact: Ann Lee, email no email."
        );
        assert_eq!(
            format_contacts(&[
                json!({"first_name": "Ann", "last_name": "Lee"}),
                json!({"first_name": "Bo", "last_name": "Chen"})
            ]),
            "Found 2 contacts: Ann Lee, Bo Chen."
        );
    }

    #[test]
    fn error_hints() {
        assert_eq!(
            error_reply("Job not found"),
            "Sorry, Job not found. Please check the name or ID and try again."
        );
        assert_eq!(
            error_reply("No fields to update"),
            "Sorry, No fields to update. Please try again or ask for help."
        );
    }

    #[test]
    fn summary_context_mentions_counts() {
        let ctx = summary_context("list jobs", "list_jobs", Some(&json!({"jobs": [{}, {}]})), true);
        assert!(ctx.contains("Found 2 job(s)."));
        assert!(ctx.ends_with("Operation completed successfully."));
    }
}
