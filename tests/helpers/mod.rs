#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use crm_mcp::db;
use crm_mcp::llm::{Completion, CompletionRequest, LanguageModel, LlmError, ModelUse, ToolInvocation};
use crm_mcp::tools::{CallerContext, Dispatcher, HandlerSettings};
use rusqlite::{params, Connection};
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

pub const ACCOUNT: &str = "acct-1";
pub const CREATED: &str = "2025-01-01T09:00:00Z";

/// Fixed wall clock used by every test dispatcher.
pub fn fixed_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 10, 15, 0, 0).unwrap()
}

/// Open a fresh in-memory database with schema and migrations applied.
pub fn test_db() -> Connection {
    db::open_memory_database().unwrap()
}

pub fn seed_account(conn: &Connection, id: &str) {
    conn.execute(
        "INSERT INTO accounts (id, name, created_at) VALUES (?1, 'Acme Plumbing', ?2)",
        params![id, CREATED],
    )
    .unwrap();
}

pub fn seed_user(conn: &Connection, id: &str, first: &str, last: &str, role: &str) {
    conn.execute(
        "INSERT INTO users (id, account_id, email, first_name, last_name, role, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![id, ACCOUNT, format!("{id}@acme.test"), first, last, role, CREATED],
    )
    .unwrap();
}

pub fn seed_contact(conn: &Connection, id: &str, first: &str, last: &str, created_at: &str) {
    conn.execute(
        "INSERT INTO contacts (id, account_id, email, first_name, last_name, phone, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, '555-0100', ?6, ?6)",
        params![id, ACCOUNT, format!("{id}@example.test"), first, last, created_at],
    )
    .unwrap();
}

pub fn seed_job(conn: &Connection, id: &str, contact_id: &str, description: &str, status: &str, start: Option<&str>) {
    conn.execute(
        "INSERT INTO jobs (id, account_id, contact_id, description, status, scheduled_start, total_amount,
                           created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, 25000, ?7, ?7)",
        params![id, ACCOUNT, contact_id, description, status, start, CREATED],
    )
    .unwrap();
}

pub fn seed_conversation(conn: &Connection, id: &str, contact_id: &str, channel: &str) {
    conn.execute(
        "INSERT INTO conversations (id, account_id, contact_id, subject, channel, status, last_message_at, created_at)
         VALUES (?1, ?2, ?3, 'Leaky faucet', ?4, 'open', ?5, ?5)",
        params![id, ACCOUNT, contact_id, channel, CREATED],
    )
    .unwrap();
    conn.execute(
        "INSERT INTO messages (id, conversation_id, direction, sender_type, body_text, created_at)
         VALUES (?1, ?2, 'inbound', 'contact', 'My kitchen faucet is dripping', ?3)",
        params![format!("{id}-m1"), id, CREATED],
    )
    .unwrap();
}

/// IDs of the records [`seed_world`] creates.
pub struct World {
    pub owner: &'static str,
    pub tech: &'static str,
    pub contact: &'static str,
    pub job: &'static str,
    pub conversation: &'static str,
    pub invoice: &'static str,
    pub campaign: &'static str,
    pub tag: &'static str,
    pub notification: &'static str,
}

/// One account with a record of every kind the catalog touches.
pub fn seed_world(conn: &Connection) -> World {
    let world = World {
        owner: "user-owner",
        tech: "user-tech",
        contact: "contact-1",
        job: "job-1",
        conversation: "conv-1",
        invoice: "inv-1",
        campaign: "camp-1",
        tag: "tag-1",
        notification: "note-1",
    };
    seed_account(conn, ACCOUNT);
    seed_user(conn, world.owner, "Olivia", "Owner", "owner");
    seed_user(conn, world.tech, "Mike", "Torres", "tech");
    seed_contact(conn, world.contact, "John", "Smith", CREATED);
    seed_job(conn, world.job, world.contact, "Replace water heater", "scheduled", Some("2025-06-10T16:00:00Z"));
    seed_conversation(conn, world.conversation, world.contact, "email");
    conn.execute(
        "INSERT INTO invoices (id, account_id, job_id, contact_id, invoice_number, total_amount, status,
                               created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, 'INV-00001', 25000, 'draft', ?5, ?5)",
        params![world.invoice, ACCOUNT, world.job, world.contact, CREATED],
    )
    .unwrap();
    conn.execute(
        "INSERT INTO campaigns (id, account_id, name, subject, body, created_at)
         VALUES (?1, ?2, 'Spring tune-up', 'Book your tune-up', 'Hi there', ?3)",
        params![world.campaign, ACCOUNT, CREATED],
    )
    .unwrap();
    conn.execute(
        "INSERT INTO contact_tags (id, account_id, name, created_at) VALUES (?1, ?2, 'vip', ?3)",
        params![world.tag, ACCOUNT, CREATED],
    )
    .unwrap();
    conn.execute(
        "INSERT INTO notifications (id, account_id, user_id, type, title, message, created_at)
         VALUES (?1, ?2, ?3, 'job', 'New job', 'A job was assigned', ?4)",
        params![world.notification, ACCOUNT, world.owner, CREATED],
    )
    .unwrap();
    world
}

pub fn context() -> CallerContext {
    CallerContext {
        user_id: Some("user-owner".into()),
        ..CallerContext::for_account(ACCOUNT)
    }
}

pub fn test_dispatcher(conn: Connection, model: Arc<ScriptedModel>) -> Dispatcher {
    Dispatcher::new(Arc::new(Mutex::new(conn)), model, HandlerSettings::default()).with_clock(fixed_now)
}

/// Language model double that replays queued replies. With the queue empty it
/// answers analysis prompts with a fixed JSON object, summaries with a fixed
/// sentence, and voice prompts with no tool call.
#[derive(Default)]
pub struct ScriptedModel {
    replies: Mutex<VecDeque<Result<Completion, String>>>,
    requests: Mutex<Vec<CompletionRequest>>,
}

pub const DEFAULT_ANALYSIS: &str = r#"{"overallRisk": 80, "adjustedPrice": 130.0, "score": 0.5, "label": "positive"}"#;
pub const DEFAULT_SUMMARY: &str = "All done.";

impl ScriptedModel {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push_text(&self, text: &str) {
        self.replies.lock().unwrap().push_back(Ok(Completion {
            text: Some(text.to_string()),
            tool_calls: Vec::new(),
        }));
    }

    pub fn push_calls(&self, calls: &[(&str, Value)]) {
        let tool_calls = calls
            .iter()
            .enumerate()
            .map(|(i, (name, args))| ToolInvocation {
                id: format!("call_{i}"),
                name: name.to_string(),
                arguments: args.clone(),
            })
            .collect();
        self.replies.lock().unwrap().push_back(Ok(Completion { text: None, tool_calls }));
    }

    pub fn push_error(&self, message: &str) {
        self.replies.lock().unwrap().push_back(Err(message.to_string()));
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    async fn complete(&self, request: CompletionRequest) -> Result<Completion, LlmError> {
        let model_use = request.model_use;
        self.requests.lock().unwrap().push(request);
        if let Some(reply) = self.replies.lock().unwrap().pop_front() {
            return reply.map_err(LlmError::InvalidResponse);
        }
        let text = match model_use {
            ModelUse::Analysis => Some(DEFAULT_ANALYSIS.to_string()),
            ModelUse::Summary => Some(DEFAULT_SUMMARY.to_string()),
            ModelUse::Voice => None,
        };
        Ok(Completion {
            text,
            tool_calls: Vec::new(),
        })
    }
}
