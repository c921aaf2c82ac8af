//! On-demand evaluation of automation rules.
//!
//! Only `unreplied_time` rules are checked here: an open conversation whose newest
//! message is inbound and older than the rule's `minutes` gets a model-drafted reply
//! and is flagged `needs_review` until someone answers it.

use chrono::TimeDelta;
use rusqlite::params;
use serde_json::{json, Value};

use super::conversations::generate_draft;
use super::{query_rows, write_audit};
use crate::error::ToolResult;
use crate::resolve::format_timestamp;
use crate::tools::conversations::GenerateDraftParams;
use crate::tools::{CallerContext, Dispatcher, NoParams, ToolEnv};

pub const UNREPLIED_TIME: &str = "unreplied_time";
pub const CREATE_DRAFT: &str = "create_draft";
pub const DEFAULT_UNREPLIED_MINUTES: i64 = 15;
const MAX_CONVERSATIONS_PER_RULE: i64 = 10;

/// An active rule and the conversations its trigger matches right now.
#[derive(Debug, Clone)]
pub struct RuleMatch {
    pub rule_id: String,
    pub name: String,
    pub trigger: String,
    pub action: String,
    pub conversation_ids: Vec<String>,
}

fn unreplied_minutes(trigger_config: &Value) -> i64 {
    trigger_config["minutes"]
        .as_i64()
        .filter(|m| *m > 0)
        .unwrap_or(DEFAULT_UNREPLIED_MINUTES)
}

/// Open, unflagged conversations whose newest message is inbound and older than `minutes`.
fn unreplied_conversations(env: &ToolEnv<'_>, minutes: i64) -> ToolResult<Vec<String>> {
    let cutoff = format_timestamp(env.now - TimeDelta::minutes(minutes));
    let rows = query_rows(
        env.conn,
        "SELECT v.id FROM conversations v
         JOIN messages m ON m.id = (
             SELECT id FROM messages WHERE conversation_id = v.id
             ORDER BY created_at DESC, id DESC LIMIT 1)
         WHERE v.account_id = ?1 AND v.status = 'open' AND v.needs_review = 0
           AND m.direction = 'inbound' AND m.created_at < ?2
         ORDER BY m.created_at, v.id LIMIT ?3",
        params![env.account(), cutoff, MAX_CONVERSATIONS_PER_RULE],
    )?;
    Ok(rows
        .into_iter()
        .filter_map(|r| r["id"].as_str().map(str::to_string))
        .collect())
}

/// Every active rule of the account, oldest first, with its current matches.
pub fn matching_rules(env: &ToolEnv<'_>) -> ToolResult<Vec<RuleMatch>> {
    let rules = query_rows(
        env.conn,
        "SELECT id, name, trigger, trigger_config, action FROM automation_rules
         WHERE account_id = ?1 AND active = 1 ORDER BY created_at, id",
        params![env.account()],
    )?;

    let mut matches = Vec::with_capacity(rules.len());
    for rule in rules {
        let text = |key: &str| rule[key].as_str().unwrap_or_default().to_string();
        let trigger = text("trigger");
        let conversation_ids = if trigger == UNREPLIED_TIME {
            unreplied_conversations(env, unreplied_minutes(&rule["trigger_config"]))?
        } else {
            Vec::new()
        };
        matches.push(RuleMatch {
            rule_id: text("id"),
            name: text("name"),
            action: text("action"),
            trigger,
            conversation_ids,
        });
    }
    Ok(matches)
}

pub fn mark_for_review(env: &ToolEnv<'_>, conversation_id: &str) -> ToolResult<()> {
    env.conn.execute(
        "UPDATE conversations SET needs_review = 1 WHERE id = ?1 AND account_id = ?2",
        params![conversation_id, env.account()],
    )?;
    Ok(())
}

fn record_trigger(env: &ToolEnv<'_>, rule: &RuleMatch, drafted: &[String]) -> ToolResult<()> {
    write_audit(
        env,
        "automation_triggered",
        "automation_rule",
        Some(&rule.rule_id),
        Some(&json!({
            "ruleName": rule.name,
            "trigger": rule.trigger,
            "conversationIds": drafted,
        })),
    )
}

/// Draft a reply through the analysis model, then flag the conversation.
async fn draft_for_review(dispatcher: &Dispatcher, caller: &CallerContext, conversation_id: &str) -> ToolResult<Value> {
    let id = conversation_id.to_string();
    let request = dispatcher
        .with_store(caller.clone(), move |env| {
            generate_draft(env, GenerateDraftParams { conversation_id: id })
        })
        .await?;
    let draft = dispatcher.run_analysis(caller.clone(), request).await?;

    let id = conversation_id.to_string();
    dispatcher
        .with_store(caller.clone(), move |env| mark_for_review(env, &id))
        .await?;
    Ok(draft)
}

pub async fn run_automation_rules(
    dispatcher: Dispatcher,
    caller: CallerContext,
    _params: NoParams,
) -> ToolResult<Value> {
    let rules = dispatcher.with_store(caller.clone(), |env| matching_rules(env)).await?;
    tracing::info!(account = %caller.account_id, rules = rules.len(), "evaluating automation rules");

    let mut results = Vec::new();
    let mut actions_taken = 0;
    for rule in &rules {
        if rule.conversation_ids.is_empty() {
            continue;
        }
        let mut drafted = Vec::new();
        if rule.action == CREATE_DRAFT {
            for conversation_id in &rule.conversation_ids {
                match draft_for_review(&dispatcher, &caller, conversation_id).await {
                    Ok(draft) => {
                        drafted.push(conversation_id.clone());
                        results.push(json!({
                            "rule": rule.name,
                            "ruleId": rule.rule_id,
                            "action": "draft_created",
                            "conversationId": conversation_id,
                            "draftId": draft["draftId"],
                            "draft": draft["draft"],
                        }));
                    }
                    Err(e) => {
                        tracing::warn!(rule = %rule.rule_id, conversation = %conversation_id, error = %e, "automatic draft failed");
                        results.push(json!({
                            "rule": rule.name,
                            "ruleId": rule.rule_id,
                            "action": "draft_failed",
                            "conversationId": conversation_id,
                            "error": e.to_string(),
                        }));
                    }
                }
            }
        } else {
            tracing::debug!(rule = %rule.rule_id, action = %rule.action, "rule action not run on demand");
        }
        actions_taken += drafted.len();

        let triggered = rule.clone();
        dispatcher
            .with_store(caller.clone(), move |env| record_trigger(env, &triggered, &drafted))
            .await?;
    }

    Ok(json!({
        "success": true,
        "rulesChecked": rules.len(),
        "actionsTaken": actions_taken,
        "results": results,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minutes_default_when_missing_or_not_positive() {
        assert_eq!(unreplied_minutes(&json!({})), DEFAULT_UNREPLIED_MINUTES);
        assert_eq!(unreplied_minutes(&json!({"minutes": 0})), DEFAULT_UNREPLIED_MINUTES);
        assert_eq!(unreplied_minutes(&json!({"minutes": "30"})), DEFAULT_UNREPLIED_MINUTES);
        assert_eq!(unreplied_minutes(&json!({"minutes": 45})), 45);
    }
}
