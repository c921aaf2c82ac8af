//! Prompt builders for the analysis tools, and storage of their answers.

use chrono::TimeDelta;
use rusqlite::params;
use serde_json::{json, Map, Value};

use super::billing::fetch_invoice;
use super::contacts::fetch_contact;
use super::conversations::fetch_conversation;
use super::jobs::fetch_job;
use super::{cents_to_dollars, new_id, query_one, query_rows, write_audit};
use crate::error::ToolResult;
use crate::resolve::{self, format_timestamp};
use crate::tools::ai::*;
use crate::tools::{AnalysisRequest, ToolEnv};

const DEFAULT_SENTIMENT_DAYS: i64 = 30;

fn analysis(
    kind: &'static str,
    entity_type: Option<&'static str>,
    entity_id: Option<String>,
    system_prompt: String,
    prompt: String,
    result_key: &'static str,
    id_key: &'static str,
) -> AnalysisRequest {
    AnalysisRequest {
        kind,
        entity_type,
        entity_id,
        system_prompt,
        prompt,
        result_key,
        id_key,
        json_output: true,
        extra: Map::new(),
        derive: None,
    }
}

/// Store a model answer verbatim and build the tool result around it.
pub fn record_analysis(
    env: &ToolEnv<'_>,
    request: AnalysisRequest,
    raw: &str,
    output: Value,
) -> ToolResult<Value> {
    let id = new_id();
    env.conn.execute(
        "INSERT INTO ai_analyses (id, account_id, kind, entity_type, entity_id, result, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![id, env.account(), request.kind, request.entity_type, request.entity_id, raw, env.timestamp()],
    )?;
    write_audit(
        env,
        "ai_analysis",
        request.entity_type.unwrap_or(request.kind),
        request.entity_id.as_deref(),
        Some(&json!({"kind": request.kind, "analysisId": id})),
    )?;
    tracing::info!(kind = request.kind, analysis = %id, "analysis stored");

    let mut result = request.extra;
    result.insert("success".into(), Value::Bool(true));
    if let Some(derive) = request.derive {
        derive(&output, &mut result);
    }
    result.insert(request.result_key.into(), output);
    result.insert(request.id_key.into(), Value::String(id));
    Ok(Value::Object(result))
}

/// Earlier stored answers of one kind for an entity, newest first.
fn prior_analyses(env: &ToolEnv<'_>, kind: &str, entity_id: &str, limit: i64) -> ToolResult<Vec<Value>> {
    query_rows(
        env.conn,
        "SELECT result, created_at FROM ai_analyses
         WHERE account_id = ?1 AND kind = ?2 AND entity_id = ?3
         ORDER BY created_at DESC, id DESC LIMIT ?4",
        params![env.account(), kind, entity_id, limit],
    )
}

pub fn ai_estimate_job(env: &ToolEnv<'_>, p: EstimateJobParams) -> ToolResult<AnalysisRequest> {
    let similar = query_rows(
        env.conn,
        "SELECT description, total_amount, scheduled_start, scheduled_end, created_at FROM jobs
         WHERE account_id = ?1 AND status IN ('completed', 'invoiced', 'paid')
           AND lower(description) LIKE ?2 ESCAPE '\\'
         ORDER BY created_at DESC, id DESC LIMIT 50",
        params![env.account(), resolve::like_pattern(&p.job_type)],
    )?;
    let sample: Vec<&Value> = similar.iter().take(10).collect();
    let issues = p
        .reported_issues
        .as_ref()
        .filter(|i| !i.is_empty())
        .map(|i| i.join(", "))
        .unwrap_or_else(|| "none".into());

    let mut request = analysis(
        "estimate",
        None,
        None,
        format!(
            "You are a job estimation expert. Based on historical data:\n\
             Similar Jobs (amounts in cents): {}\n\
             Estimate duration (minutes), cost (dollars), and confidence (0-100).\n\
             Return JSON: {{\"duration\": number, \"cost\": number, \"confidence\": number, \"reasoning\": string}}",
            serde_json::to_string(&sample)?
        ),
        format!(
            "Estimate this job:\nType: {}\nDescription: {}\nLocation: {}\nUrgency: {}\nIssues: {issues}",
            p.job_type,
            p.description,
            p.location,
            p.urgency.map_or("medium", Urgency::as_str),
        ),
        "estimate",
        "estimateId",
    );
    request.extra.insert("usedHistoricalJobs".into(), json!(similar.len()));
    Ok(request)
}

fn sentiment_trend(output: &Value, result: &mut Map<String, Value>) {
    let trend = output.get("trends").cloned().unwrap_or_else(|| json!("stable"));
    result.insert("trend".into(), trend);
}

pub fn analyze_customer_sentiment(env: &ToolEnv<'_>, p: SentimentParams) -> ToolResult<AnalysisRequest> {
    let contact_id = resolve::resolve_contact(env.conn, env.account(), &p.contact_id)?;
    let days = p
        .timeframe
        .as_deref()
        .and_then(|t| t.trim().trim_end_matches(" days").parse::<i64>().ok())
        .filter(|d| *d > 0)
        .unwrap_or(DEFAULT_SENTIMENT_DAYS);
    let since = format_timestamp(env.now - TimeDelta::days(days));

    let conversations = query_rows(
        env.conn,
        "SELECT id, subject, channel, status, created_at FROM conversations
         WHERE account_id = ?1 AND contact_id = ?2 AND created_at >= ?3
           AND (?4 OR channel != 'email')
         ORDER BY created_at DESC, id DESC",
        params![env.account(), contact_id, since, p.include_emails.unwrap_or(true)],
    )?;
    let mut transcript = Vec::new();
    for conversation in conversations.iter().take(5) {
        let messages = query_rows(
            env.conn,
            "SELECT direction, body_text, created_at FROM messages
             WHERE conversation_id = ?1 ORDER BY created_at DESC LIMIT 10",
            params![conversation["id"].as_str()],
        )?;
        transcript.push(json!({ "conversation": conversation, "messages": messages }));
    }
    let jobs = query_rows(
        env.conn,
        "SELECT description, status, created_at FROM jobs
         WHERE account_id = ?1 AND contact_id = ?2 ORDER BY created_at DESC LIMIT 10",
        params![env.account(), contact_id],
    )?;

    let mut request = analysis(
        "sentiment",
        Some("contact"),
        Some(contact_id.clone()),
        "Analyze customer sentiment from conversations and job history. Return JSON: \
         {\"score\": -1 to 1, \"label\": \"positive/negative/neutral\", \"emotions\": string[], \
         \"keyPhrases\": string[], \"trends\": string}"
            .to_string(),
        format!(
            "Analyze sentiment for contact {contact_id}:\nConversations: {}\nRecent Jobs: {}",
            serde_json::to_string(&transcript)?,
            serde_json::to_string(&jobs)?
        ),
        "sentiment",
        "analysisId",
    );
    request.extra.insert("conversationsAnalyzed".into(), json!(conversations.len()));
    request.extra.insert("jobsConsidered".into(), json!(jobs.len()));
    request.extra.insert("contactId".into(), json!(contact_id));
    request.derive = Some(sentiment_trend);
    Ok(request)
}

pub fn predict_equipment_maintenance(
    env: &ToolEnv<'_>,
    p: MaintenanceParams,
) -> ToolResult<AnalysisRequest> {
    let history = prior_analyses(env, "maintenance", &p.equipment_id, 20)?;
    let issues = p
        .reported_issues
        .as_ref()
        .filter(|i| !i.is_empty())
        .map(|i| i.join(", "))
        .unwrap_or_else(|| "none".into());

    let mut request = analysis(
        "maintenance",
        Some("equipment"),
        Some(p.equipment_id.clone()),
        "Predict equipment failure from the details given. Return JSON: {\"failureProbability\": 0-100, \
         \"predictedFailureDate\": \"ISO date\", \"riskFactors\": string[], \"recommendation\": string, \
         \"urgency\": \"low/medium/high/critical\"}"
            .to_string(),
        format!(
            "Predict maintenance needs for equipment {}:\n- Equipment Type: {}\n- Last Maintenance: {}\n\
             - Usage Hours: {}\n- Recent Issues: {issues}\n- Previous Predictions: {}",
            p.equipment_id,
            p.equipment_type,
            p.last_maintenance.as_deref().unwrap_or("unknown"),
            p.usage_hours.unwrap_or(0.0),
            serde_json::to_string(&history)?
        ),
        "prediction",
        "predictionId",
    );
    request.extra.insert("historicalDataPoints".into(), json!(history.len()));
    Ok(request)
}

fn price_adjustment(output: &Value, result: &mut Map<String, Value>) {
    if let (Some(base), Some(adjusted)) = (
        result.get("originalPrice").and_then(Value::as_f64),
        output.get("adjustedPrice").and_then(Value::as_f64),
    ) {
        result.insert("adjustment".into(), json!(((adjusted - base) * 100.0).round() / 100.0));
    }
}

pub fn calculate_dynamic_pricing(env: &ToolEnv<'_>, p: PricingParams) -> ToolResult<AnalysisRequest> {
    let job = fetch_job(env.conn, env.account(), &p.job_id)?;
    let key_words: Vec<&str> = job["description"]
        .as_str()
        .unwrap_or_default()
        .split_whitespace()
        .take(3)
        .collect();
    let market = query_rows(
        env.conn,
        "SELECT total_amount FROM jobs
         WHERE account_id = ?1 AND status IN ('completed', 'invoiced', 'paid') AND total_amount > 0
           AND lower(description) LIKE ?2 ESCAPE '\\' AND id != ?3
         LIMIT 50",
        params![env.account(), resolve::like_pattern(&key_words.join(" ")), p.job_id],
    )?;
    let rates: Vec<f64> = market
        .iter()
        .take(10)
        .filter_map(|r| r["total_amount"].as_i64())
        .map(cents_to_dollars)
        .collect();
    let customer_jobs = match job["contact_id"].as_str() {
        Some(contact_id) => super::count(
            env.conn,
            "SELECT count(*) FROM jobs WHERE account_id = ?1 AND contact_id = ?2",
            params![env.account(), contact_id],
        )?,
        None => 0,
    };

    let mut request = analysis(
        "pricing",
        Some("job"),
        Some(p.job_id.clone()),
        "Calculate optimal pricing from the details given. Return JSON: {\"adjustedPrice\": number, \
         \"adjustmentReason\": string, \"confidence\": 0-100, \"marketPosition\": \"below/above/at_market\", \
         \"customerSegment\": \"new/regular/premium\"}"
            .to_string(),
        format!(
            "Calculate dynamic price for job {}:\n- Description: {}\n- Base Price: ${}\n\
             - Customer Jobs On Record: {customer_jobs}\n- Market Rates: {}\n- Additional Factors: {}",
            p.job_id,
            job["description"].as_str().unwrap_or_default(),
            p.base_price,
            serde_json::to_string(&rates)?,
            serde_json::to_string(&p.factors.clone().unwrap_or_default())?
        ),
        "pricing",
        "pricingId",
    );
    request.extra.insert("originalPrice".into(), json!(p.base_price));
    request.extra.insert("marketDataPoints".into(), json!(market.len()));
    request.extra.insert("jobId".into(), json!(p.job_id));
    request.derive = Some(price_adjustment);
    Ok(request)
}

fn risk_level(output: &Value, result: &mut Map<String, Value>) {
    let overall = output.get("overallRisk").and_then(Value::as_f64).unwrap_or(0.0);
    let level = if overall > 75.0 {
        "high"
    } else if overall > 50.0 {
        "medium"
    } else {
        "low"
    };
    result.insert("riskLevel".into(), json!(level));
}

pub fn assess_job_risk(env: &ToolEnv<'_>, p: RiskParams) -> ToolResult<AnalysisRequest> {
    let job = fetch_job(env.conn, env.account(), &p.job_id)?;
    let history = prior_analyses(env, "risk", &p.job_id, 20)?;
    let location = p
        .location
        .clone()
        .or_else(|| job["contact"]["address"].as_str().map(str::to_string))
        .unwrap_or_else(|| "unknown".into());

    let mut request = analysis(
        "risk",
        Some("job"),
        Some(p.job_id.clone()),
        "Assess comprehensive job risks from the details given. Return JSON: {\"overallRisk\": 0-100, \
         \"safetyRisk\": 0-100, \"financialRisk\": 0-100, \"reputationRisk\": 0-100, \"riskFactors\": string[], \
         \"mitigation\": string[], \"requiresPermit\": boolean, \"recommendedInsurance\": string}"
            .to_string(),
        format!(
            "Assess risks for job {}:\n- Job Type: {}\n- Description: {}\n- Location: {location}\n\
             - Complexity: {}\n- Risk History: {}",
            p.job_id,
            p.job_type,
            job["description"].as_str().unwrap_or_default(),
            p.complexity.map_or("medium", Complexity::as_str),
            serde_json::to_string(&history)?
        ),
        "riskAssessment",
        "assessmentId",
    );
    request.extra.insert("jobId".into(), json!(p.job_id));
    request.derive = Some(risk_level);
    Ok(request)
}

pub fn predict_customer_churn(env: &ToolEnv<'_>, p: ChurnParams) -> ToolResult<AnalysisRequest> {
    let contact_id = resolve::resolve_contact(env.conn, env.account(), &p.contact_id)?;
    let contact = fetch_contact(env.conn, env.account(), &contact_id)?;
    let history = if p.include_history.unwrap_or(false) {
        query_rows(
            env.conn,
            "SELECT status, total_amount, created_at FROM jobs
             WHERE account_id = ?1 AND contact_id = ?2 ORDER BY created_at DESC LIMIT 50",
            params![env.account(), contact_id],
        )?
    } else {
        Vec::new()
    };
    let last_contact = query_one(
        env.conn,
        "SELECT max(last_message_at) AS last_message_at FROM conversations
         WHERE account_id = ?1 AND contact_id = ?2",
        params![env.account(), contact_id],
    )?
    .unwrap_or(Value::Null);

    let mut request = analysis(
        "churn",
        Some("contact"),
        Some(contact_id.clone()),
        "Predict customer churn risk from the profile and history given. Return JSON: {\"churnRisk\": 0-100, \
         \"riskLevel\": \"low/medium/high/critical\", \"warningSigns\": string[], \
         \"interventionStrategies\": string[], \"retentionProbability\": 0-100, \"recommendedActions\": string[]}"
            .to_string(),
        format!(
            "Predict churn risk for customer {contact_id}:\n- Customer Profile: {}\n- Last Contact: {}\n\
             - Service History: {}",
            serde_json::to_string(&contact)?,
            last_contact["last_message_at"],
            serde_json::to_string(&history)?
        ),
        "churnPrediction",
        "predictionId",
    );
    request.extra.insert("dataPointsAnalyzed".into(), json!(history.len()));
    request.extra.insert("contactId".into(), json!(contact_id));
    Ok(request)
}

pub fn provide_sales_coaching(env: &ToolEnv<'_>, p: CoachingParams) -> ToolResult<AnalysisRequest> {
    let conversation = match p.conversation_id.as_deref() {
        Some(reference) => {
            let id = resolve::resolve_conversation(env.conn, env.account(), reference)?;
            let mut conversation = fetch_conversation(env.conn, env.account(), &id)?;
            conversation["messages"] = Value::Array(query_rows(
                env.conn,
                "SELECT direction, body_text, created_at FROM messages
                 WHERE conversation_id = ?1 ORDER BY created_at ASC LIMIT 30",
                params![id],
            )?);
            conversation
        }
        None => json!({}),
    };
    let sales_person = match p.sales_person_id.as_deref() {
        Some(user_id) => query_one(
            env.conn,
            "SELECT first_name, last_name, role FROM users WHERE id = ?1 AND account_id = ?2",
            params![user_id, env.account()],
        )?
        .unwrap_or_else(|| json!({})),
        None => json!({}),
    };

    Ok(analysis(
        "coaching",
        conversation["id"].as_str().map(|_| "conversation"),
        conversation["id"].as_str().map(str::to_string),
        "Provide real-time sales coaching from the situation given. Return JSON: {\"currentScore\": 0-100, \
         \"strengths\": string[], \"improvements\": string[], \"nextSteps\": string[], \
         \"talkingPoints\": string[], \"questionsToAsk\": string[], \"closingProbability\": 0-100, \
         \"recommendedApproach\": string}"
            .to_string(),
        format!(
            "Provide sales coaching for this situation:\n- Context: {}\n- Conversation: {}\n- Sales Person: {}",
            p.context,
            serde_json::to_string(&conversation)?,
            serde_json::to_string(&sales_person)?
        ),
        "coaching",
        "sessionId",
    ))
}

pub fn monitor_compliance(env: &ToolEnv<'_>, p: ComplianceParams) -> ToolResult<AnalysisRequest> {
    let entity = match p.entity_type {
        ComplianceEntity::Job => fetch_job(env.conn, env.account(), &p.entity_id)?,
        ComplianceEntity::Invoice => fetch_invoice(env.conn, env.account(), &p.entity_id)?,
        ComplianceEntity::Communication => fetch_conversation(env.conn, env.account(), &p.entity_id)?,
        ComplianceEntity::Contract => json!({ "id": p.entity_id }),
    };

    let mut request = analysis(
        "compliance",
        Some(p.entity_type.as_str()),
        Some(p.entity_id.clone()),
        "Check the entity given for compliance. Return JSON: {\"isCompliant\": boolean, \
         \"complianceScore\": 0-100, \"violations\": string[], \"requiredActions\": string[], \
         \"documentationNeeded\": string[], \"riskLevel\": \"low/medium/high/critical\", \
         \"recommendations\": string[]}"
            .to_string(),
        format!(
            "Check {} compliance for {} {}:\nEntity Data: {}",
            p.compliance_type,
            p.entity_type.as_str(),
            p.entity_id,
            serde_json::to_string(&entity)?
        ),
        "compliance",
        "checkId",
    );
    request.extra.insert("entityType".into(), json!(p.entity_type.as_str()));
    request.extra.insert("entityId".into(), json!(p.entity_id));
    Ok(request)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn risk_level_thresholds() {
        let mut out = Map::new();
        risk_level(&json!({"overallRisk": 80}), &mut out);
        assert_eq!(out["riskLevel"], "high");
        risk_level(&json!({"overallRisk": 51}), &mut out);
        assert_eq!(out["riskLevel"], "medium");
        risk_level(&json!({}), &mut out);
        assert_eq!(out["riskLevel"], "low");
    }

    #[test]
    fn pricing_adjustment_is_relative_to_base() {
        let mut out = Map::new();
        out.insert("originalPrice".into(), json!(200.0));
        price_adjustment(&json!({"adjustedPrice": 230.5}), &mut out);
        assert_eq!(out["adjustment"], json!(30.5));
    }

    #[test]
    fn missing_trend_reads_as_stable() {
        let mut out = Map::new();
        sentiment_trend(&json!({"score": 0.4}), &mut out);
        assert_eq!(out["trend"], "stable");
    }
}
