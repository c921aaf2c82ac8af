//! Model-backed analysis tools. Each gathers records into a prompt; the dispatcher
//! sends it to the analysis model and stores the answer.

use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::{Map, Value};

use super::Catalog;
use crate::crm::ai;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Urgency {
    Low,
    Medium,
    High,
    Emergency,
}

impl Urgency {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Emergency => "emergency",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Complexity {
    Low,
    Medium,
    High,
}

impl Complexity {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum ComplianceEntity {
    Job,
    Invoice,
    Contract,
    Communication,
}

impl ComplianceEntity {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Job => "job",
            Self::Invoice => "invoice",
            Self::Contract => "contract",
            Self::Communication => "communication",
        }
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct EstimateJobParams {
    #[schemars(description = "Type of job (e.g., plumbing, electrical, HVAC)")]
    pub job_type: String,
    #[schemars(description = "Detailed description of the work")]
    pub description: String,
    #[schemars(description = "Job location")]
    pub location: String,
    #[schemars(description = "Urgency level")]
    pub urgency: Option<Urgency>,
    #[schemars(description = "List of reported issues")]
    pub reported_issues: Option<Vec<String>>,
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SentimentParams {
    #[schemars(description = "UUID or name of the contact, or \"last\" or \"current\" for context")]
    pub contact_id: String,
    #[schemars(description = "Number of days to analyze (default: 30)")]
    pub timeframe: Option<String>,
    #[schemars(description = "Include email messages in the analysis")]
    pub include_emails: Option<bool>,
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct MaintenanceParams {
    #[schemars(description = "Equipment identifier")]
    pub equipment_id: String,
    #[schemars(description = "Type of equipment (e.g., furnace, water heater)")]
    pub equipment_type: String,
    #[schemars(description = "Date of last maintenance")]
    pub last_maintenance: Option<String>,
    #[schemars(description = "Total usage hours")]
    pub usage_hours: Option<f64>,
    #[schemars(description = "Recently reported issues")]
    pub reported_issues: Option<Vec<String>>,
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PricingParams {
    #[schemars(description = "UUID of the job or \"last\" or \"current\" for context")]
    pub job_id: String,
    #[schemars(description = "Base price in dollars")]
    pub base_price: f64,
    #[schemars(description = "Additional pricing factors (demand, season, customer value, ...)")]
    pub factors: Option<Map<String, Value>>,
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RiskParams {
    #[schemars(description = "UUID of the job or \"last\" or \"current\" for context")]
    pub job_id: String,
    #[schemars(description = "Type of job")]
    pub job_type: String,
    #[schemars(description = "Job location")]
    pub location: Option<String>,
    #[schemars(description = "Job complexity")]
    pub complexity: Option<Complexity>,
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ChurnParams {
    #[schemars(description = "UUID or name of the contact, or \"last\" or \"current\" for context")]
    pub contact_id: String,
    #[schemars(description = "Include the customer's service history")]
    pub include_history: Option<bool>,
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CoachingParams {
    #[schemars(description = "Description of the sales situation")]
    pub context: String,
    #[schemars(description = "Conversation to analyze (optional)")]
    pub conversation_id: Option<String>,
    #[schemars(description = "UUID of the sales person (optional)")]
    pub sales_person_id: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ComplianceParams {
    #[schemars(description = "Type of entity to check")]
    pub entity_type: ComplianceEntity,
    #[schemars(description = "ID of the entity")]
    pub entity_id: String,
    #[schemars(description = "Compliance area (e.g., safety, licensing, data privacy)")]
    pub compliance_type: String,
}

pub fn register(catalog: &mut Catalog) {
    catalog.model(
        "ai_estimate_job",
        "AI-powered job estimation using historical data. Use this when user asks \"How long will this job take?\" or \"How much should I charge?\"",
        ai::ai_estimate_job,
    );
    catalog.model(
        "analyze_customer_sentiment",
        "Analyze customer sentiment from conversations and job history",
        ai::analyze_customer_sentiment,
    );
    catalog.model(
        "predict_equipment_maintenance",
        "Predict when equipment will need maintenance",
        ai::predict_equipment_maintenance,
    );
    catalog.model(
        "calculate_dynamic_pricing",
        "Calculate an adjusted price for a job from market data and pricing factors",
        ai::calculate_dynamic_pricing,
    );
    catalog.model(
        "assess_job_risk",
        "Assess safety, financial, and reputation risks of a job",
        ai::assess_job_risk,
    );
    catalog.model(
        "predict_customer_churn",
        "Predict the risk of losing a customer and suggest retention actions",
        ai::predict_customer_churn,
    );
    catalog.model(
        "provide_sales_coaching",
        "Provide sales coaching for a conversation or situation",
        ai::provide_sales_coaching,
    );
    catalog.model(
        "monitor_compliance",
        "Check a job, invoice, contract, or communication for compliance issues",
        ai::monitor_compliance,
    );
}
