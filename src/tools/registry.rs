//! The tool catalog: one definition and one handler per tool name.
//!
//! Definitions carry a JSON schema generated from each tool's typed parameter struct,
//! so the schema advertised to MCP clients and to the intent parser is the same one
//! that arguments are deserialized against.

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::Connection;
use schemars::generate::SchemaSettings;
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use super::{CallerContext, Dispatcher};
use crate::config::MemoryConfig;
use crate::error::{ToolError, ToolResult};
use crate::llm::FunctionSpec;
use crate::resolve::format_timestamp;

/// Name, description, and argument schema of one tool.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

impl ToolDefinition {
    pub fn function_spec(&self) -> FunctionSpec {
        FunctionSpec {
            name: self.name.clone(),
            description: self.description.clone(),
            parameters: self.input_schema.clone(),
        }
    }

    /// Property names listed under `required`.
    pub fn required(&self) -> Vec<&str> {
        self.input_schema
            .get("required")
            .and_then(Value::as_array)
            .map(|r| r.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default()
    }
}

/// Arguments of tools that take none.
#[derive(Debug, Default, serde::Deserialize, JsonSchema)]
pub struct NoParams {}

/// Knobs that handlers read but callers never pass.
#[derive(Debug, Clone)]
pub struct HandlerSettings {
    pub memory_window_hours: i64,
    pub history_limit: usize,
}

impl Default for HandlerSettings {
    fn default() -> Self {
        Self::from(&MemoryConfig::default())
    }
}

impl From<&MemoryConfig> for HandlerSettings {
    fn from(config: &MemoryConfig) -> Self {
        Self {
            memory_window_hours: config.window_hours,
            history_limit: config.history_limit,
        }
    }
}

/// Everything a store handler may touch. `conn` is the open transaction.
pub struct ToolEnv<'a> {
    pub conn: &'a Connection,
    pub caller: &'a CallerContext,
    pub now: DateTime<Utc>,
    pub settings: &'a HandlerSettings,
}

impl ToolEnv<'_> {
    pub fn account(&self) -> &str {
        &self.caller.account_id
    }

    pub fn user_id(&self) -> Option<&str> {
        self.caller.user_id.as_deref()
    }

    pub fn today(&self) -> NaiveDate {
        self.now.date_naive()
    }

    /// `now` in canonical storage form.
    pub fn timestamp(&self) -> String {
        format_timestamp(self.now)
    }
}

/// A prompt assembled from stored records, to be answered by the analysis model.
#[derive(Debug, Clone)]
pub struct AnalysisRequest {
    /// Stored in `ai_analyses.kind`.
    pub kind: &'static str,
    pub entity_type: Option<&'static str>,
    pub entity_id: Option<String>,
    pub system_prompt: String,
    pub prompt: String,
    /// Key under which the model output is returned.
    pub result_key: &'static str,
    /// Key under which the stored analysis ID is returned.
    pub id_key: &'static str,
    pub json_output: bool,
    /// Extra fields merged into the tool result.
    pub extra: Map<String, Value>,
    /// Computes further result fields from the model output.
    pub derive: Option<DeriveFn>,
}

pub type DeriveFn = fn(&Value, &mut Map<String, Value>);

pub type StoreFn = dyn Fn(&ToolEnv<'_>, Value) -> ToolResult<Value> + Send + Sync;
pub type PromptFn = dyn Fn(&ToolEnv<'_>, Value) -> ToolResult<AnalysisRequest> + Send + Sync;
pub type FlowFuture = Pin<Box<dyn Future<Output = ToolResult<Value>> + Send>>;
pub type FlowFn = dyn Fn(Dispatcher, CallerContext, Value) -> FlowFuture + Send + Sync;

#[derive(Clone)]
pub enum Handler {
    /// Runs against the store inside one transaction.
    Store(Arc<StoreFn>),
    /// Builds a prompt from the store; the dispatcher sends it to the model.
    Model(Arc<PromptFn>),
    /// Drives several store and model steps through the dispatcher.
    Flow(Arc<FlowFn>),
}

#[derive(Clone)]
pub struct ToolSpec {
    pub definition: ToolDefinition,
    pub handler: Handler,
}

#[derive(Default)]
pub struct Catalog {
    tools: Vec<ToolSpec>,
    index: HashMap<String, usize>,
}

impl Catalog {
    /// The full built-in catalog.
    pub fn builtin() -> Self {
        let mut catalog = Self::default();
        super::jobs::register(&mut catalog);
        super::contacts::register(&mut catalog);
        super::conversations::register(&mut catalog);
        super::field::register(&mut catalog);
        super::analytics::register(&mut catalog);
        super::billing::register(&mut catalog);
        super::people::register(&mut catalog);
        super::marketing::register(&mut catalog);
        super::memory::register(&mut catalog);
        super::ai::register(&mut catalog);
        super::automation::register(&mut catalog);
        tracing::debug!(count = catalog.len(), "tool catalog built");
        catalog
    }

    pub fn get(&self, name: &str) -> Option<&ToolSpec> {
        self.index.get(name).map(|&i| &self.tools[i])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Definitions in registration order.
    pub fn definitions(&self) -> impl Iterator<Item = &ToolDefinition> {
        self.tools.iter().map(|t| &t.definition)
    }

    pub fn function_specs(&self) -> Vec<FunctionSpec> {
        self.definitions().map(ToolDefinition::function_spec).collect()
    }

    /// Register a store-backed tool.
    pub fn store<P>(
        &mut self,
        name: &str,
        description: &str,
        handler: fn(&ToolEnv<'_>, P) -> ToolResult<Value>,
    ) where
        P: DeserializeOwned + JsonSchema + 'static,
    {
        let handler = store_fn(move |env, args| handler(env, parse_params::<P>(args)?));
        self.insert::<P>(name, description, Handler::Store(handler));
    }

    /// Register a model-backed tool.
    pub fn model<P>(
        &mut self,
        name: &str,
        description: &str,
        handler: fn(&ToolEnv<'_>, P) -> ToolResult<AnalysisRequest>,
    ) where
        P: DeserializeOwned + JsonSchema + 'static,
    {
        let handler = prompt_fn(move |env, args| handler(env, parse_params::<P>(args)?));
        self.insert::<P>(name, description, Handler::Model(handler));
    }

    /// Register a tool that runs its own sequence of store and model steps.
    pub fn flow<P, Fut>(&mut self, name: &str, description: &str, handler: fn(Dispatcher, CallerContext, P) -> Fut)
    where
        P: DeserializeOwned + JsonSchema + 'static,
        Fut: Future<Output = ToolResult<Value>> + Send + 'static,
    {
        let handler: Arc<FlowFn> = Arc::new(move |dispatcher, caller, args| -> FlowFuture {
            match parse_params::<P>(args) {
                Ok(params) => Box::pin(handler(dispatcher, caller, params)),
                Err(e) => Box::pin(std::future::ready(Err(e))),
            }
        });
        self.insert::<P>(name, description, Handler::Flow(handler));
    }

    fn insert<P: JsonSchema>(&mut self, name: &str, description: &str, handler: Handler) {
        debug_assert!(!self.index.contains_key(name), "duplicate tool {name}");
        self.index.insert(name.to_string(), self.tools.len());
        self.tools.push(ToolSpec {
            definition: ToolDefinition {
                name: name.to_string(),
                description: description.to_string(),
                input_schema: input_schema::<P>(),
            },
            handler,
        });
    }
}

fn store_fn<F>(f: F) -> Arc<StoreFn>
where
    F: Fn(&ToolEnv<'_>, Value) -> ToolResult<Value> + Send + Sync + 'static,
{
    Arc::new(f)
}

fn prompt_fn<F>(f: F) -> Arc<PromptFn>
where
    F: Fn(&ToolEnv<'_>, Value) -> ToolResult<AnalysisRequest> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Deserialize tool arguments; shape mismatches are validation errors.
pub fn parse_params<P: DeserializeOwned>(args: Value) -> ToolResult<P> {
    let args = if args.is_null() { json!({}) } else { args };
    serde_json::from_value(args).map_err(|e| ToolError::validation(format!("invalid arguments: {e}")))
}

/// Flat object schema for `P`, without the generator's title and meta keys.
pub fn input_schema<P: JsonSchema>() -> Value {
    let generator = SchemaSettings::draft07()
        .with(|s| {
            s.inline_subschemas = true;
            s.meta_schema = None;
        })
        .into_generator();
    let schema = generator.into_root_schema_for::<P>();
    let mut value = serde_json::to_value(schema).unwrap_or_else(|_| json!({"type": "object"}));
    if let Some(obj) = value.as_object_mut() {
        obj.remove("title");
        obj.remove("$schema");
        obj.remove("description");
        obj.entry("type").or_insert_with(|| json!("object"));
        obj.entry("properties").or_insert_with(|| json!({}));
    }
    value
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, JsonSchema)]
    #[serde(rename_all = "camelCase")]
    struct SampleParams {
        #[schemars(description = "UUID of the job")]
        job_id: String,
        note: Option<String>,
    }

    #[test]
    fn schema_is_flat_camel_case_object() {
        let schema = input_schema::<SampleParams>();
        assert_eq!(schema["type"], "object");
        assert!(schema.get("title").is_none());
        assert_eq!(schema["properties"]["jobId"]["description"], "UUID of the job");
        assert_eq!(schema["required"], json!(["jobId"]));
    }

    #[test]
    fn parse_params_reports_missing_fields_as_validation() {
        let err = parse_params::<SampleParams>(json!({"note": "x"})).unwrap_err();
        assert_eq!(err.kind(), "validation");
        assert!(err.to_string().contains("jobId"));
    }

    #[test]
    fn null_arguments_parse_as_empty_object() {
        #[derive(Debug, Deserialize, JsonSchema)]
        struct Empty {}
        assert!(parse_params::<Empty>(Value::Null).is_ok());
    }

    #[test]
    fn builtin_catalog_has_unique_names() {
        let catalog = Catalog::builtin();
        let mut names: Vec<&str> = catalog.definitions().map(|d| d.name.as_str()).collect();
        let total = names.len();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), total);
        assert!(catalog.len() >= 80);
        assert!(catalog.contains("create_job"));
        assert!(catalog.contains("read_agent_memory"));
    }

    #[test]
    fn every_definition_describes_an_object() {
        for def in Catalog::builtin().definitions() {
            assert_eq!(def.input_schema["type"], "object", "{}", def.name);
            assert!(!def.description.is_empty(), "{}", def.name);
        }
    }
}
