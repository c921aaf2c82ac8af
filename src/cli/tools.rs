use anyhow::{Context, Result};
use serde_json::Value;

use crm_mcp::config::CrmConfig;
use crm_mcp::tools::{CallerContext, Catalog, ToolCallRequest};

/// Print the catalog.
pub fn list(as_json: bool) -> Result<()> {
    let catalog = Catalog::builtin();
    if as_json {
        let definitions: Vec<_> = catalog.definitions().collect();
        println!("{}", serde_json::to_string_pretty(&definitions)?);
        return Ok(());
    }

    println!("{} tools", catalog.len());
    println!("{}", "=".repeat(40));
    for def in catalog.definitions() {
        let required = def.required();
        if required.is_empty() {
            println!("  {}", def.name);
        } else {
            println!("  {} ({})", def.name, required.join(", "));
        }
        println!("      {}", def.description);
    }
    Ok(())
}

/// Call one tool against the local database and print the result envelope.
pub async fn call(
    config: &CrmConfig,
    name: &str,
    args: &str,
    account: Option<String>,
    user: Option<String>,
) -> Result<()> {
    let arguments: Value = serde_json::from_str(args).context("--args must be a JSON object")?;
    let dispatcher = crm_mcp::server::build_dispatcher(config)?;

    let context = CallerContext {
        user_id: user,
        ..CallerContext::for_account(account.unwrap_or_else(|| config.storage.default_account_id.clone()))
    };
    let result = dispatcher
        .dispatch(ToolCallRequest {
            tool_name: name.to_string(),
            arguments,
            context,
        })
        .await;

    println!("{}", serde_json::to_string_pretty(&result)?);
    anyhow::ensure!(result.success, "tool call failed");
    Ok(())
}
