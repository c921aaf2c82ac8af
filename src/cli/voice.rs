use anyhow::Result;

use crm_mcp::config::CrmConfig;
use crm_mcp::voice::{VoiceAgent, VoiceRequest};

/// Run a single voice command through the full pipeline.
pub async fn run(config: &CrmConfig, text: &str, account: Option<String>) -> Result<()> {
    let dispatcher = crm_mcp::server::build_dispatcher(config)?;
    let agent = VoiceAgent::from_config(dispatcher, config.voice.clone(), config.llm.timeout_secs)?;

    let request = VoiceRequest {
        account_id: Some(account.unwrap_or_else(|| config.storage.default_account_id.clone())),
        transcription: Some(text.to_string()),
        ..Default::default()
    };

    match agent.handle(request).await {
        Ok(response) => {
            println!("{}", response.response);
            for call in &response.calls {
                let outcome = if call.success { "ok" } else { "failed" };
                eprintln!("  {} {} {}", call.action, call.params, outcome);
            }
            Ok(())
        }
        Err(e) => anyhow::bail!("voice command failed ({}): {e}", e.status()),
    }
}
