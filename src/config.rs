use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct CrmConfig {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub llm: LlmConfig,
    pub voice: VoiceConfig,
    pub memory: MemoryConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub transport: String,
    pub host: String,
    pub port: u16,
    pub log_level: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StorageConfig {
    pub db_path: String,
    pub default_account_id: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LlmConfig {
    /// `"openai"` (any OpenAI-compatible endpoint) or `"none"`.
    pub provider: String,
    pub base_url: String,
    pub api_key: Option<String>,
    pub voice_model: String,
    pub summary_model: String,
    pub analysis_model: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct VoiceConfig {
    /// Remote MCP endpoint tried before local dispatch. `None` runs everything in-process.
    pub mcp_url: Option<String>,
    /// Ask the model to phrase confirmations instead of using canned text.
    pub summarize: bool,
    /// Prior turns forwarded to the intent parser.
    pub max_history_turns: usize,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct MemoryConfig {
    pub window_hours: i64,
    pub history_limit: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            transport: "stdio".into(),
            host: "127.0.0.1".into(),
            port: 8787,
            log_level: "info".into(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        let db_path = default_crm_dir()
            .join("crm.db")
            .to_string_lossy()
            .into_owned();
        Self {
            db_path,
            default_account_id: "default".into(),
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "openai".into(),
            base_url: "https://api.openai.com".into(),
            api_key: None,
            voice_model: "gpt-4o-mini".into(),
            summary_model: "gpt-4o-mini".into(),
            analysis_model: "gpt-4o".into(),
            timeout_secs: 30,
        }
    }
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            mcp_url: None,
            summarize: true,
            max_history_turns: 10,
        }
    }
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            window_hours: 72,
            history_limit: 50,
        }
    }
}

/// Returns `~/.crm-mcp/`, falling back to the working directory when no home exists.
pub fn default_crm_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".crm-mcp")
}

/// Returns the default config file path: `~/.crm-mcp/config.toml`
pub fn default_config_path() -> PathBuf {
    default_crm_dir().join("config.toml")
}

impl CrmConfig {
    /// Load config from TOML file (if it exists) then apply env var overrides.
    pub fn load() -> Result<Self> {
        Self::load_from(default_config_path())
    }

    /// Load from a specific path, then apply env var overrides.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            let contents =
                std::fs::read_to_string(path).context("failed to read config file")?;
            toml::from_str(&contents).context("failed to parse config TOML")?
        } else {
            info!("no config file at {}, using defaults", path.display());
            CrmConfig::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides.
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("CRM_DB") {
            self.storage.db_path = val;
        }
        if let Ok(val) = std::env::var("CRM_ACCOUNT") {
            self.storage.default_account_id = val;
        }
        if let Ok(val) = std::env::var("CRM_LOG_LEVEL") {
            self.server.log_level = val;
        }
        if let Ok(val) = std::env::var("CRM_MCP_URL") {
            self.voice.mcp_url = Some(val);
        }
        if let Ok(val) = std::env::var("CRM_LLM_BASE_URL") {
            self.llm.base_url = val;
        }
        if let Ok(val) = std::env::var("OPENAI_API_KEY") {
            if !val.is_empty() {
                self.llm.api_key = Some(val);
            }
        }
    }

    /// Resolve the database path, expanding `~` if needed.
    pub fn resolved_db_path(&self) -> PathBuf {
        expand_tilde(&self.storage.db_path)
    }
}

pub fn expand_tilde(path: &str) -> PathBuf {
    match (path.strip_prefix("~/"), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(path),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = CrmConfig::default();
        assert_eq!(config.server.transport, "stdio");
        assert_eq!(config.server.log_level, "info");
        assert_eq!(config.storage.default_account_id, "default");
        assert_eq!(config.memory.window_hours, 72);
        assert_eq!(config.memory.history_limit, 50);
        assert!(config.storage.db_path.ends_with("crm.db"));
        assert!(config.voice.mcp_url.is_none());
    }

    #[test]
    fn parse_toml_config() {
        let toml_str = r#"
[server]
log_level = "debug"
port = 9000

[storage]
db_path = "/tmp/test.db"
default_account_id = "acme"

[voice]
mcp_url = "http://localhost:9000/mcp"
"#;
        let config: CrmConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.server.log_level, "debug");
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.storage.db_path, "/tmp/test.db");
        assert_eq!(config.storage.default_account_id, "acme");
        assert_eq!(
            config.voice.mcp_url.as_deref(),
            Some("http://localhost:9000/mcp")
        );
        // defaults still apply for unset fields
        assert_eq!(config.memory.window_hours, 72);
        assert_eq!(config.llm.voice_model, "gpt-4o-mini");
    }

    #[test]
    fn env_overrides_apply() {
        let mut config = CrmConfig::default();
        std::env::set_var("CRM_DB", "/tmp/override.db");
        std::env::set_var("CRM_ACCOUNT", "env-account");
        std::env::set_var("CRM_LOG_LEVEL", "trace");

        config.apply_env_overrides();

        assert_eq!(config.storage.db_path, "/tmp/override.db");
        assert_eq!(config.storage.default_account_id, "env-account");
        assert_eq!(config.server.log_level, "trace");

        // Clean up
        std::env::remove_var("CRM_DB");
        std::env::remove_var("CRM_ACCOUNT");
        std::env::remove_var("CRM_LOG_LEVEL");
    }

    #[test]
    fn expand_tilde_leaves_absolute_paths() {
        assert_eq!(expand_tilde("/var/crm.db"), PathBuf::from("/var/crm.db"));
    }
}
