//! Shared types used across all Jeff-bot crates.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

use crate::error::ConfigError;

/// Environment variable holding the completion service credential.
pub const ENV_OPENAI_API_KEY: &str = "OPENAI_API_KEY";

/// Model requested from the completion service unless configured otherwise.
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// OpenAI chat completions endpoint.
pub const DEFAULT_LLM_API_URL: &str = "https://api.openai.com/v1/chat/completions";

/// Speaker of a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        };
        f.write_str(s)
    }
}

/// One conversation turn. Extra fields sent by the browser (ids, timestamps) are ignored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    #[serde(default)]
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

/// Global gateway configuration. Load from TOML or env.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreConfig {
    /// Display name used in logs and the status endpoint.
    pub app_name: String,
    /// Interface the gateway binds to.
    pub host: String,
    /// HTTP port for the gateway.
    pub port: u16,
    /// Model identifier sent with every completion request.
    pub llm_model: String,
    /// Chat completions endpoint (OpenAI-compatible).
    pub llm_api_url: String,
    /// Alternative knowledge document; the built-in team document is used when unset.
    #[serde(default)]
    pub knowledge_path: Option<String>,
    /// If true, the gateway serves the chat widget from `azbot-frontend/`.
    #[serde(default)]
    pub frontend_enabled: bool,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            app_name: "AZ Jeff-bot".to_string(),
            host: "127.0.0.1".to_string(),
            port: 3000,
            llm_model: DEFAULT_MODEL.to_string(),
            llm_api_url: DEFAULT_LLM_API_URL.to_string(),
            knowledge_path: None,
            frontend_enabled: true,
        }
    }
}

impl CoreConfig {
    /// Load config from file and environment. Precedence: env `AZBOT__*` > `AZBOT_CONFIG` file (default `config/gateway.toml`) > defaults.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path =
            std::env::var("AZBOT_CONFIG").unwrap_or_else(|_| "config/gateway.toml".to_string());
        Self::load_from(Path::new(&config_path))
    }

    /// Same as [`CoreConfig::load`] with an explicit file path. A missing file is not an error.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let builder = config::Config::builder()
            .set_default("app_name", defaults.app_name)?
            .set_default("host", defaults.host)?
            .set_default("port", i64::from(defaults.port))?
            .set_default("llm_model", defaults.llm_model)?
            .set_default("llm_api_url", defaults.llm_api_url)?
            .set_default("frontend_enabled", defaults.frontend_enabled)?;

        let builder = if path.exists() {
            builder.add_source(config::File::from(path))
        } else {
            builder
        };

        let built = builder
            .add_source(config::Environment::with_prefix("AZBOT").separator("__"))
            .build()?;

        Ok(built.try_deserialize()?)
    }
}

/// Reads the completion service credential. Absence is fatal at startup, never per request.
pub fn openai_api_key() -> Result<String, ConfigError> {
    std::env::var(ENV_OPENAI_API_KEY)
        .ok()
        .map(|k| k.trim().to_string())
        .filter(|k| !k.is_empty())
        .ok_or(ConfigError::MissingCredential(ENV_OPENAI_API_KEY))
}
