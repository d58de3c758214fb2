//! ChatRelay configuration management

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main ChatRelay configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RelayConfig {
    /// Listener and transport configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Agent backend configuration
    #[serde(default)]
    pub agent: AgentConfig,

    /// Relay protocol settings
    #[serde(default)]
    pub relay: RelaySettings,
}

impl RelayConfig {
    /// Load configuration from a TOML file, or defaults when no path is given.
    ///
    /// Environment overrides are applied on top in both cases.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => {
                let content = std::fs::read_to_string(path)?;
                Self::from_toml(&content)?
            }
            None => Self::default(),
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Parse configuration from a TOML string
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(e.to_string()))
    }

    /// Render the configuration as pretty TOML
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))
    }

    /// Apply `PORT`, `CHATRELAY_HOST` and `OPENAI_BASE_URL` overrides.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(port) = lookup("PORT") {
            match port.parse() {
                Ok(port) => self.server.port = port,
                Err(_) => tracing::warn!(value = %port, "Ignoring invalid PORT override"),
            }
        }
        if let Some(host) = lookup("CHATRELAY_HOST") {
            self.server.host = host;
        }
        if let Some(base_url) = lookup("OPENAI_BASE_URL") {
            self.agent.base_url = base_url;
        }
    }
}

/// Listener configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,

    /// Origins allowed to open cross-origin requests
    pub allowed_origins: Vec<String>,

    /// WebSocket ping interval in seconds (0 = never ping)
    pub ws_ping_interval: u64,

    /// Maximum concurrent connections
    pub max_connections: usize,
}

impl ServerConfig {
    /// `host:port` string suitable for binding
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 5010,
            allowed_origins: vec!["http://localhost:3010".to_string()],
            ws_ping_interval: 30,
            max_connections: 1000,
        }
    }
}

/// Agent backend provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentProvider {
    /// OpenAI-compatible chat completions endpoint
    #[default]
    Openai,

    /// Offline echo backend
    Echo,
}

/// Agent backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Which backend to construct
    pub provider: AgentProvider,

    /// Model identifier
    pub model: String,

    /// Base URL of the OpenAI-compatible API (without `/v1`)
    pub base_url: String,

    /// Name of the environment variable holding the API key
    pub api_key_ref: String,

    /// Optional system prompt sent with every request
    pub system_prompt: Option<String>,

    /// HTTP request timeout in seconds
    pub request_timeout_secs: u64,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            provider: AgentProvider::Openai,
            model: "gpt-4o".to_string(),
            base_url: "https://api.openai.com".to_string(),
            api_key_ref: "openai_api_key".to_string(),
            system_prompt: None,
            request_timeout_secs: 300,
        }
    }
}

/// Relay protocol settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelaySettings {
    /// Deadline for one agent call in seconds (0 = no deadline)
    pub agent_timeout_secs: u64,

    /// Fixed text sent to clients when an agent call fails
    pub error_message: String,
}

impl RelaySettings {
    /// Agent call deadline, if any
    pub fn agent_timeout(&self) -> Option<std::time::Duration> {
        (self.agent_timeout_secs > 0)
            .then(|| std::time::Duration::from_secs(self.agent_timeout_secs))
    }
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            agent_timeout_secs: 120,
            error_message: "Sorry, I encountered an error processing your request.".to_string(),
        }
    }
}

/// Load `KEY=value` pairs from a dotenv file into the process environment.
///
/// With no path, `.env` is searched for from the working directory upward.
/// Variables already set in the environment are left alone. Returns the
/// loaded file, or `None` when there is none.
pub fn load_env_file(path: Option<&Path>) -> Result<Option<PathBuf>> {
    let loaded = match path {
        Some(path) => dotenvy::from_path(path).map(|()| path.to_path_buf()),
        None => dotenvy::dotenv(),
    };
    match loaded {
        Ok(path) => Ok(Some(path)),
        Err(e) if e.not_found() => Ok(None),
        Err(e) => Err(Error::Config(format!("Failed to load env file: {}", e))),
    }
}

/// Resolve the agent API key from the environment.
///
/// `api_key_ref` names an environment variable (e.g. `"openai_api_key"` →
/// reads `$openai_api_key`, then `$OPENAI_API_KEY`).
pub fn resolve_api_key(agent: &AgentConfig) -> Option<String> {
    std::env::var(&agent.api_key_ref)
        .or_else(|_| std::env::var(agent.api_key_ref.to_uppercase()))
        .ok()
}
