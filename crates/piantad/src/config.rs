//! Configuration management for piantad.
//!
//! Loads settings from /etc/pianta/config.toml (or `PIANTA_CONFIG`), then
//! applies environment overrides. Secrets usually come from the environment.

use anyhow::{bail, Context, Result};
use pianta_shared::CONFIG_PATH;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::{info, warn};

/// Environment variable pointing at an alternate config file
pub const CONFIG_ENV: &str = "PIANTA_CONFIG";

/// HTTP listener configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_listen")]
    pub listen: String,
}

fn default_listen() -> String {
    "127.0.0.1:7870".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
        }
    }
}

/// Model provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Primary model
    #[serde(default = "default_model")]
    pub model: String,

    /// Tried once when the primary model is not found / not deployed
    #[serde(default)]
    pub fallback_model: Option<String>,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Per-call timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Usually set through ANTHROPIC_API_KEY
    #[serde(default)]
    pub api_key: String,
}

fn default_model() -> String {
    "claude-sonnet-4-5".to_string()
}

fn default_max_tokens() -> u32 {
    700
}

fn default_timeout() -> u64 {
    60
}

fn default_base_url() -> String {
    "https://api.anthropic.com".to_string()
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            fallback_model: None,
            max_tokens: default_max_tokens(),
            timeout_secs: default_timeout(),
            base_url: default_base_url(),
            api_key: String::new(),
        }
    }
}

/// Persistence configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_db_path")]
    pub db_path: String,

    /// Stored turns read back per request
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,

    /// Readings used for the moisture trend
    #[serde(default = "default_readings_limit")]
    pub readings_limit: usize,
}

fn default_db_path() -> String {
    format!("{}/pianta.db", pianta_shared::STATE_DIR)
}

fn default_history_limit() -> usize {
    10
}

fn default_readings_limit() -> usize {
    24
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            history_limit: default_history_limit(),
            readings_limit: default_readings_limit(),
        }
    }
}

/// Shared secrets. Empty means the check is disabled.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthConfig {
    #[serde(default)]
    pub chat_secret: String,

    #[serde(default)]
    pub ingest_secret: String,
}

/// Full daemon configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DaemonConfig {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub llm: LlmConfig,

    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub auth: AuthConfig,
}

impl DaemonConfig {
    /// Load config file (or defaults) and apply environment overrides.
    pub fn load() -> Self {
        let path = std::env::var(CONFIG_ENV).unwrap_or_else(|_| CONFIG_PATH.to_string());
        let mut config = Self::load_from_path(&path).unwrap_or_else(|e| {
            warn!("Config not loaded from {}, using defaults: {}", path, e);
            DaemonConfig::default()
        });
        config.apply_env(|key| std::env::var(key).ok());
        config
    }

    /// Load config from specific path
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let config: DaemonConfig = toml::from_str(&content)?;
        info!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Environment wins over the file. Empty values are ignored.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        if let Some(v) = get("ANTHROPIC_API_KEY") {
            self.llm.api_key = v;
        }
        if let Some(v) = get("ANTHROPIC_MODEL") {
            self.llm.model = v;
        }
        if let Some(v) = get("ANTHROPIC_FALLBACK_MODEL") {
            self.llm.fallback_model = Some(v);
        }
        if let Some(v) = get("CHAT_SECRET") {
            self.auth.chat_secret = v;
        }
        if let Some(v) = get("INGEST_SECRET") {
            self.auth.ingest_secret = v;
        }
        if let Some(v) = get("PIANTA_DB_PATH") {
            self.store.db_path = v;
        }
        if let Some(v) = get("PIANTA_LISTEN") {
            self.server.listen = v;
        }
    }

    /// Refuse to start without the settings every chat request needs.
    pub fn validate(&self) -> Result<()> {
        if self.llm.api_key.trim().is_empty() {
            bail!("Missing env vars: ANTHROPIC_API_KEY is not set");
        }
        if self.llm.model.trim().is_empty() {
            bail!("llm.model must not be empty");
        }
        if self.store.history_limit == 0 {
            bail!("store.history_limit must be at least 1");
        }
        Ok(())
    }
}
