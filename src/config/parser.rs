use std::path::Path;

use serde::{Deserialize, Serialize};

use super::ConfigError;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub bridge: BridgeConfig,
    pub matrix: MatrixConfig,
    pub chat: ChatConfig,
    #[serde(default)]
    pub web: WebConfig,
    #[serde(default)]
    pub state: StateConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BridgeConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default = "default_local_bridge_username")]
    pub local_bridge_username: String,
    /// JSON-encoded mapping list; malformed content degrades to an empty
    /// list at the point of use, never a startup failure.
    #[serde(default)]
    pub channel_mappings: String,
    #[serde(default = "default_idle_pause_ms")]
    pub idle_pause_ms: u64,
    #[serde(default = "default_error_backoff_ms")]
    pub error_backoff_ms: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MatrixConfig {
    pub homeserver_url: String,
    #[serde(default)]
    pub access_token: String,
    /// The bridge's own Matrix account; inbound events from it are echoes.
    pub bot_user_id: String,
    #[serde(default)]
    pub extra_header_name: Option<String>,
    #[serde(default)]
    pub extra_header_value: Option<String>,
    #[serde(default = "default_sync_timeout_ms")]
    pub sync_timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChatConfig {
    pub base_url: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_api_username")]
    pub api_username: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WebConfig {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub webhook_secret: String,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_port(),
            webhook_secret: String::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StateConfig {
    #[serde(default = "default_cursor_path")]
    pub cursor_path: String,
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            cursor_path: default_cursor_path(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Config {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::load_from_str(&content)
    }

    pub fn load_from_str(content: &str) -> Result<Self, ConfigError> {
        let mut config: Config = serde_yaml::from_str(content)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.matrix.homeserver_url.is_empty() {
            return Err(ConfigError::InvalidConfig(
                "matrix.homeserver_url cannot be empty".to_string(),
            ));
        }

        if self.matrix.access_token.is_empty() {
            return Err(ConfigError::InvalidConfig(
                "matrix.access_token cannot be empty".to_string(),
            ));
        }

        if self.matrix.bot_user_id.is_empty() {
            return Err(ConfigError::InvalidConfig(
                "matrix.bot_user_id cannot be empty".to_string(),
            ));
        }

        if self.chat.base_url.is_empty() {
            return Err(ConfigError::InvalidConfig(
                "chat.base_url cannot be empty".to_string(),
            ));
        }

        if self.bridge.local_bridge_username.is_empty() {
            return Err(ConfigError::InvalidConfig(
                "bridge.local_bridge_username cannot be empty".to_string(),
            ));
        }

        if self.web.port == 0 {
            return Err(ConfigError::InvalidConfig(
                "web.port must be between 1 and 65535".to_string(),
            ));
        }

        Ok(())
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(value) = std::env::var("MATRIX_BRIDGE_ACCESS_TOKEN") {
            self.matrix.access_token = value;
        }
        if let Ok(value) = std::env::var("MATRIX_BRIDGE_CHAT_API_KEY") {
            self.chat.api_key = value;
        }
        if let Ok(value) = std::env::var("MATRIX_BRIDGE_WEBHOOK_SECRET") {
            self.web.webhook_secret = value;
        }
    }
}

fn default_enabled() -> bool {
    true
}

fn default_local_bridge_username() -> String {
    "matrix_bridge".to_string()
}

fn default_idle_pause_ms() -> u64 {
    1000
}

fn default_error_backoff_ms() -> u64 {
    10000
}

fn default_sync_timeout_ms() -> u64 {
    25000
}

fn default_api_username() -> String {
    "system".to_string()
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    9006
}

fn default_cursor_path() -> String {
    "bridge-state.json".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}
