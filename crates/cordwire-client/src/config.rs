//! Client configuration: `[gateway]` and `[rest]` TOML sections.
//!
//! Every field has a default, so an empty or partial file is valid.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use cordwire_core::messages::{DEFAULT_LARGE_THRESHOLD, GATEWAY_VERSION};
use cordwire_core::{CordError, CordResult};

/// Top-level config file structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClientConfig {
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub rest: RestConfig,
}

impl ClientConfig {
    /// Load configuration from a TOML file, returning defaults if the file
    /// does not exist.
    pub fn load(path: impl AsRef<Path>) -> CordResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            debug!(path = %path.display(), "config file not found, using defaults");
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&content)
            .map_err(|e| CordError::Config(format!("{}: {e}", path.display())))?;
        debug!(path = %path.display(), "loaded config");
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> CordResult<Self> {
        toml::from_str(content).map_err(|e| CordError::Config(e.to_string()))
    }
}

/// `[gateway]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_api_version")]
    pub api_version: u8,
    #[serde(default = "default_large_threshold")]
    pub large_threshold: u32,
    /// Client name reported in the Identify `properties`.
    #[serde(default = "default_client_name")]
    pub browser: String,
    #[serde(default = "default_client_name")]
    pub device: String,
    /// Resume/identify attempts after a link failure before giving up.
    #[serde(default = "default_max_reconnect_attempts")]
    pub max_reconnect_attempts: u32,
    /// Base delay between reconnect attempts, doubled on each failure.
    #[serde(default = "default_reconnect_backoff_ms")]
    pub reconnect_backoff_ms: u64,
    /// Pause before a fresh Identify after the server invalidated the session.
    #[serde(default = "default_reidentify_delay_ms")]
    pub reidentify_delay_ms: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            api_version: default_api_version(),
            large_threshold: default_large_threshold(),
            browser: default_client_name(),
            device: default_client_name(),
            max_reconnect_attempts: default_max_reconnect_attempts(),
            reconnect_backoff_ms: default_reconnect_backoff_ms(),
            reidentify_delay_ms: default_reidentify_delay_ms(),
        }
    }
}

impl GatewayConfig {
    /// Full connection URL for a gateway base URL.
    pub fn endpoint(&self, gateway_url: &str) -> String {
        format!(
            "{}/?v={}&encoding=json",
            gateway_url.trim_end_matches('/'),
            self.api_version
        )
    }

    /// Backoff before reconnect attempt `attempt` (1-based), capped at one minute.
    pub fn reconnect_backoff(&self, attempt: u32) -> Duration {
        let factor = 1u64 << attempt.saturating_sub(1).min(6);
        Duration::from_millis(self.reconnect_backoff_ms.saturating_mul(factor))
            .min(Duration::from_secs(60))
    }

    pub fn reidentify_delay(&self) -> Duration {
        Duration::from_millis(self.reidentify_delay_ms)
    }
}

/// How the token is presented in the REST `Authorization` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Bot,
    Bearer,
}

impl TokenKind {
    pub fn authorization(&self, token: &str) -> String {
        match self {
            Self::Bot => format!("Bot {token}"),
            Self::Bearer => format!("Bearer {token}"),
        }
    }
}

/// `[rest]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RestConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_token_kind")]
    pub token_kind: TokenKind,
    /// Consult the rate limiter before sending.
    #[serde(default = "default_true")]
    pub ratelimit_prediction: bool,
    #[serde(default = "default_ratelimit_cache_size")]
    pub ratelimit_cache_size: usize,
    /// Sleep and retry on 429 instead of returning `QuotaExceeded`.
    #[serde(default = "default_true")]
    pub retry_on_quota: bool,
    /// Reopen-and-retry attempts when the connection drops mid-request.
    #[serde(default = "default_max_connection_retries")]
    pub max_connection_retries: u32,
    #[serde(default = "default_connection_retry_backoff_ms")]
    pub connection_retry_backoff_ms: u64,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for RestConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            user_agent: default_user_agent(),
            token_kind: default_token_kind(),
            ratelimit_prediction: true,
            ratelimit_cache_size: default_ratelimit_cache_size(),
            retry_on_quota: true,
            max_connection_retries: default_max_connection_retries(),
            connection_retry_backoff_ms: default_connection_retry_backoff_ms(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl RestConfig {
    /// Backoff before connection retry `attempt` (1-based).
    pub fn connection_retry_backoff(&self, attempt: u32) -> Duration {
        let factor = 1u64 << attempt.saturating_sub(1).min(6);
        Duration::from_millis(self.connection_retry_backoff_ms.saturating_mul(factor))
    }
}

fn default_api_version() -> u8 {
    GATEWAY_VERSION
}
fn default_large_threshold() -> u32 {
    DEFAULT_LARGE_THRESHOLD
}
fn default_client_name() -> String {
    "cordwire".to_string()
}
fn default_max_reconnect_attempts() -> u32 {
    5
}
fn default_reconnect_backoff_ms() -> u64 {
    1000
}
fn default_reidentify_delay_ms() -> u64 {
    1000
}
fn default_base_url() -> String {
    "https://discordapp.com/api/v6".to_string()
}
fn default_user_agent() -> String {
    concat!(
        "DiscordBot (",
        env!("CARGO_PKG_NAME"),
        ", ",
        env!("CARGO_PKG_VERSION"),
        ")"
    )
    .to_string()
}
fn default_token_kind() -> TokenKind {
    TokenKind::Bot
}
fn default_true() -> bool {
    true
}
fn default_ratelimit_cache_size() -> usize {
    100
}
fn default_max_connection_retries() -> u32 {
    3
}
fn default_connection_retry_backoff_ms() -> u64 {
    250
}
fn default_timeout_secs() -> u64 {
    30
}
