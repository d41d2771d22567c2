use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfig {
    /// Server base URL for metric reports.
    #[serde(default = "default_server_url")]
    pub server_url: String,
    /// When set, metrics are delivered over gRPC to this endpoint instead
    /// of HTTP.
    #[serde(default)]
    pub grpc_addr: String,
    /// Poller period in seconds.
    #[serde(default = "default_poll_interval")]
    pub poll_interval: u64,
    /// Sender period in seconds.
    #[serde(default = "default_report_interval")]
    pub report_interval: u64,
    /// Upper bound on concurrently in-flight deliveries.
    #[serde(default = "default_rate_limit")]
    pub rate_limit: usize,
    /// Send metrics as one batch; `false` falls back to one request per
    /// metric.
    #[serde(default = "default_batch")]
    pub batch: bool,
    /// Shared HMAC secret. Empty disables body signatures.
    #[serde(default)]
    pub key: String,
    /// Path to the server's public key PEM. Empty disables encryption.
    #[serde(default)]
    pub crypto_key: String,
    /// Host IP carried in `X-Real-IP`. Empty triggers dynamic detection.
    #[serde(default)]
    pub host_ip: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_server_url() -> String {
    "http://localhost:8080".to_string()
}

fn default_poll_interval() -> u64 {
    2
}

fn default_report_interval() -> u64 {
    10
}

fn default_rate_limit() -> usize {
    1
}

fn default_batch() -> bool {
    true
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            server_url: default_server_url(),
            grpc_addr: String::new(),
            poll_interval: default_poll_interval(),
            report_interval: default_report_interval(),
            rate_limit: default_rate_limit(),
            batch: default_batch(),
            key: String::new(),
            crypto_key: String::new(),
            host_ip: String::new(),
            log_level: default_log_level(),
        }
    }
}

impl AgentConfig {
    /// Loads the TOML config at `path`; a missing file yields the defaults.
    pub fn load(path: &str) -> anyhow::Result<Self> {
        if !Path::new(path).exists() {
            tracing::warn!(path, "config file not found, using defaults");
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }
}
