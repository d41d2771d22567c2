use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// HTTP listen address.
    #[serde(default = "default_server_addr")]
    pub server_addr: String,
    /// Optional gRPC listen address; empty disables the gRPC surface.
    #[serde(default)]
    pub grpc_addr: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Shared HMAC secret. Empty disables integrity checks and response
    /// signing.
    #[serde(default)]
    pub key: String,
    /// Path to the server's private key PEM. Empty disables decryption.
    #[serde(default)]
    pub crypto_key: String,
    /// CIDR allow-list for agents. Empty accepts all clients.
    #[serde(default)]
    pub trusted_subnet: String,
    /// When set, the relational backend is selected instead of the
    /// in-memory one.
    #[serde(default)]
    pub database_dsn: String,
    /// Dump file path. Empty disables the dumper entirely.
    #[serde(default = "default_file_storage_path")]
    pub file_storage_path: String,
    /// Seconds between snapshots: 0 = synchronous after each mutation,
    /// > 0 = timer, < 0 = disabled.
    #[serde(default = "default_store_interval")]
    pub store_interval: i64,
    /// Restore previously dumped metrics at boot.
    #[serde(default = "default_restore")]
    pub restore: bool,
}

fn default_server_addr() -> String {
    "localhost:8080".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_file_storage_path() -> String {
    "/tmp/metrics-db.json".to_string()
}

fn default_store_interval() -> i64 {
    300
}

fn default_restore() -> bool {
    true
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            server_addr: default_server_addr(),
            grpc_addr: String::new(),
            log_level: default_log_level(),
            key: String::new(),
            crypto_key: String::new(),
            trusted_subnet: String::new(),
            database_dsn: String::new(),
            file_storage_path: default_file_storage_path(),
            store_interval: default_store_interval(),
            restore: default_restore(),
        }
    }
}

impl ServerConfig {
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

    /// Config safe for tests: dumper disabled, no restore.
    pub fn testing() -> Self {
        Self {
            file_storage_path: String::new(),
            store_interval: -1,
            restore: false,
            ..Self::default()
        }
    }
}
