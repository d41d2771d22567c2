use crate::config::ServerConfig;
use crate::dumper::Dumper;
use crate::ingest::Ingest;
use crate::middleware::TrustedSubnet;
use std::sync::Arc;
use vitals_crypto::Decryptor;
use vitals_storage::Storage;

/// Shared server state handed to every handler and middleware.
#[derive(Clone)]
pub struct AppState {
    pub ingest: Arc<Ingest>,
    pub storage: Arc<dyn Storage>,
    pub dumper: Arc<Dumper>,
    /// Shared HMAC secret; `None` disables integrity checks.
    pub key: Option<Arc<String>>,
    /// Private-key decryptor; `None` disables body decryption.
    pub decryptor: Option<Arc<Decryptor>>,
    /// CIDR allow-list; `None` accepts all clients.
    pub trusted_subnet: Option<TrustedSubnet>,
}

impl AppState {
    /// Assembles the state from config, loading the private key and parsing
    /// the trusted subnet when configured.
    pub fn build(
        storage: Arc<dyn Storage>,
        dumper: Arc<Dumper>,
        cfg: &ServerConfig,
    ) -> anyhow::Result<Self> {
        let decryptor = if cfg.crypto_key.is_empty() {
            None
        } else {
            Some(Arc::new(Decryptor::from_pem_file(&cfg.crypto_key)?))
        };

        let trusted_subnet = if cfg.trusted_subnet.is_empty() {
            None
        } else {
            Some(cfg.trusted_subnet.parse::<TrustedSubnet>()?)
        };

        Ok(Self {
            ingest: Arc::new(Ingest::new(storage.clone())),
            storage,
            dumper,
            key: (!cfg.key.is_empty()).then(|| Arc::new(cfg.key.clone())),
            decryptor,
            trusted_subnet,
        })
    }
}
