//! Report-side of the agent: merges poller snapshots and delivers them to
//! the server on every report tick.

use crate::config::AgentConfig;
use async_trait::async_trait;
use flate2::write::GzEncoder;
use flate2::Compression;
use reqwest::header::{CONTENT_ENCODING, CONTENT_TYPE};
use reqwest::StatusCode;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use vitals_collector::host::HostPoller;
use vitals_collector::runtime::RuntimePoller;
use vitals_collector::Snapshot;
use vitals_common::model::Metric;
use vitals_common::retry::{Retriable, Retrier};
use vitals_crypto::{signature, CryptoError, Encryptor};

pub const HASH_HEADER: &str = "HashSHA256";
pub const ENCRYPTION_HEADER: &str = "Content-Encryption";
pub const X_REAL_IP_HEADER: &str = "X-Real-IP";

/// Client-side timeout for a single delivery attempt.
const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Delivery transport used by the agent service.
#[async_trait]
pub trait MetricsSender: Send + Sync {
    /// Reports on every tick until shut down.
    async fn run(&self);

    /// Stops the ticker and performs one final delivery, bounded by
    /// `deadline`.
    async fn shutdown(&self, deadline: Duration) -> anyhow::Result<()>;
}

/// A single delivery attempt's failure.
#[derive(Debug, thiserror::Error)]
pub enum SendError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("unexpected response status '{status}', body: '{body}'")]
    Status { status: StatusCode, body: String },

    #[error("payload encoding failed: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("payload compression failed: {0}")]
    Compress(#[from] std::io::Error),

    #[error("payload encryption failed: {0}")]
    Encrypt(#[from] CryptoError),

    #[error("grpc delivery failed: {0}")]
    Grpc(#[from] tonic::Status),

    #[error("grpc connect failed: {0}")]
    GrpcConnect(#[from] tonic::transport::Error),
}

impl Retriable for SendError {
    fn is_retriable(&self) -> bool {
        match self {
            SendError::Transport(_) | SendError::GrpcConnect(_) => true,
            SendError::Status { status, .. } => status.is_server_error(),
            SendError::Grpc(status) => matches!(
                status.code(),
                tonic::Code::Unavailable | tonic::Code::DeadlineExceeded | tonic::Code::Aborted
            ),
            _ => false,
        }
    }
}

/// HTTP sender: gzip always, optional chunked RSA encryption and HMAC body
/// signature, deliveries bounded by a counting semaphore.
pub struct Sender {
    report_interval: Duration,
    url: String,
    key: Option<String>,
    host_ip: Option<String>,
    batch: bool,
    runtime_poller: Arc<RuntimePoller>,
    host_poller: Arc<HostPoller>,
    client: reqwest::Client,
    encryptor: Option<Encryptor>,
    semaphore: Arc<Semaphore>,
    retrier: Retrier,
    cancel: CancellationToken,
}

impl Sender {
    pub fn new(
        cfg: &AgentConfig,
        runtime_poller: Arc<RuntimePoller>,
        host_poller: Arc<HostPoller>,
    ) -> anyhow::Result<Self> {
        let encryptor = if cfg.crypto_key.is_empty() {
            tracing::warn!("no crypto key configured, encryption disabled");
            None
        } else {
            Some(Encryptor::from_pem_file(&cfg.crypto_key)?)
        };

        if cfg.host_ip.is_empty() {
            tracing::warn!("host IP unknown, X-Real-IP will not be set on outgoing requests");
        }

        let client = reqwest::Client::builder().timeout(HTTP_TIMEOUT).build()?;

        Ok(Self {
            report_interval: Duration::from_secs(cfg.report_interval),
            url: cfg.server_url.trim_end_matches('/').to_string(),
            key: (!cfg.key.is_empty()).then(|| cfg.key.clone()),
            host_ip: (!cfg.host_ip.is_empty()).then(|| cfg.host_ip.clone()),
            batch: cfg.batch,
            runtime_poller,
            host_poller,
            client,
            encryptor,
            semaphore: Arc::new(Semaphore::new(cfg.rate_limit.max(1))),
            retrier: Retrier::default(),
            cancel: CancellationToken::new(),
        })
    }

    /// Acquires both poller snapshots and merges them into one.
    fn collect(&self) -> Snapshot {
        let mut snapshot = self.runtime_poller.acquire_snapshot();
        snapshot.merge(&self.host_poller.acquire_snapshot());
        snapshot
    }

    async fn report(&self) {
        let snapshot = self.collect();
        if snapshot.is_empty() {
            tracing::debug!("nothing polled yet, skipping report");
            return;
        }

        let count = snapshot.len();
        let batch = snapshot.into_batch();

        if self.batch {
            if let Err(e) = self
                .retrier
                .run("send metrics batch", || self.send_batched(&batch))
                .await
            {
                tracing::error!(error = %e, "batched metrics report failed");
                return;
            }
        } else {
            let results =
                futures::future::join_all(batch.iter().map(|metric| self.send_one(metric))).await;
            for err in results.into_iter().filter_map(Result::err) {
                tracing::error!(error = %err, "metric update request failed");
            }
        }

        tracing::debug!(count, "metrics reported");
    }

    /// One delivery attempt for the whole batch. Holds a semaphore permit
    /// for the duration of the request.
    async fn send_batched(&self, batch: &[Metric]) -> Result<(), SendError> {
        let _permit = self
            .semaphore
            .acquire()
            .await
            .expect("delivery semaphore is never closed");

        let body = serde_json::to_vec(batch)?;
        let compressed = compress(&body)?;

        let (payload, encrypted) = match &self.encryptor {
            Some(encryptor) => (encryptor.encrypt(&compressed)?, true),
            None => (compressed, false),
        };

        let mut request = self
            .client
            .post(format!("{}/updates/", self.url))
            .header(CONTENT_TYPE, "application/json")
            .header(CONTENT_ENCODING, "gzip");

        if encrypted {
            request = request.header(ENCRYPTION_HEADER, "1");
        }
        if let Some(ip) = &self.host_ip {
            request = request.header(X_REAL_IP_HEADER, ip);
        }
        if let Some(key) = &self.key {
            // The signature covers the plaintext JSON, before compression
            // and encryption; the server verifies after reverting both.
            request = request.header(HASH_HEADER, signature::sign(key.as_bytes(), &body));
        }

        let response = request.body(payload).send().await?;
        check_status(response).await
    }

    /// One delivery attempt for a single metric via `POST /update/`.
    async fn send_one(&self, metric: &Metric) -> Result<(), SendError> {
        let _permit = self
            .semaphore
            .acquire()
            .await
            .expect("delivery semaphore is never closed");

        let body = serde_json::to_vec(metric)?;
        let compressed = compress(&body)?;

        let mut request = self
            .client
            .post(format!("{}/update/", self.url))
            .header(CONTENT_TYPE, "application/json")
            .header(CONTENT_ENCODING, "gzip");

        if let Some(ip) = &self.host_ip {
            request = request.header(X_REAL_IP_HEADER, ip);
        }

        let response = request.body(compressed).send().await?;
        check_status(response).await
    }
}

#[async_trait]
impl MetricsSender for Sender {
    async fn run(&self) {
        tracing::info!(interval = ?self.report_interval, url = %self.url, "sender started");
        let mut tick = tokio::time::interval(self.report_interval);
        // Consume the immediate first tick; reports start one interval in.
        tick.tick().await;

        loop {
            tokio::select! {
                _ = tick.tick() => self.report().await,
                _ = self.cancel.cancelled() => {
                    tracing::info!("sender stopped");
                    return;
                }
            }
        }
    }

    async fn shutdown(&self, deadline: Duration) -> anyhow::Result<()> {
        tracing::info!("stopping sender");
        self.cancel.cancel();

        let batch = self.collect().into_batch();
        match tokio::time::timeout(deadline, self.send_batched(&batch)).await {
            Err(_) => anyhow::bail!("sender shutdown deadline expired"),
            Ok(Err(e)) => {
                tracing::error!(error = %e, "final metrics delivery failed");
                Ok(())
            }
            Ok(Ok(())) => Ok(()),
        }
    }
}

fn compress(bytes: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(bytes)?;
    encoder.finish()
}

async fn check_status(response: reqwest::Response) -> Result<(), SendError> {
    let status = response.status();
    if status != StatusCode::OK {
        let body = response.text().await.unwrap_or_default();
        return Err(SendError::Status { status, body });
    }
    Ok(())
}
