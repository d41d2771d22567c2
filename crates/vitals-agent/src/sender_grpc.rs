//! gRPC delivery path. Shares the merge/semaphore/retry/shutdown contract
//! with the HTTP sender, but ships the batch as one `UpdateBatch` RPC.

use crate::config::AgentConfig;
use crate::sender::{MetricsSender, SendError};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Semaphore};
use tokio_util::sync::CancellationToken;
use tonic::transport::Channel;
use vitals_collector::host::HostPoller;
use vitals_collector::runtime::RuntimePoller;
use vitals_collector::Snapshot;
use vitals_common::model::Metric;
use vitals_common::proto::metrics_service_client::MetricsServiceClient;
use vitals_common::proto::{MetricBatchProto, MetricProto};
use vitals_common::retry::Retrier;

pub struct GrpcSender {
    report_interval: Duration,
    endpoint: String,
    runtime_poller: Arc<RuntimePoller>,
    host_poller: Arc<HostPoller>,
    // Lazily established; dropped on delivery failure to force a reconnect.
    client: Mutex<Option<MetricsServiceClient<Channel>>>,
    semaphore: Arc<Semaphore>,
    retrier: Retrier,
    cancel: CancellationToken,
}

impl GrpcSender {
    pub fn new(
        cfg: &AgentConfig,
        runtime_poller: Arc<RuntimePoller>,
        host_poller: Arc<HostPoller>,
    ) -> Self {
        let endpoint = if cfg.grpc_addr.contains("://") {
            cfg.grpc_addr.clone()
        } else {
            format!("http://{}", cfg.grpc_addr.trim())
        };

        Self {
            report_interval: Duration::from_secs(cfg.report_interval),
            endpoint,
            runtime_poller,
            host_poller,
            client: Mutex::new(None),
            semaphore: Arc::new(Semaphore::new(cfg.rate_limit.max(1))),
            retrier: Retrier::default(),
            cancel: CancellationToken::new(),
        }
    }

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

        if let Err(e) = self
            .retrier
            .run("send metrics batch (grpc)", || self.send_batched(&batch))
            .await
        {
            tracing::error!(error = %e, "batched metrics report failed (grpc)");
            return;
        }

        tracing::debug!(count, "metrics reported (grpc)");
    }

    async fn send_batched(&self, batch: &[Metric]) -> Result<(), SendError> {
        let _permit = self
            .semaphore
            .acquire()
            .await
            .expect("delivery semaphore is never closed");

        let mut guard = self.client.lock().await;
        if guard.is_none() {
            let client = MetricsServiceClient::connect(self.endpoint.clone()).await?;
            tracing::info!(endpoint = %self.endpoint, "connected to grpc server");
            *guard = Some(client);
        }

        let request = MetricBatchProto {
            metrics: batch.iter().map(MetricProto::from).collect(),
        };

        let client = guard.as_mut().expect("client established above");
        if let Err(status) = client.update_batch(request).await {
            // Drop the channel so the next attempt reconnects.
            *guard = None;
            return Err(SendError::Grpc(status));
        }

        Ok(())
    }
}

#[async_trait]
impl MetricsSender for GrpcSender {
    async fn run(&self) {
        tracing::info!(interval = ?self.report_interval, endpoint = %self.endpoint, "sender started (grpc)");
        let mut tick = tokio::time::interval(self.report_interval);
        tick.tick().await;

        loop {
            tokio::select! {
                _ = tick.tick() => self.report().await,
                _ = self.cancel.cancelled() => {
                    tracing::info!("sender stopped (grpc)");
                    return;
                }
            }
        }
    }

    async fn shutdown(&self, deadline: Duration) -> anyhow::Result<()> {
        tracing::info!("stopping sender (grpc)");
        self.cancel.cancel();

        let batch = self.collect().into_batch();
        match tokio::time::timeout(deadline, self.send_batched(&batch)).await {
            Err(_) => anyhow::bail!("sender shutdown deadline expired"),
            Ok(Err(e)) => {
                tracing::error!(error = %e, "final metrics delivery failed (grpc)");
                Ok(())
            }
            Ok(Ok(())) => Ok(()),
        }
    }
}
