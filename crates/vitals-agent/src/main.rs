mod config;
mod hostip;
mod sender;
mod sender_grpc;

use anyhow::Result;
use sender::MetricsSender;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing_subscriber::EnvFilter;
use vitals_collector::host::HostPoller;
use vitals_collector::runtime::RuntimePoller;

/// Upper bound for the final delivery during graceful shutdown.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> Result<()> {
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config/agent.toml".to_string());

    let mut cfg = config::AgentConfig::load(&config_path)?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(cfg.log_level.parse()?))
        .init();

    tracing::info!(
        poll_interval = cfg.poll_interval,
        report_interval = cfg.report_interval,
        server = %cfg.server_url,
        "vitals-agent starting"
    );

    if cfg.host_ip.is_empty() {
        match hostip::find_host_ip() {
            Ok(ip) => {
                cfg.host_ip = ip.to_string();
                tracing::info!(ip = %cfg.host_ip, "host IP detected dynamically");
            }
            Err(e) => tracing::warn!(error = %e, "host IP detection failed"),
        }
    } else {
        tracing::info!(ip = %cfg.host_ip, "host IP taken from config");
    }

    let poll_interval = Duration::from_secs(cfg.poll_interval);
    let runtime_poller = Arc::new(RuntimePoller::new(poll_interval)?);
    let host_poller = Arc::new(HostPoller::new(poll_interval));

    let metrics_sender: Arc<dyn MetricsSender> = if cfg.grpc_addr.is_empty() {
        Arc::new(sender::Sender::new(
            &cfg,
            runtime_poller.clone(),
            host_poller.clone(),
        )?)
    } else {
        Arc::new(sender_grpc::GrpcSender::new(
            &cfg,
            runtime_poller.clone(),
            host_poller.clone(),
        ))
    };

    let poller_handle = tokio::spawn({
        let poller = runtime_poller.clone();
        async move { poller.run().await }
    });
    let host_handle = tokio::spawn({
        let poller = host_poller.clone();
        async move { poller.run().await }
    });
    let sender_handle = tokio::spawn({
        let metrics_sender = metrics_sender.clone();
        async move { metrics_sender.run().await }
    });

    signal::ctrl_c().await?;
    tracing::info!("shutting down gracefully");

    runtime_poller.stop();
    host_poller.stop();
    if let Err(e) = metrics_sender.shutdown(SHUTDOWN_TIMEOUT).await {
        tracing::error!(error = %e, "sender shutdown failed");
    }

    for handle in [poller_handle, host_handle, sender_handle] {
        let _ = handle.await;
    }

    tracing::info!("agent stopped");
    Ok(())
}
