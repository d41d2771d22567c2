use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tonic::transport::Server as TonicServer;
use tracing_subscriber::EnvFilter;
use vitals_common::retry::Retrier;
use vitals_server::app;
use vitals_server::config::ServerConfig;
use vitals_server::dumper::Dumper;
use vitals_server::grpc::MetricsGrpc;
use vitals_server::state::AppState;
use vitals_storage::{MemStorage, SqlStorage, Storage};

/// Upper bound for the final dump and storage teardown during graceful
/// shutdown.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> Result<()> {
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|e| anyhow::anyhow!("failed to install default CryptoProvider: {e:?}"))?;

    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config/server.toml".to_string());

    let cfg = ServerConfig::load(&config_path)?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(cfg.log_level.parse()?))
        .init();

    tracing::info!(
        addr = %cfg.server_addr,
        store_interval = cfg.store_interval,
        file = %cfg.file_storage_path,
        "vitals-server starting"
    );

    let storage: Arc<dyn Storage> = if cfg.database_dsn.is_empty() {
        Arc::new(MemStorage::new())
    } else {
        let dsn = cfg.database_dsn.clone();
        let sql = Retrier::default()
            .run("db connect", || SqlStorage::connect(&dsn))
            .await?;
        tracing::info!("relational storage selected");
        Arc::new(sql)
    };

    let dumper = Arc::new(Dumper::new(storage.clone(), &cfg));
    dumper.start().await?;
    let dumper_handle = tokio::spawn({
        let dumper = dumper.clone();
        async move { dumper.run().await }
    });

    let state = AppState::build(storage.clone(), dumper.clone(), &cfg)?;

    let grpc_handle = if cfg.grpc_addr.is_empty() {
        None
    } else {
        let addr: SocketAddr = cfg.grpc_addr.parse()?;
        let service = MetricsGrpc::new(state.clone()).into_service();
        tracing::info!(addr = %addr, "grpc server listening");
        Some(tokio::spawn(async move {
            if let Err(e) = TonicServer::builder().add_service(service).serve(addr).await {
                tracing::error!(error = %e, "grpc server error");
            }
        }))
    };

    let router = app::build_router(state);
    let listener = tokio::net::TcpListener::bind(&cfg.server_addr).await?;
    tracing::info!(addr = %cfg.server_addr, "http server listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            let _ = signal::ctrl_c().await;
        })
        .await?;

    tracing::info!("shutting down gracefully");

    if let Some(handle) = grpc_handle {
        handle.abort();
    }

    if let Err(e) = dumper.shutdown(SHUTDOWN_TIMEOUT).await {
        tracing::error!(error = %e, "final dump failed");
    }
    dumper_handle.abort();

    match tokio::time::timeout(SHUTDOWN_TIMEOUT, storage.close()).await {
        Err(_) => tracing::error!("storage close deadline expired"),
        Ok(Err(e)) => tracing::error!(error = %e, "storage close failed"),
        Ok(Ok(())) => {}
    }

    tracing::info!("server stopped");
    Ok(())
}
