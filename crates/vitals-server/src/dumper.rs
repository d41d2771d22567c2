//! Restore-on-start and snapshot-to-disk sidecar for the in-memory
//! storage path.

use crate::config::ServerConfig;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use vitals_common::model::{Counter, Gauge};
use vitals_storage::Storage;

/// Snapshot cadence derived from `store_interval` and the file path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    /// No file configured or a negative interval: every dump is a no-op.
    Disabled,
    /// Dump from the request path after each mutation.
    Synchronous,
    /// Dump on a timer.
    Timer(Duration),
}

/// On-disk shape: one JSON object with the full store contents.
#[derive(Debug, Default, Serialize, Deserialize)]
struct MetricsDump {
    gauges: HashMap<String, Gauge>,
    counters: HashMap<String, Counter>,
}

pub struct Dumper {
    storage: Arc<dyn Storage>,
    path: Option<PathBuf>,
    mode: Mode,
    restore: bool,
    /// Serializes file writes; dumps may fire concurrently from many
    /// request handlers in synchronous mode.
    write_lock: Mutex<()>,
    cancel: CancellationToken,
}

impl Dumper {
    pub fn new(storage: Arc<dyn Storage>, cfg: &ServerConfig) -> Self {
        let path = (!cfg.file_storage_path.is_empty()).then(|| PathBuf::from(&cfg.file_storage_path));

        let mode = match (&path, cfg.store_interval) {
            (None, _) => Mode::Disabled,
            (Some(_), 0) => Mode::Synchronous,
            (Some(_), interval) if interval > 0 => Mode::Timer(Duration::from_secs(interval as u64)),
            (Some(_), _) => Mode::Disabled,
        };

        Self {
            storage,
            path,
            mode,
            restore: cfg.restore,
            write_lock: Mutex::new(()),
            cancel: CancellationToken::new(),
        }
    }

    /// Boot-time restore attempt. A missing dump file is not an error; a
    /// corrupt one is.
    pub async fn start(&self) -> Result<()> {
        self.restore().await.context("unsuccessful restore attempt")
    }

    /// Timer loop. Returns immediately unless timer mode is active; stopped
    /// by [`shutdown`].
    ///
    /// [`shutdown`]: Dumper::shutdown
    pub async fn run(&self) {
        let Mode::Timer(interval) = self.mode else {
            tracing::info!("dump timer disabled");
            return;
        };

        tracing::info!(interval = ?interval, "dump timer started");
        let mut tick = tokio::time::interval(interval);
        // The first tick fires immediately; dumps start one interval in.
        tick.tick().await;

        loop {
            tokio::select! {
                _ = tick.tick() => {
                    if let Err(e) = self.dump().await {
                        tracing::error!(error = %e, "periodic dump failed");
                    }
                }
                _ = self.cancel.cancelled() => {
                    tracing::info!("dump timer stopped");
                    return;
                }
            }
        }
    }

    /// Request-path hook: dumps when running in synchronous mode, no-op
    /// otherwise.
    pub async fn on_mutation(&self) -> Result<()> {
        if self.mode == Mode::Synchronous {
            self.dump().await?;
        }
        Ok(())
    }

    /// Writes the full store contents to the dump file. No-op when dumping
    /// is disabled.
    pub async fn dump(&self) -> Result<()> {
        if self.mode == Mode::Disabled {
            return Ok(());
        }
        let Some(path) = &self.path else {
            return Ok(());
        };

        let dump = MetricsDump {
            gauges: self
                .storage
                .gauges()
                .get_all()
                .await
                .context("gauges retrieval error")?,
            counters: self
                .storage
                .counters()
                .get_all()
                .await
                .context("counters retrieval error")?,
        };

        let data = serde_json::to_vec(&dump).context("dump serialization failed")?;

        let _guard = self.write_lock.lock().await;
        std::fs::write(path, data).with_context(|| format!("writing {}", path.display()))?;

        tracing::debug!(
            gauges = dump.gauges.len(),
            counters = dump.counters.len(),
            "metrics dumped"
        );
        Ok(())
    }

    async fn restore(&self) -> Result<()> {
        if !self.restore {
            tracing::info!("dump restore disabled by config");
            return Ok(());
        }

        let Some(path) = &self.path else {
            tracing::info!("dump restore disabled, no file path");
            return Ok(());
        };

        let data = match std::fs::read(path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(path = %path.display(), "no dump file to restore from, skipping");
                return Ok(());
            }
            Err(e) => return Err(e).with_context(|| format!("reading {}", path.display())),
        };

        let dump: MetricsDump = serde_json::from_slice(&data).context("dump decoding failed")?;

        let mut restored = 0usize;
        for (name, value) in dump.counters {
            self.storage
                .counters()
                .set(&name, value)
                .await
                .context("counters restore error")?;
            restored += 1;
        }
        for (name, value) in dump.gauges {
            self.storage
                .gauges()
                .set(&name, value)
                .await
                .context("gauges restore error")?;
            restored += 1;
        }

        tracing::info!(restored, "metrics restored from dump");
        Ok(())
    }

    /// Stops the timer and makes one final dump attempt bounded by
    /// `deadline`.
    pub async fn shutdown(&self, deadline: Duration) -> Result<()> {
        tracing::info!("stopping dumper");
        self.cancel.cancel();

        if self.mode == Mode::Disabled {
            return Ok(());
        }

        match tokio::time::timeout(deadline, self.dump()).await {
            Err(_) => anyhow::bail!("dumper shutdown deadline expired"),
            Ok(result) => result,
        }
    }
}
