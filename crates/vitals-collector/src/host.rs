use crate::Snapshot;
use anyhow::Result;
use std::collections::HashMap;
use std::sync::{Mutex, RwLock};
use std::time::Duration;
use sysinfo::System;
use tokio_util::sync::CancellationToken;
use vitals_common::model::Gauge;

/// Samples host-wide memory and per-CPU utilization on every tick.
///
/// Emits `TotalMemory`, `FreeMemory` and one `CPUutilization{i}` gauge per
/// logical CPU. Unlike the runtime poller a poll here can fail; failures are
/// logged by the ticker loop and the tick is skipped.
pub struct HostPoller {
    poll_interval: Duration,
    system: Mutex<System>,
    snapshot: RwLock<Snapshot>,
    cancel: CancellationToken,
}

impl HostPoller {
    pub fn new(poll_interval: Duration) -> Self {
        // Seed the CPU baseline so the first poll reports real utilization
        // instead of zeros.
        let mut system = System::new();
        system.refresh_cpu_all();

        Self {
            poll_interval,
            system: Mutex::new(system),
            snapshot: RwLock::new(Snapshot::default()),
            cancel: CancellationToken::new(),
        }
    }

    /// Atomically replaces the internal snapshot.
    pub fn poll(&self) -> Result<()> {
        let mut gauges = HashMap::new();

        {
            let mut system = self.system.lock().unwrap();
            system.refresh_memory();
            system.refresh_cpu_all();

            let cpus = system.cpus();
            if cpus.is_empty() {
                anyhow::bail!("no CPUs reported by the host");
            }

            gauges.insert(
                "TotalMemory".to_string(),
                Gauge(system.total_memory() as f64),
            );
            gauges.insert("FreeMemory".to_string(), Gauge(system.free_memory() as f64));

            for (i, cpu) in cpus.iter().enumerate() {
                gauges.insert(format!("CPUutilization{i}"), Gauge(f64::from(cpu.cpu_usage())));
            }
        }

        let mut snapshot = self.snapshot.write().unwrap();
        *snapshot = Snapshot {
            gauges,
            counters: HashMap::new(),
        };

        Ok(())
    }

    /// Returns a copy of the latest snapshot, safe to use after the poller
    /// moves on.
    pub fn acquire_snapshot(&self) -> Snapshot {
        self.snapshot.read().unwrap().clone()
    }

    /// Polls once immediately, then on every interval tick until [`stop`]
    /// is called. A failed poll keeps the previous snapshot.
    ///
    /// [`stop`]: HostPoller::stop
    pub async fn run(&self) {
        tracing::info!(interval = ?self.poll_interval, "host poller started");
        let mut tick = tokio::time::interval(self.poll_interval);

        loop {
            tokio::select! {
                _ = tick.tick() => {
                    if let Err(e) = self.poll() {
                        tracing::warn!(error = %e, "host poll failed");
                    }
                }
                _ = self.cancel.cancelled() => {
                    tracing::info!("host poller stopped");
                    return;
                }
            }
        }
    }

    pub fn stop(&self) {
        self.cancel.cancel();
    }
}
