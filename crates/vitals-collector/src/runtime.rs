use crate::Snapshot;
use rand::Rng;
use std::collections::HashMap;
use std::sync::{Mutex, RwLock};
use std::time::Duration;
use sysinfo::{Pid, ProcessesToUpdate, System};
use tokio_util::sync::CancellationToken;
use vitals_common::model::{Counter, Gauge};

/// Samples the agent process itself on every tick.
///
/// The fixed gauge catalog covers process memory, CPU and disk I/O counters
/// plus system load, and every snapshot carries the `RandomValue` gauge and
/// the absolute `PollCount` counter. Only the poller's own task writes; any
/// number of readers may take snapshots concurrently.
pub struct RuntimePoller {
    poll_interval: Duration,
    pid: Pid,
    system: Mutex<System>,
    inner: RwLock<Inner>,
    cancel: CancellationToken,
}

#[derive(Default)]
struct Inner {
    snapshot: Snapshot,
    poll_count: Counter,
}

impl RuntimePoller {
    pub fn new(poll_interval: Duration) -> anyhow::Result<Self> {
        let pid = sysinfo::get_current_pid()
            .map_err(|e| anyhow::anyhow!("failed to resolve current pid: {e}"))?;

        Ok(Self {
            poll_interval,
            pid,
            system: Mutex::new(System::new()),
            inner: RwLock::new(Inner::default()),
            cancel: CancellationToken::new(),
        })
    }

    /// Atomically replaces the internal snapshot and advances `PollCount`.
    pub fn poll(&self) {
        let mut gauges = HashMap::new();

        {
            let mut system = self.system.lock().unwrap();
            system.refresh_processes(ProcessesToUpdate::Some(&[self.pid]), true);

            if let Some(process) = system.process(self.pid) {
                let disk = process.disk_usage();
                gauges.insert("Alloc".to_string(), Gauge(process.memory() as f64));
                gauges.insert("Sys".to_string(), Gauge(process.virtual_memory() as f64));
                gauges.insert(
                    "CPUFraction".to_string(),
                    Gauge(f64::from(process.cpu_usage()) / 100.0),
                );
                gauges.insert("RunTime".to_string(), Gauge(process.run_time() as f64));
                gauges.insert("StartTime".to_string(), Gauge(process.start_time() as f64));
                gauges.insert("DiskRead".to_string(), Gauge(disk.read_bytes as f64));
                gauges.insert(
                    "DiskReadTotal".to_string(),
                    Gauge(disk.total_read_bytes as f64),
                );
                gauges.insert("DiskWrite".to_string(), Gauge(disk.written_bytes as f64));
                gauges.insert(
                    "DiskWriteTotal".to_string(),
                    Gauge(disk.total_written_bytes as f64),
                );
            } else {
                tracing::warn!(pid = %self.pid, "current process missing from system table");
            }
        }

        let load = System::load_average();
        gauges.insert("LoadAverage1".to_string(), Gauge(load.one));
        gauges.insert("LoadAverage5".to_string(), Gauge(load.five));
        gauges.insert("LoadAverage15".to_string(), Gauge(load.fifteen));
        gauges.insert("Uptime".to_string(), Gauge(System::uptime() as f64));
        gauges.insert(
            "RandomValue".to_string(),
            Gauge(rand::thread_rng().gen::<f64>()),
        );

        let mut inner = self.inner.write().unwrap();
        inner.poll_count.0 += 1;

        let mut counters = HashMap::new();
        counters.insert("PollCount".to_string(), inner.poll_count);

        inner.snapshot = Snapshot { gauges, counters };
    }

    /// Returns a copy of the latest snapshot, safe to use after the poller
    /// moves on.
    pub fn acquire_snapshot(&self) -> Snapshot {
        self.inner.read().unwrap().snapshot.clone()
    }

    /// Number of polls performed so far.
    pub fn poll_count(&self) -> Counter {
        self.inner.read().unwrap().poll_count
    }

    /// Polls once immediately, then on every interval tick until [`stop`]
    /// is called.
    ///
    /// [`stop`]: RuntimePoller::stop
    pub async fn run(&self) {
        tracing::info!(interval = ?self.poll_interval, "runtime poller started");
        let mut tick = tokio::time::interval(self.poll_interval);

        loop {
            tokio::select! {
                _ = tick.tick() => self.poll(),
                _ = self.cancel.cancelled() => {
                    tracing::info!("runtime poller stopped");
                    return;
                }
            }
        }
    }

    pub fn stop(&self) {
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn poll_advances_poll_count_and_replaces_snapshot() {
        let poller = RuntimePoller::new(Duration::from_secs(2)).unwrap();
        assert!(poller.acquire_snapshot().is_empty());

        poller.poll();
        poller.poll();

        assert_eq!(poller.poll_count(), Counter(2));
        let snapshot = poller.acquire_snapshot();
        assert_eq!(snapshot.counters["PollCount"], Counter(2));
        assert!(snapshot.gauges.contains_key("Alloc"));
        assert!(snapshot.gauges.contains_key("RandomValue"));
    }

    #[test]
    fn acquired_snapshot_is_a_detached_copy() {
        let poller = RuntimePoller::new(Duration::from_secs(2)).unwrap();
        poller.poll();

        let before = poller.acquire_snapshot();
        poller.poll();
        let after = poller.acquire_snapshot();

        assert_eq!(before.counters["PollCount"], Counter(1));
        assert_eq!(after.counters["PollCount"], Counter(2));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn run_polls_until_stopped() {
        let poller = Arc::new(RuntimePoller::new(Duration::from_millis(10)).unwrap());
        let handle = tokio::spawn({
            let poller = poller.clone();
            async move { poller.run().await }
        });

        tokio::time::sleep(Duration::from_millis(100)).await;
        poller.stop();
        handle.await.unwrap();

        let polled = poller.poll_count();
        assert!(polled >= Counter(2), "expected several polls, got {polled}");

        // No further polls after stop.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(poller.poll_count(), polled);
    }
}
