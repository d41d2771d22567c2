//! Agent-side metric pollers.
//!
//! Two pollers run on independent tickers: [`runtime::RuntimePoller`]
//! samples the agent process itself, [`host::HostPoller`] samples host-wide
//! memory and per-CPU utilization. Each keeps its latest [`Snapshot`] behind
//! a reader-writer lock; the sender merges copies of both on every report
//! tick.

pub mod host;
pub mod runtime;

use std::collections::HashMap;
use vitals_common::model::{Counter, Gauge, Metric};

/// Immutable view of one poll tick. Produced by a poller, merged and
/// serialized by the sender, never mutated after creation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    pub gauges: HashMap<String, Gauge>,
    pub counters: HashMap<String, Counter>,
}

impl Snapshot {
    /// Key-wise overwrite of `self` with entries from `other`.
    ///
    /// Counters overwrite too: each snapshot already carries the absolute
    /// `PollCount`, the additive accumulation happens inside the poller.
    pub fn merge(&mut self, other: &Snapshot) {
        for (name, value) in &other.gauges {
            self.gauges.insert(name.clone(), *value);
        }
        for (name, value) in &other.counters {
            self.counters.insert(name.clone(), *value);
        }
    }

    pub fn len(&self) -> usize {
        self.gauges.len() + self.counters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.gauges.is_empty() && self.counters.is_empty()
    }

    /// Flattens the snapshot into transport metrics, gauges first.
    pub fn into_batch(self) -> Vec<Metric> {
        let mut batch = Vec::with_capacity(self.len());
        for (name, value) in self.gauges {
            batch.push(Metric::gauge(name, value));
        }
        for (name, value) in self.counters {
            batch.push(Metric::counter(name, value));
        }
        batch
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vitals_common::model::MetricType;

    fn snapshot(gauges: &[(&str, f64)], counters: &[(&str, i64)]) -> Snapshot {
        Snapshot {
            gauges: gauges
                .iter()
                .map(|(n, v)| (n.to_string(), Gauge(*v)))
                .collect(),
            counters: counters
                .iter()
                .map(|(n, v)| (n.to_string(), Counter(*v)))
                .collect(),
        }
    }

    #[test]
    fn merge_overwrites_both_kinds() {
        let mut base = snapshot(&[("Alloc", 1.0), ("Uptime", 10.0)], &[("PollCount", 3)]);
        let other = snapshot(&[("Alloc", 2.0), ("TotalMemory", 64.0)], &[("PollCount", 4)]);

        base.merge(&other);

        assert_eq!(base.gauges["Alloc"], Gauge(2.0));
        assert_eq!(base.gauges["Uptime"], Gauge(10.0));
        assert_eq!(base.gauges["TotalMemory"], Gauge(64.0));
        // PollCount is absolute per snapshot, not summed at merge time.
        assert_eq!(base.counters["PollCount"], Counter(4));
        assert_eq!(base.len(), 4);
    }

    #[test]
    fn into_batch_tags_values_by_kind() {
        let batch = snapshot(&[("Alloc", 42.5)], &[("PollCount", 7)]).into_batch();
        assert_eq!(batch.len(), 2);

        let gauge = batch.iter().find(|m| m.id == "Alloc").unwrap();
        assert_eq!(gauge.mtype, MetricType::Gauge);
        assert_eq!(gauge.value, Some(42.5));
        assert_eq!(gauge.delta, None);

        let counter = batch.iter().find(|m| m.id == "PollCount").unwrap();
        assert_eq!(counter.mtype, MetricType::Counter);
        assert_eq!(counter.delta, Some(7));
        assert_eq!(counter.value, None);
    }
}
