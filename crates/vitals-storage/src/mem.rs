//! Map-backed storage implementation.

use crate::{CountersRepository, GaugesRepository, Result, Storage};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;
use vitals_common::model::{Counter, Gauge, MetricCounter, MetricGauge};

/// In-process storage: two maps, each behind its own reader-writer lock.
#[derive(Default)]
pub struct MemStorage {
    gauges: MemGauges,
    counters: MemCounters,
}

impl MemStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Storage for MemStorage {
    fn gauges(&self) -> &dyn GaugesRepository {
        &self.gauges
    }

    fn counters(&self) -> &dyn CountersRepository {
        &self.counters
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

#[derive(Default)]
struct MemGauges {
    data: RwLock<HashMap<String, Gauge>>,
}

#[async_trait]
impl GaugesRepository for MemGauges {
    async fn get(&self, name: &str) -> Result<Gauge> {
        self.data
            .read()
            .unwrap()
            .get(name)
            .copied()
            .ok_or(crate::StorageError::NotFound)
    }

    async fn get_all(&self) -> Result<HashMap<String, Gauge>> {
        Ok(self.data.read().unwrap().clone())
    }

    async fn set(&self, name: &str, value: Gauge) -> Result<()> {
        self.data.write().unwrap().insert(name.to_string(), value);
        Ok(())
    }

    async fn delete(&self, name: &str) -> Result<()> {
        self.data.write().unwrap().remove(name);
        Ok(())
    }

    async fn batch_update(&self, gauges: &[MetricGauge]) -> Result<()> {
        let mut data = self.data.write().unwrap();
        for gauge in gauges {
            data.insert(gauge.name.clone(), gauge.value);
        }
        Ok(())
    }
}

#[derive(Default)]
struct MemCounters {
    data: RwLock<HashMap<String, Counter>>,
}

#[async_trait]
impl CountersRepository for MemCounters {
    async fn get(&self, name: &str) -> Result<Counter> {
        self.data
            .read()
            .unwrap()
            .get(name)
            .copied()
            .ok_or(crate::StorageError::NotFound)
    }

    async fn get_all(&self) -> Result<HashMap<String, Counter>> {
        Ok(self.data.read().unwrap().clone())
    }

    async fn set(&self, name: &str, value: Counter) -> Result<()> {
        let mut data = self.data.write().unwrap();
        let entry = data.entry(name.to_string()).or_default();
        entry.0 += value.0;
        Ok(())
    }

    async fn delete(&self, name: &str) -> Result<()> {
        self.data.write().unwrap().remove(name);
        Ok(())
    }

    async fn batch_update(&self, counters: &[MetricCounter]) -> Result<()> {
        let mut data = self.data.write().unwrap();
        for counter in counters {
            let entry = data.entry(counter.name.clone()).or_default();
            entry.0 += counter.value.0;
        }
        Ok(())
    }
}
