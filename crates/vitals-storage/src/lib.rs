//! Metric persistence layer.
//!
//! A [`Storage`] is a pair of typed repositories with identical surface but
//! different write semantics: gauges replace, counters accumulate. Two
//! interchangeable implementations exist, the in-process [`MemStorage`] and
//! the relational [`SqlStorage`] selected by a database DSN.

pub mod error;
pub mod mem;
pub mod sql;


pub use error::{Result, StorageError};
pub use mem::MemStorage;
pub use sql::SqlStorage;

use async_trait::async_trait;
use std::collections::HashMap;
use vitals_common::model::{Counter, Gauge, MetricCounter, MetricGauge};

/// Gauge repository. `set` replaces any prior value.
#[async_trait]
pub trait GaugesRepository: Send + Sync {
    /// Finds a gauge by name. Returns [`StorageError::NotFound`] when the
    /// metric does not exist.
    async fn get(&self, name: &str) -> Result<Gauge>;

    async fn get_all(&self) -> Result<HashMap<String, Gauge>>;

    async fn set(&self, name: &str, value: Gauge) -> Result<()>;

    async fn delete(&self, name: &str) -> Result<()>;

    /// Applies all entries as one unit. On the relational backend the batch
    /// runs inside a single transaction.
    async fn batch_update(&self, gauges: &[MetricGauge]) -> Result<()>;
}

/// Counter repository. `set` **adds** the delta to the stored sum, creating
/// the row on first write.
#[async_trait]
pub trait CountersRepository: Send + Sync {
    /// Finds a counter by name. Returns [`StorageError::NotFound`] when the
    /// metric does not exist.
    async fn get(&self, name: &str) -> Result<Counter>;

    async fn get_all(&self) -> Result<HashMap<String, Counter>>;

    async fn set(&self, name: &str, value: Counter) -> Result<()>;

    async fn delete(&self, name: &str) -> Result<()>;

    /// Applies all deltas as one unit. On the relational backend the batch
    /// runs inside a single transaction.
    async fn batch_update(&self, counters: &[MetricCounter]) -> Result<()>;
}

/// A set of repositories plus backend lifecycle operations.
///
/// `close` performs the backend teardown; callers bound it with a deadline
/// (`tokio::time::timeout`) on shutdown paths.
#[async_trait]
pub trait Storage: Send + Sync {
    fn gauges(&self) -> &dyn GaugesRepository;

    fn counters(&self) -> &dyn CountersRepository;

    async fn ping(&self) -> Result<()>;

    async fn close(&self) -> Result<()>;
}
