//! Transport-agnostic ingestion core.
//!
//! Both the HTTP handlers and the gRPC service decode their wire shape and
//! dispatch here; validation and storage semantics live in one place.

use std::sync::Arc;
use vitals_common::model::{Counter, Gauge, Metric, MetricCounter, MetricGauge, MetricType};
use vitals_storage::{Storage, StorageError};

pub const ERR_WRONG_METRIC_TYPE: &str = "wrong metric type";
pub const ERR_EMPTY_METRIC_NAME: &str = "empty metric name";
pub const ERR_WRONG_METRIC_VALUE: &str = "wrong metric value";
pub const ERR_NEGATIVE_COUNTER: &str = "counter value must not be negative";
pub const ERR_NOTHING_FOUND: &str = "nothing found";

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    /// Malformed input, surfaced as `400`.
    #[error("{0}")]
    Validation(&'static str),

    /// Malformed input that the legacy contract surfaces as `404`
    /// (blank metric name, missing value for the declared type).
    #[error("{0}")]
    ValidationLegacy(&'static str),

    /// Storage miss, surfaced as `404`.
    #[error("nothing found")]
    NotFound,

    /// Unexpected storage failure, surfaced as `500`.
    #[error("storage failure: {0}")]
    Storage(#[from] StorageError),
}

pub struct Ingest {
    storage: Arc<dyn Storage>,
}

impl Ingest {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    /// Applies a single metric and echoes the stored state.
    ///
    /// For counters the echo carries the resulting sum in `delta` and, for
    /// compatibility with an external harness that reads counters as
    /// floats, mirrors the same sum into `value`.
    pub async fn set_one(&self, metric: Metric) -> Result<Metric, IngestError> {
        let name = metric.id.trim();
        if name.is_empty() {
            return Err(IngestError::ValidationLegacy(ERR_EMPTY_METRIC_NAME));
        }

        match metric.mtype {
            MetricType::Gauge => {
                let Some(value) = metric.value else {
                    return Err(IngestError::ValidationLegacy(ERR_WRONG_METRIC_VALUE));
                };
                self.storage.gauges().set(name, Gauge(value)).await?;
                Ok(Metric::gauge(name, Gauge(value)))
            }
            MetricType::Counter => {
                let Some(delta) = metric.delta else {
                    return Err(IngestError::ValidationLegacy(ERR_WRONG_METRIC_VALUE));
                };
                if delta < 0 {
                    return Err(IngestError::Validation(ERR_NEGATIVE_COUNTER));
                }

                self.storage.counters().set(name, Counter(delta)).await?;
                let sum = match self.storage.counters().get(name).await {
                    Ok(sum) => sum,
                    Err(StorageError::NotFound) => return Err(IngestError::NotFound),
                    Err(e) => return Err(e.into()),
                };

                let mut echoed = Metric::counter(name, sum);
                echoed.value = Some(sum.0 as f64);
                Ok(echoed)
            }
        }
    }

    /// Validates the whole batch, then applies gauge and counter sub-batches
    /// via one `batch_update` per repository.
    pub async fn set_many(&self, metrics: &[Metric]) -> Result<(), IngestError> {
        let mut gauges = Vec::new();
        let mut counters = Vec::new();

        for metric in metrics {
            let name = metric.id.trim();
            if name.is_empty() {
                return Err(IngestError::ValidationLegacy(ERR_EMPTY_METRIC_NAME));
            }

            match metric.mtype {
                MetricType::Gauge => {
                    let Some(value) = metric.value else {
                        return Err(IngestError::ValidationLegacy(ERR_WRONG_METRIC_VALUE));
                    };
                    gauges.push(MetricGauge {
                        name: name.to_string(),
                        value: Gauge(value),
                    });
                }
                MetricType::Counter => {
                    let Some(delta) = metric.delta else {
                        return Err(IngestError::ValidationLegacy(ERR_WRONG_METRIC_VALUE));
                    };
                    if delta < 0 {
                        return Err(IngestError::Validation(ERR_NEGATIVE_COUNTER));
                    }
                    counters.push(MetricCounter {
                        name: name.to_string(),
                        value: Counter(delta),
                    });
                }
            }
        }

        if !gauges.is_empty() {
            self.storage.gauges().batch_update(&gauges).await?;
        }
        if !counters.is_empty() {
            self.storage.counters().batch_update(&counters).await?;
        }

        Ok(())
    }

    /// Returns the current stored value for `(mtype, name)`.
    pub async fn get_one(&self, mtype: MetricType, name: &str) -> Result<Metric, IngestError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(IngestError::Validation(ERR_EMPTY_METRIC_NAME));
        }

        let found = match mtype {
            MetricType::Gauge => self
                .storage
                .gauges()
                .get(name)
                .await
                .map(|value| Metric::gauge(name, value)),
            MetricType::Counter => self
                .storage
                .counters()
                .get(name)
                .await
                .map(|sum| Metric::counter(name, sum)),
        };

        match found {
            Ok(metric) => Ok(metric),
            Err(StorageError::NotFound) => Err(IngestError::NotFound),
            Err(e) => Err(e.into()),
        }
    }
}
