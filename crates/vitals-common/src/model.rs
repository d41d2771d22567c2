use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Instantaneous floating-point sample. Last write wins.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct Gauge(pub f64);

/// Monotonically additive integer. The transport carries the delta, storage
/// holds the running sum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct Counter(pub i64);

impl fmt::Display for Gauge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for Counter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Gauge {
    type Err = std::num::ParseFloatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<f64>().map(Gauge)
    }
}

impl FromStr for Counter {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<i64>().map(Counter)
    }
}

/// Tag distinguishing the two metric kinds on the wire and in storage keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricType {
    Gauge,
    Counter,
}

impl fmt::Display for MetricType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricType::Gauge => write!(f, "gauge"),
            MetricType::Counter => write!(f, "counter"),
        }
    }
}

impl FromStr for MetricType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "gauge" => Ok(MetricType::Gauge),
            "counter" => Ok(MetricType::Counter),
            _ => Err(format!("unknown metric type: {s}")),
        }
    }
}

/// Transport payload for a single metric.
///
/// Exactly one of `delta`/`value` is expected to be present and must match
/// `mtype`; the ingestion core validates this at the boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metric {
    /// Defaults to empty when absent so a missing name surfaces as the
    /// name-validation error rather than a decode failure.
    #[serde(default)]
    pub id: String,
    #[serde(rename = "type")]
    pub mtype: MetricType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delta: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
}

impl Metric {
    pub fn gauge(name: impl Into<String>, value: Gauge) -> Self {
        Self {
            id: name.into(),
            mtype: MetricType::Gauge,
            delta: None,
            value: Some(value.0),
        }
    }

    pub fn counter(name: impl Into<String>, delta: Counter) -> Self {
        Self {
            id: name.into(),
            mtype: MetricType::Counter,
            delta: Some(delta.0),
            value: None,
        }
    }
}

/// Named gauge as stored in a repository.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricGauge {
    pub name: String,
    pub value: Gauge,
}

/// Named counter delta as applied to a repository.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricCounter {
    pub name: String,
    pub value: Counter,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gauge_display_drops_trailing_zero() {
        assert_eq!(Gauge(1.0).to_string(), "1");
        assert_eq!(Gauge(42.5).to_string(), "42.5");
    }

    #[test]
    fn metric_type_round_trips_through_str() {
        for (s, t) in [("gauge", MetricType::Gauge), ("counter", MetricType::Counter)] {
            assert_eq!(s.parse::<MetricType>().unwrap(), t);
            assert_eq!(t.to_string(), s);
        }
        assert!("histogram".parse::<MetricType>().is_err());
        assert!("".parse::<MetricType>().is_err());
    }

    #[test]
    fn metric_json_omits_absent_fields() {
        let m = Metric::counter("PollCount", Counter(5));
        let json = serde_json::to_string(&m).unwrap();
        assert_eq!(json, r#"{"id":"PollCount","type":"counter","delta":5}"#);

        let m = Metric::gauge("Alloc", Gauge(42.5));
        let json = serde_json::to_string(&m).unwrap();
        assert_eq!(json, r#"{"id":"Alloc","type":"gauge","value":42.5}"#);
    }

    #[test]
    fn metric_json_parses_query_shape() {
        let m: Metric = serde_json::from_str(r#"{"id":"Alloc","type":"gauge"}"#).unwrap();
        assert_eq!(m.id, "Alloc");
        assert_eq!(m.mtype, MetricType::Gauge);
        assert!(m.delta.is_none());
        assert!(m.value.is_none());
    }
}
