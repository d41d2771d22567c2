//! Conversions between the transport model and the gRPC wire types.

use crate::model::{Metric, MetricType};
use crate::proto;

impl From<&Metric> for proto::MetricProto {
    fn from(metric: &Metric) -> Self {
        let mtype = match metric.mtype {
            MetricType::Gauge => proto::MetricType::Gauge,
            MetricType::Counter => proto::MetricType::Counter,
        };

        proto::MetricProto {
            id: metric.id.clone(),
            r#type: mtype as i32,
            delta: metric.delta,
            value: metric.value,
        }
    }
}

impl TryFrom<proto::MetricProto> for Metric {
    type Error = String;

    fn try_from(proto_metric: proto::MetricProto) -> Result<Self, Self::Error> {
        let mtype = match proto::MetricType::try_from(proto_metric.r#type) {
            Ok(proto::MetricType::Gauge) => MetricType::Gauge,
            Ok(proto::MetricType::Counter) => MetricType::Counter,
            Ok(proto::MetricType::Unspecified) | Err(_) => {
                return Err(format!("unknown metric type: {}", proto_metric.r#type))
            }
        };

        Ok(Metric {
            id: proto_metric.id,
            mtype,
            delta: proto_metric.delta,
            value: proto_metric.value,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Counter, Gauge};

    #[test]
    fn metric_round_trips_through_proto() {
        for metric in [
            Metric::gauge("Alloc", Gauge(42.5)),
            Metric::counter("PollCount", Counter(7)),
        ] {
            let wire = proto::MetricProto::from(&metric);
            let back = Metric::try_from(wire).unwrap();
            assert_eq!(back, metric);
        }
    }

    #[test]
    fn unspecified_proto_type_is_rejected() {
        let wire = proto::MetricProto {
            id: "x".to_string(),
            r#type: 0,
            delta: None,
            value: None,
        };
        assert!(Metric::try_from(wire).is_err());
    }
}
