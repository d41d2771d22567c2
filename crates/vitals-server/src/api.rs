//! HTTP handlers. Wire decoding lives here; validation and storage
//! semantics live in [`crate::ingest`].

use crate::ingest::{IngestError, ERR_WRONG_METRIC_TYPE, ERR_WRONG_METRIC_VALUE};
use crate::state::AppState;
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use std::collections::HashMap;
use vitals_common::model::{Counter, Gauge, Metric, MetricType};

impl IntoResponse for IngestError {
    fn into_response(self) -> Response {
        match self {
            IngestError::Validation(msg) => (StatusCode::BAD_REQUEST, msg).into_response(),
            IngestError::ValidationLegacy(msg) => (StatusCode::NOT_FOUND, msg).into_response(),
            IngestError::NotFound => {
                (StatusCode::NOT_FOUND, crate::ingest::ERR_NOTHING_FOUND).into_response()
            }
            IngestError::Storage(e) => {
                tracing::error!(error = %e, "storage failure");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal error").into_response()
            }
        }
    }
}

/// Full store contents; also the dump-file shape.
#[derive(Serialize)]
struct MetricsListing {
    gauges: HashMap<String, Gauge>,
    counters: HashMap<String, Counter>,
}

/// `GET /`: all stored metrics as one JSON document.
pub async fn index(State(state): State<AppState>) -> Response {
    let gauges = match state.storage.gauges().get_all().await {
        Ok(gauges) => gauges,
        Err(e) => return IngestError::Storage(e).into_response(),
    };
    let counters = match state.storage.counters().get_all().await {
        Ok(counters) => counters,
        Err(e) => return IngestError::Storage(e).into_response(),
    };

    Json(MetricsListing { gauges, counters }).into_response()
}

/// `GET /ping`: storage liveness.
pub async fn ping(State(state): State<AppState>) -> Response {
    match state.storage.ping().await {
        Ok(()) => StatusCode::OK.into_response(),
        Err(e) => {
            tracing::error!(error = %e, "storage ping failed");
            (StatusCode::INTERNAL_SERVER_ERROR, "storage unavailable").into_response()
        }
    }
}

/// `GET /value/{type}/{name}`: plain-text value.
pub async fn get_value_by_path(
    State(state): State<AppState>,
    Path((mtype, name)): Path<(String, String)>,
) -> Response {
    let Ok(mtype) = mtype.trim().parse::<MetricType>() else {
        return (StatusCode::BAD_REQUEST, ERR_WRONG_METRIC_TYPE).into_response();
    };

    match state.ingest.get_one(mtype, &name).await {
        Ok(metric) => match mtype {
            MetricType::Gauge => Gauge(metric.value.unwrap_or_default()).to_string(),
            MetricType::Counter => Counter(metric.delta.unwrap_or_default()).to_string(),
        }
        .into_response(),
        Err(e) => e.into_response(),
    }
}

/// `POST /value/`: JSON query `{id, type}`.
pub async fn get_value_by_json(State(state): State<AppState>, body: Bytes) -> Response {
    let Ok(metric) = serde_json::from_slice::<Metric>(&body) else {
        return (StatusCode::BAD_REQUEST, ERR_WRONG_METRIC_TYPE).into_response();
    };

    match state.ingest.get_one(metric.mtype, &metric.id).await {
        Ok(metric) => Json(metric).into_response(),
        Err(e) => e.into_response(),
    }
}

/// `POST /update/{type}/{name}/{value}`: legacy path form.
pub async fn update_by_path(
    State(state): State<AppState>,
    Path((mtype, name, value)): Path<(String, String, String)>,
) -> Response {
    let Ok(mtype) = mtype.trim().parse::<MetricType>() else {
        return (StatusCode::BAD_REQUEST, ERR_WRONG_METRIC_TYPE).into_response();
    };

    let metric = match mtype {
        MetricType::Gauge => match value.parse::<Gauge>() {
            Ok(gauge) => Metric::gauge(name, gauge),
            Err(_) => return (StatusCode::BAD_REQUEST, ERR_WRONG_METRIC_VALUE).into_response(),
        },
        MetricType::Counter => match value.parse::<Counter>() {
            Ok(counter) => Metric::counter(name, counter),
            Err(_) => return (StatusCode::BAD_REQUEST, ERR_WRONG_METRIC_VALUE).into_response(),
        },
    };

    match state.ingest.set_one(metric).await {
        Ok(_) => {
            dump_after_mutation(&state).await;
            StatusCode::OK.into_response()
        }
        Err(e) => e.into_response(),
    }
}

/// `POST /update/`: single JSON metric, echoes the stored state.
pub async fn update_by_json(State(state): State<AppState>, body: Bytes) -> Response {
    let Ok(metric) = serde_json::from_slice::<Metric>(&body) else {
        return (StatusCode::BAD_REQUEST, ERR_WRONG_METRIC_TYPE).into_response();
    };

    match state.ingest.set_one(metric).await {
        Ok(stored) => {
            dump_after_mutation(&state).await;
            Json(stored).into_response()
        }
        Err(e) => e.into_response(),
    }
}

/// `POST /updates/`: JSON array of metrics, applied as a batch.
pub async fn update_batch(State(state): State<AppState>, body: Bytes) -> Response {
    let Ok(metrics) = serde_json::from_slice::<Vec<Metric>>(&body) else {
        return (StatusCode::BAD_REQUEST, ERR_WRONG_METRIC_TYPE).into_response();
    };

    match state.ingest.set_many(&metrics).await {
        Ok(()) => {
            dump_after_mutation(&state).await;
            StatusCode::OK.into_response()
        }
        Err(e) => e.into_response(),
    }
}

/// Synchronous-mode dump hook; a failed dump is logged, never surfaced to
/// the client whose update already succeeded.
async fn dump_after_mutation(state: &AppState) {
    if let Err(e) = state.dumper.on_mutation().await {
        tracing::error!(error = %e, "synchronous dump failed");
    }
}
