//! gRPC surface. Shares the ingestion core with the HTTP handlers.
//!
//! The trusted-subnet allow-list is enforced here as well, from the
//! `x-real-ip` metadata entry or the peer address. Handler bodies run under
//! a panic-recovery wrapper that converts panics into `Internal` status.

use crate::ingest::{IngestError, ERR_NOTHING_FOUND, ERR_WRONG_METRIC_TYPE};
use crate::state::AppState;
use futures::FutureExt;
use std::future::Future;
use std::net::IpAddr;
use std::panic::AssertUnwindSafe;
use tonic::{Request, Response, Status};
use vitals_common::model::{Metric, MetricType};
use vitals_common::proto::metrics_service_server::{MetricsService, MetricsServiceServer};
use vitals_common::proto::{self, GetMetricRequest, MetricBatchProto, MetricProto, UpdateBatchResponse};

pub struct MetricsGrpc {
    state: AppState,
}

impl MetricsGrpc {
    pub fn new(state: AppState) -> Self {
        Self { state }
    }

    pub fn into_service(self) -> MetricsServiceServer<Self> {
        MetricsServiceServer::new(self)
    }

    fn check_subnet<T>(&self, request: &Request<T>) -> Result<(), Status> {
        let Some(subnet) = self.state.trusted_subnet else {
            return Ok(());
        };

        let ip = request
            .metadata()
            .get("x-real-ip")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<IpAddr>().ok())
            .or_else(|| request.remote_addr().map(|addr| addr.ip()));

        match ip {
            Some(ip) if subnet.contains(ip) => Ok(()),
            Some(ip) => {
                tracing::warn!(client = %ip, "grpc client outside trusted subnet");
                Err(Status::permission_denied("forbidden"))
            }
            None => {
                tracing::warn!("grpc client address unknown");
                Err(Status::permission_denied("forbidden"))
            }
        }
    }

    async fn dump_after_mutation(&self) {
        if let Err(e) = self.state.dumper.on_mutation().await {
            tracing::error!(error = %e, "synchronous dump failed");
        }
    }
}

fn to_status(err: IngestError) -> Status {
    match err {
        IngestError::Validation(msg) => Status::invalid_argument(msg),
        IngestError::ValidationLegacy(msg) => Status::not_found(msg),
        IngestError::NotFound => Status::not_found(ERR_NOTHING_FOUND),
        IngestError::Storage(e) => {
            tracing::error!(error = %e, "storage failure");
            Status::internal("storage failure")
        }
    }
}

fn metric_type_from_proto(raw: i32) -> Result<MetricType, Status> {
    match proto::MetricType::try_from(raw) {
        Ok(proto::MetricType::Gauge) => Ok(MetricType::Gauge),
        Ok(proto::MetricType::Counter) => Ok(MetricType::Counter),
        _ => Err(Status::invalid_argument(ERR_WRONG_METRIC_TYPE)),
    }
}

/// Converts a handler panic into `Internal` instead of tearing down the
/// connection.
async fn recovered<T, F>(fut: F) -> Result<T, Status>
where
    F: Future<Output = Result<T, Status>>,
{
    match AssertUnwindSafe(fut).catch_unwind().await {
        Ok(result) => result,
        Err(_) => {
            tracing::error!("panic recovered in grpc handler");
            Err(Status::internal("internal error"))
        }
    }
}

#[tonic::async_trait]
impl MetricsService for MetricsGrpc {
    async fn update(
        &self,
        request: Request<MetricProto>,
    ) -> Result<Response<MetricProto>, Status> {
        self.check_subnet(&request)?;

        recovered(async {
            let metric = Metric::try_from(request.into_inner())
                .map_err(|_| Status::invalid_argument(ERR_WRONG_METRIC_TYPE))?;

            tracing::debug!(id = %metric.id, kind = %metric.mtype, "grpc update");
            let stored = self.state.ingest.set_one(metric).await.map_err(to_status)?;
            self.dump_after_mutation().await;

            Ok(Response::new(MetricProto::from(&stored)))
        })
        .await
    }

    async fn get_value(
        &self,
        request: Request<GetMetricRequest>,
    ) -> Result<Response<MetricProto>, Status> {
        self.check_subnet(&request)?;

        recovered(async {
            let query = request.into_inner();
            let mtype = metric_type_from_proto(query.r#type)?;

            let metric = self
                .state
                .ingest
                .get_one(mtype, &query.id)
                .await
                .map_err(to_status)?;

            Ok(Response::new(MetricProto::from(&metric)))
        })
        .await
    }

    async fn update_batch(
        &self,
        request: Request<MetricBatchProto>,
    ) -> Result<Response<UpdateBatchResponse>, Status> {
        self.check_subnet(&request)?;

        recovered(async {
            let batch = request.into_inner();
            let metrics: Vec<Metric> = batch
                .metrics
                .into_iter()
                .map(Metric::try_from)
                .collect::<Result<_, _>>()
                .map_err(|_| Status::invalid_argument(ERR_WRONG_METRIC_TYPE))?;

            tracing::debug!(count = metrics.len(), "grpc batch update");
            self.state
                .ingest
                .set_many(&metrics)
                .await
                .map_err(to_status)?;
            self.dump_after_mutation().await;

            Ok(Response::new(UpdateBatchResponse {}))
        })
        .await
    }
}
