#![allow(dead_code)]

use axum::body::{to_bytes, Body};
use axum::http::{Request, Response, StatusCode};
use axum::Router;
use std::sync::Arc;
use tower::ServiceExt;
use vitals_server::app;
use vitals_server::config::ServerConfig;
use vitals_server::dumper::Dumper;
use vitals_server::state::AppState;
use vitals_storage::{MemStorage, Storage};

pub struct TestContext {
    pub state: AppState,
    pub app: Router,
}

/// Builds a router over a fresh in-memory storage. The dumper honors the
/// config, so tests can exercise synchronous and restore modes by pointing
/// `file_storage_path` at a temp file.
pub async fn build_context(cfg: &ServerConfig) -> TestContext {
    let storage: Arc<dyn Storage> = Arc::new(MemStorage::new());
    let dumper = Arc::new(Dumper::new(storage.clone(), cfg));
    dumper.start().await.expect("dumper restore failed");

    let state = AppState::build(storage, dumper, cfg).expect("state build failed");
    let app = app::build_router(state.clone());

    TestContext { state, app }
}

pub async fn get(app: &Router, path: &str) -> Response<Body> {
    app.clone()
        .oneshot(Request::get(path).body(Body::empty()).unwrap())
        .await
        .unwrap()
}

pub async fn post(app: &Router, path: &str, body: impl Into<Body>) -> Response<Body> {
    app.clone()
        .oneshot(
            Request::post(path)
                .header("Content-Type", "application/json")
                .body(body.into())
                .unwrap(),
        )
        .await
        .unwrap()
}

pub async fn body_string(response: Response<Body>) -> String {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

pub async fn expect_text(response: Response<Body>, status: StatusCode) -> String {
    assert_eq!(response.status(), status);
    body_string(response).await
}
