use crate::state::AppState;
use crate::{api, middleware};
use axum::routing::{get, post};
use axum::Router;
use tower_http::catch_panic::CatchPanicLayer;

/// Builds the HTTP router with the full middleware chain.
///
/// Layers run outermost-first: panic recovery, request logging, trusted
/// subnet, decryption, gzip, body integrity, then the handlers.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(api::index))
        .route("/ping", get(api::ping))
        .route("/value/:type/:name", get(api::get_value_by_path))
        .route("/value/", post(api::get_value_by_json))
        .route("/update/", post(api::update_by_json))
        .route("/update/:type/:name/:value", post(api::update_by_path))
        .route("/updates/", post(api::update_batch))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::hash_check_and_sign,
        ))
        .layer(axum::middleware::from_fn(middleware::gzip))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::decrypt_body,
        ))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::trusted_subnet_check,
        ))
        .layer(axum::middleware::from_fn(middleware::request_logging))
        .layer(CatchPanicLayer::new())
        .with_state(state)
}
