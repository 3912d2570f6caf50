use crate::state::AppState;
use crate::{api, logging};
use axum::extract::DefaultBodyLimit;
use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use tower_http::compression::CompressionLayer;
use tower_http::decompression::RequestDecompressionLayer;

/// Largest request body accepted after decompression.
pub const MAX_REQUEST_BODY: usize = 4 * 1024 * 1024;

/// Builds the metrics HTTP API.
///
/// Request bodies sent with `Content-Encoding: gzip` are decompressed before
/// the handlers see them; responses are gzip-compressed for clients that
/// accept it.
pub fn build_http_app(state: AppState) -> Router {
    Router::new()
        .route("/", get(api::list_metrics))
        .route("/ping", get(api::ping))
        .route("/value/", post(api::value_json))
        .route("/value", post(api::value_json))
        .route("/value/{kind}/{name}", get(api::value_text))
        .route("/update/", post(api::update_json))
        .route("/update", post(api::update_json))
        .route("/update/{kind}/{name}/{value}", post(api::update_text))
        .route("/updates/", post(api::update_batch))
        .route("/updates", post(api::update_batch))
        .with_state(state)
        .layer(RequestDecompressionLayer::new())
        .layer(CompressionLayer::new())
        .layer(middleware::from_fn(logging::request_logging))
        .layer(DefaultBodyLimit::max(MAX_REQUEST_BODY))
}
