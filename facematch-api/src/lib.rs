use axum::Router;
use facematch_common::metrics::{add_metrics_route, track_metrics};
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub mod config;
pub mod handlers;
pub mod keys;
pub mod upload;

/// The full application: routes, tracing, CORS and HTTP metrics.
///
/// The Prometheus recorder is global, so it is only installed by the binary and passed in here;
/// tests build the router without it.
pub fn router(
    state: handlers::AppState,
    max_body_size: usize,
    concurrency_limit: usize,
    recorder_handle: Option<PrometheusHandle>,
) -> Router {
    let router = handlers::add_routes(Router::new(), state, max_body_size, concurrency_limit);

    let router = match recorder_handle {
        Some(recorder_handle) => add_metrics_route(router, recorder_handle),
        None => router,
    };

    router
        .layer(axum::middleware::from_fn(track_metrics))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
