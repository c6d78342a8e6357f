use std::time::Instant;

use axum::{
    body::Body, extract::MatchedPath, http::Request, middleware::Next, response::IntoResponse,
    routing::get, Router,
};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

/// Mount a `/metrics` endpoint rendering everything recorded through the `metrics` facade.
pub fn add_metrics_route(router: Router, recorder_handle: PrometheusHandle) -> Router {
    router.route(
        "/metrics",
        get(move || std::future::ready(recorder_handle.render())),
    )
}

/// Install the global Prometheus recorder. Can only succeed once per process.
pub fn setup_metrics_recorder() -> Result<PrometheusHandle, BuildError> {
    // External calls dominate request latency, so buckets stretch to tens of seconds.
    const EXPONENTIAL_SECONDS: &[f64] = &[
        0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0,
    ];

    PrometheusBuilder::new()
        .set_buckets(EXPONENTIAL_SECONDS)?
        .install_recorder()
}

/// Count and time every request, labelled by method, route and status.
/// Unmatched requests fall back to the raw path.
pub async fn track_metrics(req: Request<Body>, next: Next) -> impl IntoResponse {
    let start = Instant::now();
    let method = req.method().to_string();
    let route = req
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| req.uri().path().to_owned(), |m| m.as_str().to_owned());

    let response = next.run(req).await;

    let labels = [
        ("method", method),
        ("path", route),
        ("status", response.status().as_u16().to_string()),
    ];

    metrics::counter!("facematch_http_requests_total", &labels).increment(1);
    metrics::histogram!("facematch_http_request_duration_seconds", &labels)
        .record(start.elapsed().as_secs_f64());

    response
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use tower::ServiceExt; // for `oneshot`

    use super::*;

    #[tokio::test]
    async fn test_track_metrics_passes_responses_through() {
        let app = Router::new()
            .route("/faces/:id", get(|| async { (StatusCode::ACCEPTED, "ok") }))
            .layer(axum::middleware::from_fn(track_metrics));

        let response = app
            .oneshot(Request::builder().uri("/faces/7").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);

        let response = Router::new()
            .layer(axum::middleware::from_fn(track_metrics))
            .oneshot(Request::builder().uri("/missing").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
