use std::time::Instant;

use axum::extract::{MatchedPath, Request};
use axum::middleware::Next;
use axum::response::Response;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

/// Label for requests that matched no route.
const UNMATCHED: &str = "unmatched";

/// Per-route request counter and latency histogram.
///
/// Labels use the route template (`/api/v1/reports/:tracking_id`), so
/// tracking IDs never become label values.
pub async fn metrics_middleware(matched_path: Option<MatchedPath>, req: Request, next: Next) -> Response {
    let route = matched_path.map_or_else(|| UNMATCHED.to_string(), |p| p.as_str().to_string());
    let method = req.method().as_str().to_string();
    let started = Instant::now();

    let response = next.run(req).await;

    let labels = [
        ("method", method),
        ("path", route),
        ("status", response.status().as_u16().to_string()),
    ];
    metrics::counter!("http_requests_total", &labels).increment(1);
    metrics::histogram!("http_request_duration_seconds", &labels).record(started.elapsed().as_secs_f64());

    response
}

/// Install the process-wide Prometheus recorder. Call once, from `main`.
pub fn init_metrics() -> anyhow::Result<PrometheusHandle> {
    Ok(PrometheusBuilder::new().install_recorder()?)
}
