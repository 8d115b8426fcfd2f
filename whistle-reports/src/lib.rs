use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::http::{header, HeaderName, HeaderValue, Method};
use axum::routing::{get, post};
use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use whistle_shared::middleware::{metrics_middleware, JwtSecret};

pub mod config;
pub mod gate;
pub mod issuer;
pub mod lifecycle;
pub mod models;
pub mod rate_limit;
pub mod routes;
pub mod service;
pub mod store;
pub mod validation;

use config::AppConfig;
use routes::{handler, health, reporter};
use service::ReportService;

pub struct AppState {
    pub config: AppConfig,
    pub service: ReportService,
    /// `None` when no global recorder is installed (tests).
    pub metrics_handle: Option<PrometheusHandle>,
}

impl AppState {
    pub fn new(config: AppConfig, metrics_handle: Option<PrometheusHandle>) -> Self {
        Self {
            service: ReportService::new(&config),
            config,
            metrics_handle,
        }
    }
}

impl JwtSecret for AppState {
    fn jwt_secret(&self) -> &str {
        &self.config.jwt_secret
    }
}

pub fn build_router(state: Arc<AppState>) -> Router {
    let reporter_routes = Router::new()
        .route("/reports", post(reporter::submit_report))
        .route("/reports/:tracking_id", get(reporter::get_status))
        .route("/reports/:tracking_id/replies", post(reporter::post_reply));

    let handler_routes = Router::new()
        .route("/reports", get(handler::list_reports))
        .route("/reports/:tracking_id", get(handler::get_report))
        .route(
            "/reports/:tracking_id/attachments/:attachment_id",
            get(handler::download_attachment),
        )
        .route("/reports/:tracking_id/acknowledge", post(handler::acknowledge))
        .route("/reports/:tracking_id/request-info", post(handler::request_info))
        .route("/reports/:tracking_id/messages", post(handler::post_message))
        .route("/reports/:tracking_id/finalize", post(handler::finalize))
        .route("/reports/:tracking_id/close", post(handler::close));

    Router::new()
        .route("/health", get(health::health_check))
        .route("/metrics", get(health::metrics))
        .nest("/api/v1", reporter_routes)
        .nest("/api/v1/handler", handler_routes)
        .layer(axum::middleware::from_fn(metrics_middleware))
        .layer(DefaultBodyLimit::max(state.config.max_body_bytes))
        .layer(cors_layer(&state.config))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn cors_layer(config: &AppConfig) -> CorsLayer {
    let origins: Vec<HeaderValue> = config
        .origins()
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(AllowMethods::list([Method::GET, Method::POST, Method::OPTIONS]))
        .allow_headers(AllowHeaders::list([
            header::AUTHORIZATION,
            header::CONTENT_TYPE,
            header::ACCEPT,
            HeaderName::from_static(reporter::ACCESS_TOKEN_HEADER),
        ]))
}
