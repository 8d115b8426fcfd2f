use std::sync::Arc;

use whistle_reports::config::AppConfig;
use whistle_reports::{build_router, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    whistle_shared::middleware::init_tracing("whistle-reports");

    let config = AppConfig::load()?;
    let port = config.port;

    let metrics_handle = whistle_shared::middleware::init_metrics()?;

    let state = Arc::new(AppState::new(config, Some(metrics_handle)));
    let app = build_router(state);

    let addr = format!("0.0.0.0:{port}");
    tracing::info!(addr = %addr, "whistle-reports starting");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
