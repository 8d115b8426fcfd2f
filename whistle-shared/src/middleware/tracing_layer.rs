use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human readable, with file and line.
    Pretty,
    /// One JSON object per event, for log shipping.
    Json,
}

impl LogFormat {
    /// `Json` when `WHISTLE_ENV` is `production`.
    pub fn from_env() -> Self {
        Self::for_environment(std::env::var("WHISTLE_ENV").ok().as_deref())
    }

    fn for_environment(env: Option<&str>) -> Self {
        match env {
            Some(e) if e.eq_ignore_ascii_case("production") => Self::Json,
            _ => Self::Pretty,
        }
    }
}

/// Default filter when `RUST_LOG` is unset: info everywhere, debug for the
/// service's own crate and for request tracing.
fn default_directives(service_name: &str) -> String {
    format!("info,{}=debug,tower_http=debug", service_name.replace('-', "_"))
}

/// Install the global subscriber for `service_name`.
pub fn init_tracing(service_name: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(service_name)));
    let format = LogFormat::from_env();

    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Json => registry
            .with(fmt::layer().json().with_current_span(true).with_target(true))
            .init(),
        LogFormat::Pretty => registry
            .with(fmt::layer().with_target(true).with_file(true).with_line_number(true))
            .init(),
    }

    tracing::info!(service = service_name, ?format, "tracing initialized");
}
