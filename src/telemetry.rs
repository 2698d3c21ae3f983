use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const DEFAULT_FILTER: &str = "rps_lobby=info,actix_web=info";

/// Install the global subscriber. `RUST_LOG` wins over `fallback`, and an
/// unparsable fallback drops back to the crate default.
pub fn init_telemetry(fallback: &str) {
    tracing_subscriber::registry()
        .with(filter(fallback))
        .with(fmt::layer().with_target(true))
        .init();
}

fn filter(fallback: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(fallback))
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}
