use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_FILTER: &str = "info,dashboard_core=debug,dashboard_cli=debug";

/// Initialize logging.
/// - `RUST_LOG` respected; default to [`DEFAULT_FILTER`]
/// - `json` switches to one JSON object per line
/// - Always writes to stderr so command output stays parseable
pub fn init(service_name: &str, json: bool) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let registry = tracing_subscriber::registry().with(env_filter);

    if json {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
            .init();
    }

    tracing::debug!(service = %service_name, json, "Logging initialized");
}
