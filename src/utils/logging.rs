use tracing_subscriber::{EnvFilter, fmt};

use crate::config::LoggingConfig;

/// Initializes the global tracing subscriber. `RUST_LOG` wins over the
/// configured level; `format: json` switches to structured output.
pub fn init_tracing(config: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.clone()));

    let builder = fmt().with_env_filter(filter).with_target(true);
    if config.format.eq_ignore_ascii_case("json") {
        builder.json().init();
    } else {
        builder.init();
    }
}
