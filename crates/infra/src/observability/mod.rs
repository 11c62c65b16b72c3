//! Tracing subscriber setup

use std::sync::Once;

use tidemark_domain::LoggingConfig;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

static INIT: Once = Once::new();

/// Install the global subscriber
///
/// `RUST_LOG` wins over `config.level`. Calling this more than once, or
/// after another subscriber was installed, is a no-op.
pub fn init_tracing(config: &LoggingConfig) {
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(&config.level))
            .unwrap_or_else(|_| EnvFilter::new("info"));

        let registry = tracing_subscriber::registry().with(filter);
        let installed = if config.json {
            registry
                .with(fmt::layer().json().with_current_span(true).with_span_list(false))
                .try_init()
        } else {
            registry.with(fmt::layer().with_target(true)).try_init()
        };

        if installed.is_ok() {
            tracing::debug!(json = config.json, "tracing initialised");
        }
    });
}
