pub use tracing::{debug, error, info, warn, trace, instrument};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt::{self, format::FmtSpan}};

pub fn init() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info"));
    install(env_filter);
}

/// Installs the subscriber with a fixed level, ignoring `RUST_LOG`.
pub fn init_with_level(level: &str) {
    install(EnvFilter::new(level));
}

fn install(env_filter: EnvFilter) {
    let is_debug = env_filter.to_string().contains("debug")
        || env_filter.to_string().contains("trace")
        || std::env::var("RUST_LOG").unwrap_or_default().contains("debug");

    let fmt_layer = fmt::layer()
        .with_target(false)
        .with_timer(fmt::time::uptime())
        .with_span_events(if is_debug {
            FmtSpan::CLOSE
        } else {
            FmtSpan::NONE
        });

    // try_init: tests and embedding applications may already own the global subscriber
    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init();
}
