//! Observability: structured, leveled logging via `tracing` +
//! `tracing-subscriber`. `RUST_LOG` takes precedence over the configured
//! level, and the subscriber is installed once at process start.

use tracing_subscriber::{fmt, EnvFilter};

use crate::config::LoggingSection;

/// Installs the global `tracing` subscriber. `format` selects between a
/// human-readable compact layout and newline-delimited JSON
/// (`logging.format`); `RUST_LOG` overrides `level` when set.
pub fn init_tracing(logging: &LoggingSection) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(logging.level.clone()));

    let subscriber = fmt().with_env_filter(filter);

    let result = if logging.format.eq_ignore_ascii_case("json") {
        subscriber.json().try_init()
    } else {
        subscriber.compact().try_init()
    };

    if let Err(err) = result {
        eprintln!("tracing subscriber already initialized: {err}");
    }
}

/// No-op placeholder kept so the Lifecycle Supervisor's shutdown sequence
/// has a symmetric call even though this core has no exporter to flush.
pub fn shutdown_tracing() {}
