//! # pesa-logging
//!
//! Global `tracing` subscriber setup. Output goes to stderr, either compact
//! human-readable lines or JSON objects. `RUST_LOG`, when set, takes
//! precedence over the configured level.

#![deny(unsafe_code)]

pub mod types;

pub use types::LogLevel;

use tracing_subscriber::EnvFilter;

/// Build the level filter: `RUST_LOG` if present and valid, else `level`.
pub fn build_filter(level: LogLevel) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_filter_str()))
}

/// Initialize the global tracing subscriber.
///
/// Call once at startup. Later calls are no-ops.
pub fn init_subscriber(level: LogLevel, json: bool) {
    let filter = build_filter(level);

    if json {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .with_writer(std::io::stderr)
            .json()
            .flatten_event(true)
            .try_init();
    } else {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .with_writer(std::io::stderr)
            .compact()
            .try_init();
    }
}
