// src/logging.rs
//! Logging setup.
//!
//! Everything logs through the `log` facade; `env_logger` writes to stderr
//! so stdout stays clean for command output (JSON listings, credentials).

use env_logger::{Builder, Env};

/// Initializes the global logger.
///
/// `RUST_LOG` overrides `default_level` when set. Call once, early in `main`.
pub fn init_logging(default_level: &str) {
    let mut builder = Builder::from_env(Env::default().default_filter_or(default_level));
    builder.format_timestamp_millis();
    if builder.try_init().is_err() {
        log::debug!("logger already initialized");
    }
}
