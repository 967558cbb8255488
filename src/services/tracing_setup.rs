//! Tracing subscriber setup
//!
//! Shared between the binary and tests: the binary installs the global
//! subscriber, tests build a scoped one around a temp file.

use std::fs::File;
use std::path::Path;
use std::sync::Arc;

use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

/// Initialize the global tracing subscriber with file logging.
///
/// Filtering follows `RUST_LOG` with an INFO default; session internals log
/// at DEBUG and below. Returns false if the log file could not be created or
/// a subscriber was already installed.
pub fn init_global(log_file_path: &Path) -> bool {
    let Ok(log_file) = File::create(log_file_path) else {
        return false;
    };
    let subscriber = build_subscriber(log_file);
    tracing::subscriber::set_global_default(subscriber).is_ok()
}

/// Build a file-logging subscriber. The core configuration shared between
/// production and tests.
pub fn build_subscriber(log_file: File) -> impl tracing::Subscriber + Send + Sync {
    let env_filter = EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into());
    let fmt_layer = fmt::layer().with_writer(Arc::new(log_file)).with_ansi(false);

    tracing_subscriber::registry().with(fmt_layer).with(env_filter)
}
