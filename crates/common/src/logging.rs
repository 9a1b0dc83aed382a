//! Logging setup and configuration
//!
//! Everything logs to stderr: a worker process's stdout is reserved for
//! state frames.

use tracing::Dispatch;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

fn build_filter(default_level: &str) -> crate::Result<EnvFilter> {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .map_err(|e| crate::Error::Config(format!("Invalid log filter: {}", e)))
}

/// Build a log sink without installing it globally
///
/// Device workers receive their sink at construction and run under it.
pub fn build_dispatch(default_level: &str) -> crate::Result<Dispatch> {
    let subscriber = tracing_subscriber::registry()
        .with(build_filter(default_level)?)
        .with(fmt::layer().with_writer(std::io::stderr));

    Ok(Dispatch::new(subscriber))
}

/// Setup tracing subscriber for the application
pub fn setup_logging(default_level: &str) -> crate::Result<()> {
    tracing_subscriber::registry()
        .with(build_filter(default_level)?)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    Ok(())
}
