//! Tracing subscriber setup
//!
//! Library code only emits `tracing` events. Binaries (and tests that want
//! to see engine logs) call [`init`] once to install a subscriber with a
//! console layer and, when configured, a daily rolling file layer.

use crate::config::LogSettings;
use crate::error::{FlowError, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Build the filter: `RUST_LOG` wins, then the configured directive.
pub fn build_filter(settings: &LogSettings) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&settings.filter))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Install the global subscriber.
///
/// The returned guard flushes the file writer when dropped; keep it alive for
/// as long as logs should reach the file.
pub fn init(settings: &LogSettings) -> Result<Option<WorkerGuard>> {
    let (file_layer, guard) = match &settings.log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)?;
            let appender = tracing_appender::rolling::daily(dir, &settings.file_prefix);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(build_filter(settings))
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_ansi(settings.ansi),
        )
        .with(file_layer)
        .try_init()
        .map_err(|e| FlowError::Config(format!("Failed to install log subscriber: {}", e)))?;

    Ok(guard)
}
