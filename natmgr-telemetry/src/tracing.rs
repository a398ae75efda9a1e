use std::io::{self, IsTerminal};

use thiserror::Error;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_log::LogTracer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{EnvFilter, fmt};

/// Default directive applied when `RUST_LOG` is not set.
const DEFAULT_LOG_DIRECTIVE: &str = "info";

/// Errors encountered while installing the tracing stack.
#[derive(Debug, Error)]
pub enum InitTracingError {
    /// Failed to redirect `log` records into `tracing`.
    #[error("failed to redirect log records into tracing: {0}")]
    LogTracer(#[from] tracing_log::log::SetLoggerError),

    /// Failed to install the global subscriber.
    #[error("failed to install tracing subscriber: {0}")]
    SetGlobalDefault(#[from] tracing::subscriber::SetGlobalDefaultError),
}

/// Initializes the global tracing subscriber for a service.
///
/// Events are filtered through `RUST_LOG` (defaulting to `info`) and written
/// to stdout through a non-blocking writer so that logging never stalls the
/// event loop. `log` records from dependencies are bridged into `tracing`.
///
/// The returned [`WorkerGuard`] must be held for the lifetime of the process;
/// dropping it flushes buffered log lines.
pub fn init_tracing(service_name: &str) -> Result<WorkerGuard, InitTracingError> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_DIRECTIVE));

    let (writer, guard) = tracing_appender::non_blocking(io::stdout());

    let fmt_layer = fmt::layer()
        .with_target(false)
        .with_ansi(io::stdout().is_terminal())
        .with_writer(writer);

    let subscriber = tracing_subscriber::registry().with(env_filter).with(fmt_layer);

    LogTracer::init()?;
    tracing::subscriber::set_global_default(subscriber)?;

    tracing::info!(service = service_name, "tracing initialized");

    Ok(guard)
}
