//! NAT manager daemon binary.
//!
//! Watches the NAT configuration tables, drives periodic domain work, and
//! cleans up kernel and peer state when the process is asked to terminate.
//! Initializes configuration, telemetry, and the async runtime before
//! handing control to the event loop.

use std::process::ExitCode;

use natmgr_config::shared::NatmgrdConfig;
use natmgr_telemetry::metrics::init_metrics;
use natmgr_telemetry::tracing::init_tracing;
use tracing::error;

use crate::config::load_natmgrd_config;
use crate::error::NatmgrdError;

mod config;
mod core;
mod error;
mod tables;

/// Exit status for failures during setup, before the main loop starts.
const SETUP_FAILED_EXIT: u8 = 1;

/// Exit status once setup has completed.
///
/// The daemon has no successful exit path: the loop runs until the process
/// is terminated, and both a dispatch error and a completed cleanup end the
/// process with this status.
const RUN_EXIT: u8 = 255;

/// Entry point for the NAT manager daemon.
///
/// Loads configuration, initializes tracing and metrics, starts a
/// current-thread runtime, and launches the daemon core. All dispatch is
/// single-threaded by design; only the store client and the signal listener
/// run as separate tasks.
fn main() -> ExitCode {
    let config = match load_natmgrd_config() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("{}", err.render_report());
            return ExitCode::from(SETUP_FAILED_EXIT);
        }
    };

    let _log_flusher = match init_tracing(env!("CARGO_BIN_NAME")) {
        Ok(guard) => guard,
        Err(err) => {
            eprintln!("{}", NatmgrdError::config(err).render_report());
            return ExitCode::from(SETUP_FAILED_EXIT);
        }
    };

    // Metrics are installed before the runtime starts; the exporter runs on
    // its own background thread.
    if let Err(err) = init_metrics(env!("CARGO_BIN_NAME")) {
        error!("{}", NatmgrdError::config(err).render_report());
        return ExitCode::from(SETUP_FAILED_EXIT);
    }

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(err) => {
            error!("{}", NatmgrdError::from(err).render_report());
            return ExitCode::from(SETUP_FAILED_EXIT);
        }
    };

    runtime.block_on(async_main(config))
}

/// Main async entry point running setup, the event loop, and cleanup.
async fn async_main(config: NatmgrdConfig) -> ExitCode {
    let daemon = match core::setup(config).await {
        Ok(daemon) => daemon,
        Err(err) => {
            error!("{}", err.render_report());
            return ExitCode::from(SETUP_FAILED_EXIT);
        }
    };

    if let Err(err) = daemon.run().await {
        error!("{}", err.render_report());
    }

    ExitCode::from(RUN_EXIT)
}
