use natmgr::cleanup::ShutdownCoordinator;
use natmgr::concurrency::shutdown::{ShutdownTx, create_shutdown_channel};
use natmgr::error::ErrorKind;
use natmgr::event_loop::EventLoop;
use natmgr::flush::SystemStateFlusher;
use natmgr::nat_error;
use natmgr::notify::PeerNotifier;
use natmgr::store::{StoreConnection, StoreDb, StoreSubscriber};
use natmgr_config::shared::{NatmgrdConfig, NatmgrdConfigWithoutSecrets};
use tokio::signal::unix::{Signal, SignalKind, signal};
use tracing::{debug, info, warn};

use crate::error::NatmgrdResult;
use crate::tables::NatTablesUnit;

/// The daemon with setup completed, ready to dispatch events.
///
/// Splitting construction from [`Natmgrd::run`] keeps the process exit
/// policy simple: everything that can fail in [`setup`] is a setup failure,
/// everything after it ends the process with the run exit status.
pub struct Natmgrd {
    event_loop: EventLoop,
    coordinator: ShutdownCoordinator<SystemStateFlusher, PeerNotifier>,
}

/// Connects the stores, wires the termination signal, and registers the
/// NAT tables unit with the event loop.
///
/// The configuration and state store connections are required; without them
/// the daemon has no event sources and no pool state to clean, so failure
/// aborts startup. The application store only backs the peer notifier, so
/// the daemon runs without it and skips the notification step on cleanup.
pub async fn setup(config: NatmgrdConfig) -> NatmgrdResult<Natmgrd> {
    info!("starting natmgrd");
    log_config(&config);

    // Register the termination signal stream up front; a daemon that cannot
    // observe SIGTERM would skip cleanup entirely.
    let sigterm = signal(SignalKind::terminate()).map_err(|err| {
        nat_error!(
            ErrorKind::SignalSetupFailed,
            "Failed to register the SIGTERM handler",
            source: err
        )
    })?;

    let config_store = StoreConnection::connect(&config.store, StoreDb::Config).await?;
    let state_store = StoreConnection::connect(&config.store, StoreDb::State).await?;
    let subscriber = StoreSubscriber::connect(&config.store, StoreDb::Config).await?;

    let notifier = match StoreConnection::connect(&config.store, StoreDb::Appl).await {
        Ok(connection) => Some(PeerNotifier::new(connection, config.cleanup_channel.clone())),
        Err(error) => {
            warn!(
                error = %error,
                "application store unavailable, peers will not be notified on cleanup"
            );
            None
        }
    };

    let (shutdown_tx, shutdown_rx) = create_shutdown_channel();
    spawn_signal_listener(sigterm, shutdown_tx);

    let mut event_loop = EventLoop::new(shutdown_rx);
    let unit = NatTablesUnit::new(subscriber, config_store, state_store);
    event_loop.register_unit(Box::new(unit)).await?;

    let coordinator = ShutdownCoordinator::new(SystemStateFlusher, notifier);

    Ok(Natmgrd {
        event_loop,
        coordinator,
    })
}

impl Natmgrd {
    /// Runs the event loop until termination, then the cleanup protocol.
    ///
    /// A dispatch error escapes before cleanup starts and surfaces at the
    /// process boundary. When the loop stops because of the termination
    /// signal, the coordinator runs the full protocol on this same task.
    pub async fn run(self) -> NatmgrdResult<()> {
        let units = self.event_loop.run().await?;

        self.coordinator.run(&units).await;

        Ok(())
    }
}

/// Spawns the task that turns process signals into a termination request.
///
/// The task does nothing beyond raising the shutdown flag; all cleanup work
/// runs on the event loop's task once the loop observes the flag, so no
/// logging or process spawning ever happens in signal-delivery context.
fn spawn_signal_listener(mut sigterm: Signal, shutdown_tx: ShutdownTx) {
    tokio::spawn(async move {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("sigint (ctrl+c) received, shutting down");
            }
            _ = sigterm.recv() => {
                info!("sigterm received, shutting down");
            }
        }

        if let Err(error) = shutdown_tx.shutdown() {
            warn!(error = ?error, "failed to send shutdown signal");
        }
    });
}

fn log_config(config: &NatmgrdConfig) {
    let redacted: NatmgrdConfigWithoutSecrets = config.clone().into();

    debug!(
        host = redacted.store.host,
        port = redacted.store.port,
        username = redacted.store.username,
        "state store connection config"
    );
    debug!(
        cleanup_channel = redacted.cleanup_channel,
        "cleanup notification config"
    );
}
