//! Single-threaded event loop multiplexing the daemon's event sources.
//!
//! The loop waits on every registered [`EventSource`] at once, bounded by a
//! fixed idle timeout. A readiness notification dispatches exactly one
//! source handler; an idle timeout runs one periodic pass over all
//! registered [`TaskUnit`]s. Termination is a flag observed between turns,
//! so cleanup always happens on the loop's own task after [`EventLoop::run`]
//! returns.

use std::time::Duration;

use futures::FutureExt;
use metrics::counter;
use tracing::{debug, error, info, warn};

use crate::concurrency::shutdown::ShutdownRx;
use crate::error::{ErrorKind, NatError, NatResult};
use crate::metrics::{
    NATMGR_DISPATCHES_TOTAL, NATMGR_PERIODIC_PASSES_TOTAL, NATMGR_WAIT_ERRORS_TOTAL,
    SOURCE_NAME_LABEL, UNIT_NAME_LABEL,
};
use crate::source::EventSource;
use crate::unit::TaskUnit;

/// Fixed upper bound on one multiplexed wait.
///
/// When no source becomes ready within this window, the loop runs one
/// periodic pass instead.
pub const SELECT_TIMEOUT: Duration = Duration::from_millis(1000);

/// Outcome of one multiplexed wait.
enum LoopTurn {
    /// Termination was requested.
    Terminate,
    /// The source at the given registry index has buffered data.
    Dispatch(usize),
    /// Waiting for readiness failed for the source at the given index.
    WaitError(usize, NatError),
    /// No source became ready within the timeout window.
    Idle,
}

/// Event loop owning the daemon's event sources and task units.
///
/// Sources and units are registered up front via [`EventLoop::register_unit`]
/// and owned by the loop from then on. [`EventLoop::run`] consumes the loop
/// and hands the units back when termination is requested.
pub struct EventLoop {
    sources: Vec<Box<dyn EventSource>>,
    /// Sources whose wait failed terminally; skipped by the multiplexed wait.
    dead: Vec<bool>,
    units: Vec<Box<dyn TaskUnit>>,
    select_timeout: Duration,
    shutdown_rx: ShutdownRx,
}

impl EventLoop {
    /// Creates an empty event loop observing the given shutdown channel.
    pub fn new(shutdown_rx: ShutdownRx) -> Self {
        Self {
            sources: Vec::new(),
            dead: Vec::new(),
            units: Vec::new(),
            select_timeout: SELECT_TIMEOUT,
            shutdown_rx,
        }
    }

    /// Registers a task unit and the event sources it selects on.
    ///
    /// Units run their periodic pass in registration order.
    pub async fn register_unit(&mut self, mut unit: Box<dyn TaskUnit>) -> NatResult<()> {
        let sources = unit.selectables().await?;

        info!(
            unit = unit.name(),
            sources = sources.len(),
            "registering task unit"
        );

        self.dead.resize(self.dead.len() + sources.len(), false);
        self.sources.extend(sources);
        self.units.push(unit);

        Ok(())
    }

    /// Runs the loop until termination is requested.
    ///
    /// Each turn waits on all sources at once, bounded by the idle timeout.
    /// Readiness dispatches exactly one source handler, which drains only
    /// the data it has already buffered. A timeout runs one periodic pass
    /// over every unit in registration order. Transient wait errors are
    /// logged and the wait is retried; a source that loses its subscription
    /// is dropped from the wait set so the remaining sources and the
    /// periodic passes keep running. Handler and periodic errors abort the
    /// loop.
    ///
    /// On termination the units are handed back so the caller can run final
    /// cleanup against them.
    pub async fn run(mut self) -> NatResult<Vec<Box<dyn TaskUnit>>> {
        info!(
            sources = self.sources.len(),
            units = self.units.len(),
            "starting main loop"
        );

        loop {
            // Check for termination before waiting, so a request that
            // arrived while a handler was running is observed immediately.
            if self.shutdown_rx.is_shutdown() {
                info!("termination requested, leaving main loop");
                return Ok(self.units);
            }

            let turn = tokio::select! {
                biased;

                // PRIORITY 1: Observe termination requests.
                _ = self.shutdown_rx.wait_for_shutdown() => LoopTurn::Terminate,

                // PRIORITY 2: Wait for a source to become ready, bounded by
                // the idle timeout.
                outcome = tokio::time::timeout(
                    self.select_timeout,
                    Self::next_ready(&mut self.sources, &self.dead),
                ) => match outcome {
                    Ok((index, Ok(()))) => LoopTurn::Dispatch(index),
                    Ok((index, Err(error))) => LoopTurn::WaitError(index, error),
                    Err(_) => LoopTurn::Idle,
                },
            };

            match turn {
                LoopTurn::Terminate => {
                    info!("termination requested, leaving main loop");
                    return Ok(self.units);
                }
                LoopTurn::Dispatch(index) => {
                    let source = &mut self.sources[index];

                    debug!(source = source.name(), "dispatching ready event source");
                    counter!(
                        NATMGR_DISPATCHES_TOTAL,
                        SOURCE_NAME_LABEL => source.name().to_owned()
                    )
                    .increment(1);

                    source.handle().await?;
                }
                LoopTurn::WaitError(index, error) => {
                    counter!(NATMGR_WAIT_ERRORS_TOTAL).increment(1);

                    // A lost subscription never recovers on its own; leaving
                    // the source in the wait set would fail every turn and
                    // starve the periodic passes.
                    if error.kind() == ErrorKind::SubscriptionLost {
                        error!(
                            source = self.sources[index].name(),
                            error = %error,
                            "event source lost its subscription, dropping it from the wait set"
                        );
                        self.dead[index] = true;
                    } else {
                        warn!(error = %error, "failed to wait for event sources, retrying");
                    }
                }
                LoopTurn::Idle => {
                    for unit in self.units.iter_mut() {
                        counter!(
                            NATMGR_PERIODIC_PASSES_TOTAL,
                            UNIT_NAME_LABEL => unit.name()
                        )
                        .increment(1);

                        unit.run_periodic().await?;
                    }
                }
            }
        }
    }

    /// Waits until any live source is ready and returns its registry index
    /// alongside the wait outcome.
    ///
    /// Dead sources are skipped. With no live source left the wait never
    /// resolves and the loop runs on its idle timeout alone.
    async fn next_ready(
        sources: &mut [Box<dyn EventSource>],
        dead: &[bool],
    ) -> (usize, NatResult<()>) {
        let waits: Vec<_> = sources
            .iter_mut()
            .enumerate()
            .filter(|(index, _)| !dead[*index])
            .map(|(index, source)| source.ready().map(move |result| (index, result)).boxed())
            .collect();

        if waits.is_empty() {
            return std::future::pending().await;
        }

        let (outcome, _, _) = futures::future::select_all(waits).await;
        outcome
    }
}
