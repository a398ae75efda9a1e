use std::future::Future;

use metrics::counter;
use tracing::{debug, error, info};

use crate::error::NatResult;
use crate::flush::SystemFlush;
use crate::metrics::{
    CLEANUP_STEP_LABEL, NATMGR_CLEANUP_STEPS_TOTAL, NATMGR_CLEANUP_STEP_FAILURES_TOTAL,
};
use crate::notify::CleanupNotify;
use crate::unit::TaskUnit;

/// Runs the ordered NAT cleanup sequence on shutdown.
///
/// The steps are independent: a failing step is logged and counted, and the
/// sequence moves on to the next one. Nothing is rolled back and nothing is
/// retried, since the daemon is about to exit either way.
pub struct ShutdownCoordinator<F, N> {
    flusher: F,
    notifier: Option<N>,
}

impl<F, N> ShutdownCoordinator<F, N>
where
    F: SystemFlush,
    N: CleanupNotify,
{
    /// Creates a coordinator over the given flusher.
    ///
    /// Pass [`None`] for the notifier when no notification channel was
    /// established; the notification step is then skipped.
    pub fn new(flusher: F, notifier: Option<N>) -> Self {
        Self { flusher, notifier }
    }

    /// Runs every cleanup step in order.
    pub async fn run(&self, units: &[Box<dyn TaskUnit>]) {
        info!("cleaning up NAT state");

        self.run_step("flush_nat_rules", self.flusher.flush_nat_rules())
            .await;
        self.run_step("flush_mangle_rules", self.flusher.flush_mangle_rules())
            .await;
        self.run_step("flush_conntrack", self.flusher.flush_conntrack())
            .await;

        match &self.notifier {
            Some(notifier) => {
                self.run_step("notify_peers", notifier.notify_cleanup())
                    .await;
            }
            None => {
                info!("no notification channel established, skipping peer notification");
            }
        }

        for unit in units {
            debug!(unit = unit.name(), "flushing pool state");
            self.run_step("flush_pool_state", unit.flush_pool_state())
                .await;
        }

        info!("cleanup finished");
    }

    async fn run_step(&self, step: &'static str, action: impl Future<Output = NatResult<()>>) {
        info!(step, "running cleanup step");

        counter!(
            NATMGR_CLEANUP_STEPS_TOTAL,
            CLEANUP_STEP_LABEL => step
        )
        .increment(1);

        if let Err(error) = action.await {
            counter!(
                NATMGR_CLEANUP_STEP_FAILURES_TOTAL,
                CLEANUP_STEP_LABEL => step
            )
            .increment(1);

            error!(step, error = %error, "cleanup step failed, continuing");
        }
    }
}
