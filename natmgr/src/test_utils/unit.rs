use std::mem;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use crate::bail;
use crate::error::{ErrorKind, NatResult};
use crate::source::EventSource;
use crate::test_utils::recorder::StepRecorder;
use crate::unit::TaskUnit;

/// Task unit stand-in with no domain logic.
///
/// Hands its scripted sources to the event loop on registration and counts
/// how often the loop invokes it. The optional [`StepRecorder`] places the
/// pool-state flush into the shared cleanup step order.
pub struct StubTaskUnit {
    sources: Vec<Box<dyn EventSource>>,
    state: Arc<StubState>,
    recorder: Option<StepRecorder>,
}

#[derive(Default)]
struct StubState {
    periodic_calls: AtomicUsize,
    flush_calls: AtomicUsize,
    fail_periodic: AtomicBool,
}

/// Test-side handle observing a [`StubTaskUnit`] after it moved into the loop.
#[derive(Clone)]
pub struct StubTaskUnitHandle {
    state: Arc<StubState>,
}

impl StubTaskUnit {
    /// Creates a unit with no event sources.
    pub fn new() -> (Self, StubTaskUnitHandle) {
        let state = Arc::new(StubState::default());

        let unit = Self {
            sources: Vec::new(),
            state: state.clone(),
            recorder: None,
        };

        (unit, StubTaskUnitHandle { state })
    }

    /// Adds a scripted event source handed out by `selectables`.
    pub fn with_source(mut self, source: Box<dyn EventSource>) -> Self {
        self.sources.push(source);
        self
    }

    /// Records pool-state flushes on the given recorder.
    pub fn with_recorder(mut self, recorder: StepRecorder) -> Self {
        self.recorder = Some(recorder);
        self
    }
}

impl StubTaskUnitHandle {
    /// Returns how many periodic passes ran over the unit.
    pub fn periodic_calls(&self) -> usize {
        self.state.periodic_calls.load(Ordering::SeqCst)
    }

    /// Returns how many times the pool-state flush was invoked.
    pub fn flush_calls(&self) -> usize {
        self.state.flush_calls.load(Ordering::SeqCst)
    }

    /// Makes every future periodic pass fail.
    pub fn fail_periodic(&self) {
        self.state.fail_periodic.store(true, Ordering::SeqCst);
    }
}

#[async_trait::async_trait]
impl TaskUnit for StubTaskUnit {
    fn name(&self) -> &'static str {
        "stub"
    }

    async fn selectables(&mut self) -> NatResult<Vec<Box<dyn EventSource>>> {
        Ok(mem::take(&mut self.sources))
    }

    async fn run_periodic(&mut self) -> NatResult<()> {
        self.state.periodic_calls.fetch_add(1, Ordering::SeqCst);

        if self.state.fail_periodic.load(Ordering::SeqCst) {
            bail!(
                ErrorKind::Unknown,
                "Periodic pass was scripted to fail"
            );
        }

        Ok(())
    }

    async fn flush_pool_state(&self) -> NatResult<()> {
        self.state.flush_calls.fetch_add(1, Ordering::SeqCst);

        match &self.recorder {
            Some(recorder) => recorder.record("flush_pool_state"),
            None => Ok(()),
        }
    }
}
