use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use crate::error::{ErrorKind, NatResult};
use crate::flush::SystemFlush;
use crate::nat_error;
use crate::notify::CleanupNotify;

/// Shared recorder that captures cleanup step executions in order.
///
/// One recorder is typically shared between a [`RecordingFlush`], a
/// [`RecordingNotifier`], and a stub task unit, so that the relative order
/// of all cleanup steps can be asserted from a single list. Individual steps
/// can be scripted to fail after being recorded, which is how tests verify
/// that a failing step never blocks the steps after it.
#[derive(Clone, Default)]
pub struct StepRecorder {
    inner: Arc<Mutex<Inner>>,
}

#[derive(Default)]
struct Inner {
    steps: Vec<String>,
    failing: HashSet<String>,
}

impl StepRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Scripts every future execution of the given step to fail.
    ///
    /// The step is still recorded before the failure is returned, so it
    /// shows up in [`StepRecorder::steps`] like any successful step.
    pub fn fail_step(&self, step: &str) {
        self.inner.lock().unwrap().failing.insert(step.to_owned());
    }

    /// Returns every step recorded so far, in execution order.
    pub fn steps(&self) -> Vec<String> {
        self.inner.lock().unwrap().steps.clone()
    }

    /// Records one step execution, failing it if it was scripted to.
    pub fn record(&self, step: &str) -> NatResult<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.steps.push(step.to_owned());

        if inner.failing.contains(step) {
            return Err(nat_error!(
                ErrorKind::CommandFailed,
                "Cleanup step was scripted to fail",
                step.to_owned()
            ));
        }

        Ok(())
    }
}

/// System flusher that records its invocations instead of running commands.
pub struct RecordingFlush {
    recorder: StepRecorder,
}

impl RecordingFlush {
    pub fn new(recorder: StepRecorder) -> Self {
        Self { recorder }
    }
}

#[async_trait::async_trait]
impl SystemFlush for RecordingFlush {
    async fn flush_nat_rules(&self) -> NatResult<()> {
        self.recorder.record("flush_nat_rules")
    }

    async fn flush_mangle_rules(&self) -> NatResult<()> {
        self.recorder.record("flush_mangle_rules")
    }

    async fn flush_conntrack(&self) -> NatResult<()> {
        self.recorder.record("flush_conntrack")
    }
}

/// Peer notifier that records its invocation instead of publishing.
pub struct RecordingNotifier {
    recorder: StepRecorder,
}

impl RecordingNotifier {
    pub fn new(recorder: StepRecorder) -> Self {
        Self { recorder }
    }
}

#[async_trait::async_trait]
impl CleanupNotify for RecordingNotifier {
    async fn notify_cleanup(&self) -> NatResult<()> {
        self.recorder.record("notify_peers")
    }
}
