use crate::error::NatResult;

/// Trait for readiness-driven inputs multiplexed by the event loop.
///
/// An [`EventSource`] wraps one input the daemon reacts to, typically a
/// watched configuration table. The event loop waits on every registered
/// source at once and dispatches exactly one handler per readiness
/// notification.
///
/// Implementations must keep [`EventSource::ready`] cancel safe: the event
/// loop races all sources against each other and against the idle timeout,
/// dropping the futures that lost the race. Anything observed while waiting
/// has to be buffered inside the source so a canceled wait never loses it.
#[async_trait::async_trait]
pub trait EventSource: Send + Sync {
    /// Returns the name of the source, used for logging and metrics.
    fn name(&self) -> &str;

    /// Waits until the source has buffered data for [`EventSource::handle`].
    ///
    /// Returning an error does not abort the event loop. Transient errors
    /// are logged and the wait retried; a lost subscription drops the
    /// source from the wait set while the rest of the loop keeps running.
    async fn ready(&mut self) -> NatResult<()>;

    /// Consumes the data that is currently buffered.
    ///
    /// Only data already received is drained here; the handler must not
    /// block waiting for more input. Errors returned from this method abort
    /// the event loop and surface at the process boundary.
    async fn handle(&mut self) -> NatResult<()>;
}
