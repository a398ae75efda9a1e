use crate::error::NatResult;
use crate::source::EventSource;

/// Trait for the units of work hosted by the event loop.
///
/// A [`TaskUnit`] bundles the event sources it reacts to with the periodic
/// housekeeping it performs between events. The daemon registers each unit
/// once at startup; the event loop then owns the unit for its entire
/// lifetime and returns it when the loop terminates so that final cleanup
/// can still reach it.
#[async_trait::async_trait]
pub trait TaskUnit: Send {
    /// Returns the name of the unit, used for logging and metrics.
    fn name(&self) -> &'static str;

    /// Yields the event sources this unit wants multiplexed.
    ///
    /// Called once when the unit is registered. A unit without inputs
    /// returns an empty vector and only participates in periodic passes.
    async fn selectables(&mut self) -> NatResult<Vec<Box<dyn EventSource>>>;

    /// Runs one housekeeping pass.
    ///
    /// Invoked on every idle timeout of the event loop, in unit
    /// registration order. Errors abort the event loop.
    async fn run_periodic(&mut self) -> NatResult<()>;

    /// Deletes the operational pool state this unit owns.
    ///
    /// Invoked as the final cleanup step when the daemon terminates, after
    /// the event loop has stopped.
    async fn flush_pool_state(&self) -> NatResult<()>;
}
