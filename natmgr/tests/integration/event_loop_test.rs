use std::time::Duration;

use natmgr::concurrency::shutdown::{ShutdownRx, ShutdownTx, create_shutdown_channel};
use natmgr::error::{ErrorKind, NatResult};
use natmgr::event_loop::EventLoop;
use natmgr::test_utils::{QueueSource, QueueSourceHandle, StubTaskUnit, StubTaskUnitHandle};
use natmgr::unit::TaskUnit;
use tokio::task::JoinHandle;
use tokio::time::sleep;

type LoopHandle = JoinHandle<NatResult<Vec<Box<dyn TaskUnit>>>>;

/// Spawns an event loop over one stub unit with one scripted source.
async fn spawn_loop_with_source() -> (LoopHandle, QueueSourceHandle, StubTaskUnitHandle, ShutdownTx)
{
    let (shutdown_tx, shutdown_rx) = create_shutdown_channel();
    let (source, source_handle) = QueueSource::new("scripted");
    let (unit, unit_handle) = StubTaskUnit::new();
    let unit = unit.with_source(Box::new(source));

    let handle = spawn_loop(shutdown_rx, Box::new(unit)).await;

    (handle, source_handle, unit_handle, shutdown_tx)
}

async fn spawn_loop(shutdown_rx: ShutdownRx, unit: Box<dyn TaskUnit>) -> LoopHandle {
    let mut event_loop = EventLoop::new(shutdown_rx);
    event_loop.register_unit(unit).await.unwrap();

    tokio::spawn(event_loop.run())
}

#[tokio::test(start_paused = true)]
async fn events_are_dispatched_in_arrival_order_without_drop() {
    let (handle, source, unit, shutdown_tx) = spawn_loop_with_source().await;

    // Three changes in rapid succession, with no timer expiry between them.
    source.send(1);
    source.send(2);
    source.send(3);

    sleep(Duration::from_millis(10)).await;
    assert_eq!(source.handled(), vec![1, 2, 3]);
    assert_eq!(unit.periodic_calls(), 0);

    // One full idle interval afterwards triggers exactly one periodic pass.
    sleep(Duration::from_millis(1000)).await;
    assert_eq!(unit.periodic_calls(), 1);

    shutdown_tx.shutdown().unwrap();
    handle.await.unwrap().unwrap();
}

#[tokio::test(start_paused = true)]
async fn periodic_pass_runs_only_after_a_full_idle_interval() {
    let (handle, _source, unit, shutdown_tx) = spawn_loop_with_source().await;

    sleep(Duration::from_millis(999)).await;
    assert_eq!(unit.periodic_calls(), 0);

    sleep(Duration::from_millis(2)).await;
    assert_eq!(unit.periodic_calls(), 1);

    sleep(Duration::from_millis(1000)).await;
    assert_eq!(unit.periodic_calls(), 2);

    shutdown_tx.shutdown().unwrap();
    handle.await.unwrap().unwrap();
}

#[tokio::test(start_paused = true)]
async fn dispatch_resets_the_idle_interval() {
    let (handle, source, unit, shutdown_tx) = spawn_loop_with_source().await;

    // An event halfway through the interval is dispatched promptly and the
    // periodic pass waits for a full idle interval after it.
    sleep(Duration::from_millis(500)).await;
    source.send(7);

    sleep(Duration::from_millis(600)).await;
    assert_eq!(source.handled(), vec![7]);
    assert_eq!(unit.periodic_calls(), 0);

    sleep(Duration::from_millis(500)).await;
    assert_eq!(unit.periodic_calls(), 1);

    shutdown_tx.shutdown().unwrap();
    handle.await.unwrap().unwrap();
}

#[tokio::test(start_paused = true)]
async fn wait_errors_are_transient() {
    let (handle, source, _unit, shutdown_tx) = spawn_loop_with_source().await;

    source.send_ready_error();
    sleep(Duration::from_millis(10)).await;
    assert!(!handle.is_finished());

    // The source still delivers events after the failed wait.
    source.send(42);
    sleep(Duration::from_millis(10)).await;
    assert_eq!(source.handled(), vec![42]);

    shutdown_tx.shutdown().unwrap();
    handle.await.unwrap().unwrap();
}

#[tokio::test(start_paused = true)]
async fn lost_subscription_sidelines_the_source_without_starving_periodic_work() {
    let (handle, source, unit, shutdown_tx) = spawn_loop_with_source().await;

    // Dropping the handle closes the scripted stream, so every subsequent
    // wait on the source reports a lost subscription.
    drop(source);

    sleep(Duration::from_millis(10)).await;
    assert!(!handle.is_finished());

    // The idle timeout still drives periodic passes once the source is
    // dropped from the wait set.
    sleep(Duration::from_millis(1001)).await;
    assert_eq!(unit.periodic_calls(), 1);

    sleep(Duration::from_millis(1000)).await;
    assert_eq!(unit.periodic_calls(), 2);

    shutdown_tx.shutdown().unwrap();
    handle.await.unwrap().unwrap();
}

#[tokio::test(start_paused = true)]
async fn handler_error_aborts_the_loop() {
    let (handle, source, _unit, _shutdown_tx) = spawn_loop_with_source().await;

    source.send_handle_error();

    let Err(error) = handle.await.unwrap() else {
        panic!("the loop should have aborted on the handler error");
    };
    assert_eq!(error.kind(), ErrorKind::Unknown);
}

#[tokio::test(start_paused = true)]
async fn periodic_error_aborts_the_loop() {
    let (handle, _source, unit, _shutdown_tx) = spawn_loop_with_source().await;

    unit.fail_periodic();
    sleep(Duration::from_millis(1001)).await;

    let Err(error) = handle.await.unwrap() else {
        panic!("the loop should have aborted on the periodic error");
    };
    assert_eq!(error.kind(), ErrorKind::Unknown);
}

#[tokio::test(start_paused = true)]
async fn empty_registry_still_runs_periodic_passes_and_terminates() {
    let (shutdown_tx, shutdown_rx) = create_shutdown_channel();
    let (unit, unit_handle) = StubTaskUnit::new();

    let handle = spawn_loop(shutdown_rx, Box::new(unit)).await;

    sleep(Duration::from_millis(1001)).await;
    assert_eq!(unit_handle.periodic_calls(), 1);

    shutdown_tx.shutdown().unwrap();
    let units = handle.await.unwrap().unwrap();
    assert_eq!(units.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn termination_interrupts_a_blocked_wait() {
    let (handle, _source, unit, shutdown_tx) = spawn_loop_with_source().await;

    // No event and no full interval elapsed; the loop sits in its wait.
    sleep(Duration::from_millis(100)).await;
    shutdown_tx.shutdown().unwrap();

    let units = handle.await.unwrap().unwrap();
    assert_eq!(units.len(), 1);
    assert_eq!(unit.periodic_calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn termination_requested_before_run_returns_immediately() {
    let (shutdown_tx, shutdown_rx) = create_shutdown_channel();
    let (unit, _unit_handle) = StubTaskUnit::new();

    shutdown_tx.shutdown().unwrap();

    let handle = spawn_loop(shutdown_rx, Box::new(unit)).await;
    let units = handle.await.unwrap().unwrap();
    assert_eq!(units.len(), 1);
}
