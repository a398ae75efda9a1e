use std::time::Duration;

use natmgr::cleanup::ShutdownCoordinator;
use natmgr::concurrency::shutdown::create_shutdown_channel;
use natmgr::event_loop::EventLoop;
use natmgr::test_utils::{
    QueueSource, RecordingFlush, RecordingNotifier, StepRecorder, StubTaskUnit,
};
use natmgr::unit::TaskUnit;
use tokio::time::sleep;

/// The full protocol order: kernel state first, then the peer, then local
/// pool state.
const FULL_PROTOCOL: [&str; 5] = [
    "flush_nat_rules",
    "flush_mangle_rules",
    "flush_conntrack",
    "notify_peers",
    "flush_pool_state",
];

fn recording_units(recorder: &StepRecorder, count: usize) -> Vec<Box<dyn TaskUnit>> {
    (0..count)
        .map(|_| {
            let (unit, _handle) = StubTaskUnit::new();
            Box::new(unit.with_recorder(recorder.clone())) as Box<dyn TaskUnit>
        })
        .collect()
}

#[tokio::test]
async fn cleanup_steps_run_in_fixed_order() {
    let recorder = StepRecorder::new();
    let coordinator = ShutdownCoordinator::new(
        RecordingFlush::new(recorder.clone()),
        Some(RecordingNotifier::new(recorder.clone())),
    );
    let units = recording_units(&recorder, 1);

    coordinator.run(&units).await;

    assert_eq!(recorder.steps(), FULL_PROTOCOL);
}

#[tokio::test]
async fn failing_step_does_not_block_later_steps() {
    let recorder = StepRecorder::new();
    recorder.fail_step("flush_nat_rules");

    let coordinator = ShutdownCoordinator::new(
        RecordingFlush::new(recorder.clone()),
        Some(RecordingNotifier::new(recorder.clone())),
    );
    let units = recording_units(&recorder, 1);

    coordinator.run(&units).await;

    assert_eq!(recorder.steps(), FULL_PROTOCOL);
}

#[tokio::test]
async fn every_step_failing_still_runs_the_full_protocol() {
    let recorder = StepRecorder::new();
    for step in FULL_PROTOCOL {
        recorder.fail_step(step);
    }

    let coordinator = ShutdownCoordinator::new(
        RecordingFlush::new(recorder.clone()),
        Some(RecordingNotifier::new(recorder.clone())),
    );
    let units = recording_units(&recorder, 1);

    coordinator.run(&units).await;

    assert_eq!(recorder.steps(), FULL_PROTOCOL);
}

#[tokio::test]
async fn missing_notifier_skips_only_the_notification_step() {
    let recorder = StepRecorder::new();
    let coordinator = ShutdownCoordinator::<_, RecordingNotifier>::new(
        RecordingFlush::new(recorder.clone()),
        None,
    );
    let units = recording_units(&recorder, 1);

    coordinator.run(&units).await;

    assert_eq!(
        recorder.steps(),
        vec![
            "flush_nat_rules",
            "flush_mangle_rules",
            "flush_conntrack",
            "flush_pool_state",
        ]
    );
}

#[tokio::test]
async fn every_registered_unit_is_flushed() {
    let recorder = StepRecorder::new();
    let coordinator = ShutdownCoordinator::new(
        RecordingFlush::new(recorder.clone()),
        Some(RecordingNotifier::new(recorder.clone())),
    );
    let units = recording_units(&recorder, 3);

    coordinator.run(&units).await;

    let steps = recorder.steps();
    assert_eq!(steps.len(), 7);
    assert!(steps[4..].iter().all(|step| step == "flush_pool_state"));
}

#[tokio::test(start_paused = true)]
async fn termination_signal_drives_the_full_protocol_exactly_once() {
    let (shutdown_tx, shutdown_rx) = create_shutdown_channel();
    let recorder = StepRecorder::new();

    let (source, source_handle) = QueueSource::new("scripted");
    let (unit, _unit_handle) = StubTaskUnit::new();
    let unit = unit
        .with_source(Box::new(source))
        .with_recorder(recorder.clone());

    let mut event_loop = EventLoop::new(shutdown_rx);
    event_loop.register_unit(Box::new(unit)).await.unwrap();
    let handle = tokio::spawn(event_loop.run());

    // Some regular traffic before the signal arrives mid-wait.
    source_handle.send(1);
    sleep(Duration::from_millis(100)).await;

    // Repeat deliveries collapse into one termination request.
    shutdown_tx.shutdown().unwrap();
    shutdown_tx.shutdown().unwrap();

    let units = handle.await.unwrap().unwrap();

    let coordinator = ShutdownCoordinator::new(
        RecordingFlush::new(recorder.clone()),
        Some(RecordingNotifier::new(recorder.clone())),
    );
    coordinator.run(&units).await;

    assert_eq!(source_handle.handled(), vec![1]);
    assert_eq!(recorder.steps(), FULL_PROTOCOL);
    assert_eq!(
        recorder
            .steps()
            .iter()
            .filter(|step| *step == "notify_peers")
            .count(),
        1
    );
}
