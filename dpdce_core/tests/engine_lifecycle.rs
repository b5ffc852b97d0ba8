//! Worker thread lifecycle: startup, admission control, quit and snapshots.
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use dpdce_core::mocks::{FakeMeasure, FakeModel, MockRig};
use dpdce_core::state::{EngineState, SharedState, Settings};
use dpdce_core::{Command, Engine, EngineError, EngineParams, EnqueueError};
use dpdce_traits::{DpdData, ManualClock};
use tempfile::TempDir;

fn params(dir: &TempDir) -> EngineParams {
    EngineParams {
        plot_directory: dir.path().join("plots"),
        median_to_peak: 12.0,
        max_capture_rounds: 50,
        progress_step: 5,
    }
}

fn start(rig: &MockRig, dir: &TempDir) -> Engine {
    Engine::start(
        rig.collaborators(),
        params(dir),
        Box::new(ManualClock::at_unix(1_700_000_000)),
    )
    .unwrap()
}

fn wait_for(shared: &SharedState, what: &str, pred: impl Fn(&SharedState) -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !pred(shared) {
        assert!(Instant::now() < deadline, "timed out waiting for {what}");
        thread::sleep(Duration::from_millis(2));
    }
}

#[test]
fn start_publishes_transmitter_baseline() {
    let dir = TempDir::new().unwrap();
    let rig = MockRig::default();
    let engine = start(&rig, &dir);
    let snap = engine.shared().snapshot();

    assert_eq!(snap.settings.tx_gain, 70.0);
    assert_eq!(snap.settings.rx_gain, 30.0);
    assert_eq!(snap.settings.digital_gain, 0.6);
    assert_eq!(snap.settings.predistorter, DpdData::default());
    assert_eq!(snap.results.state, EngineState::Idle);
    assert_eq!(snap.results.summary, vec!["DPD has not been calibrated yet"]);
    assert!(dir.path().join("plots").is_dir());
    // Nothing was written to the transmitter.
    assert_eq!(rig.adapt.registers(), dpdce_core::mocks::Registers::default());
    engine.shutdown();
}

#[test]
fn start_fails_when_transmitter_unreachable() {
    let dir = TempDir::new().unwrap();
    let rig = MockRig::default();
    rig.adapt.set_failing(true);
    let err = Engine::start(
        rig.collaborators(),
        params(&dir),
        Box::new(ManualClock::at_unix(0)),
    )
    .err()
    .unwrap();
    assert!(matches!(
        err.downcast_ref::<EngineError>(),
        Some(EngineError::Transmitter(_))
    ));
}

#[test]
fn second_command_while_one_pending_is_busy() {
    let dir = TempDir::new().unwrap();
    let rig = MockRig {
        measure: FakeMeasure::default().with_delay(Duration::from_millis(100)),
        ..MockRig::default()
    };
    let engine = start(&rig, &dir);
    let shared = engine.shared();
    let commands = engine.commands();

    commands.try_enqueue(Command::TriggerRun).unwrap();
    wait_for(&shared, "capture phase", |s| {
        s.results().state == EngineState::CapturingAndModeling
    });
    // The worker took the first command; the slot holds exactly one more.
    assert_eq!(commands.try_enqueue(Command::Calibrate), Ok(()));
    assert_eq!(commands.try_enqueue(Command::Reset), Err(EnqueueError::Busy));
    assert!(commands.is_pending());

    wait_for(&shared, "calibration to finish", |s| {
        s.results().summary.last().map(String::as_str) == Some("Calibration done")
    });
    // Reset was refused, not queued behind calibrate.
    assert_eq!(rig.model.log().resets, 0);
    assert_eq!(shared.settings().predistorter, FakeModel::dpd_after(1));
    engine.shutdown();
}

#[test]
fn quit_lets_running_phase_finish_then_terminates() {
    let dir = TempDir::new().unwrap();
    let rig = MockRig {
        measure: FakeMeasure::default().with_delay(Duration::from_millis(30)),
        ..MockRig::default()
    };
    let engine = start(&rig, &dir);
    let shared = engine.shared();
    let commands = engine.commands();

    commands.try_enqueue(Command::TriggerRun).unwrap();
    wait_for(&shared, "capture phase", |s| {
        s.results().state == EngineState::CapturingAndModeling
    });
    engine.shutdown();

    let snap = shared.snapshot();
    assert_eq!(snap.results.state, EngineState::Terminated);
    assert_eq!(snap.results.progress_percent, 0);
    assert_eq!(rig.model.log().learning_rates.len(), 1);
    assert_eq!(snap.settings.predistorter, FakeModel::dpd_after(1));
    assert_eq!(
        commands.try_enqueue(Command::Calibrate),
        Err(EnqueueError::Terminated)
    );
}

#[test]
fn dropping_engine_joins_worker() {
    let dir = TempDir::new().unwrap();
    let rig = MockRig::default();
    let shared = {
        let engine = start(&rig, &dir);
        engine.shared()
    };
    assert_eq!(shared.results().state, EngineState::Terminated);
}

#[test]
fn readers_never_see_a_half_published_model_update() {
    let dir = TempDir::new().unwrap();
    let mut rig = MockRig {
        measure: FakeMeasure::default().with_delay(Duration::from_millis(2)),
        ..MockRig::default()
    };
    rig.schedule.n_meas = 8;
    let engine = start(&rig, &dir);
    let shared = engine.shared();
    let stop = Arc::new(AtomicBool::new(false));

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let shared = Arc::clone(&shared);
            let stop = Arc::clone(&stop);
            thread::spawn(move || {
                let mut seen = 0usize;
                while !stop.load(Ordering::Relaxed) {
                    let snap = shared.snapshot();
                    assert!(snap.results.progress_percent <= 100);
                    if snap.settings.predistorter == FakeModel::dpd_after(1) {
                        assert_eq!(snap.counters.n_runs, 0);
                        assert!(snap.results.progress_percent >= 90);
                    }
                    if snap.results.state == EngineState::CapturingAndModeling {
                        assert!(snap.results.progress_percent <= 90);
                    }
                    seen += 1;
                }
                seen
            })
        })
        .collect();

    engine.commands().try_enqueue(Command::TriggerRun).unwrap();
    wait_for(&shared, "model update", |s| s.results().progress_percent == 100);
    stop.store(true, Ordering::Relaxed);
    for r in readers {
        assert!(r.join().unwrap() > 0);
    }
    engine.shutdown();
}

#[test]
fn slow_publish_is_all_or_nothing_to_readers() {
    let shared = Arc::new(SharedState::new(Settings {
        rx_gain: 30.0,
        tx_gain: 70.0,
        digital_gain: 0.6,
        predistorter: DpdData::default(),
    }));
    shared.update(|s| {
        s.counters.n_runs = 7;
        s.results.progress_percent = 85;
    });
    let stop = Arc::new(AtomicBool::new(false));

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let shared = Arc::clone(&shared);
            let stop = Arc::clone(&stop);
            thread::spawn(move || {
                let mut seen = 0usize;
                while !stop.load(Ordering::Relaxed) {
                    let snap = shared.snapshot();
                    if snap.settings.predistorter == DpdData::default() {
                        assert_eq!(snap.counters.n_runs, 7);
                        assert_eq!(snap.results.progress_percent, 85);
                    } else {
                        assert_eq!(snap.counters.n_runs, 0);
                        assert_eq!(snap.results.progress_percent, 90);
                    }
                    seen += 1;
                }
                seen
            })
        })
        .collect();

    // Same field order as the model publish, stretched out under the lock.
    thread::sleep(Duration::from_millis(10));
    shared.update(|s| {
        s.settings.predistorter = FakeModel::dpd_after(1);
        thread::sleep(Duration::from_millis(20));
        s.counters.n_runs = 0;
        thread::sleep(Duration::from_millis(20));
        s.results.progress_percent = 90;
    });
    thread::sleep(Duration::from_millis(10));

    stop.store(true, Ordering::Relaxed);
    for r in readers {
        assert!(r.join().unwrap() > 0);
    }
}
