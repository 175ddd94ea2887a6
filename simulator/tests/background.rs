use std::sync::Arc;
use std::time::Duration;

use wavesim_simulator::evolver::RunControl;
use wavesim_simulator::ics::{create_gaussian_wave_packet, GaussianPacket};
use wavesim_simulator::watcher::{EvolutionWatcher, Keyframe, KeyframeStorage};
use wavesim_simulator::{Evolver, EvolverConfig, GridSpec, Outcome, SimulationError};

/// 100 steps (T = 0.99, dt = 0.01) with a keyframe every 10 steps.
fn hundred_step_evolver() -> Evolver {
    let spec = GridSpec::new(&[16, 16]).unwrap();
    let packet = GaussianPacket {
        center: [8.0, 8.0, 0.0],
        width: [2.0, 2.0, 1.0],
        momentum: [0.4, 0.0, 0.0],
    };
    let initial = create_gaussian_wave_packet(&spec, 1.0, &packet, [0; 3]).unwrap();
    let config = EvolverConfig::new(spec, 1.0, 0.01, 0.99, 12).progress_every(1);
    let free = |_: [f64; 3], _: [f64; 3]| 0.0;
    Evolver::single(config, 1.0, initial, Box::new(free)).unwrap()
}

/// Stores keyframes and cancels the run once `cancel_after` steps are done.
struct CancelAt {
    control: Arc<RunControl>,
    cancel_after: u64,
    total: u64,
    storage: KeyframeStorage,
}

impl EvolutionWatcher for CancelAt {
    fn before(&mut self, total_steps: u64) {
        self.total = total_steps;
    }

    fn on_keyframe(&mut self, keyframe: &Keyframe) -> Result<(), SimulationError> {
        self.storage.on_keyframe(keyframe)
    }

    fn on_progress(&mut self, fraction: f64) {
        let done = (fraction * self.total as f64).round() as u64;
        if done == self.cancel_after {
            self.control.cancel();
        }
    }
}

#[test]
fn cancel_at_step_five_of_hundred() {
    let evolver = hundred_step_evolver();
    assert_eq!(evolver.total_steps(), 100);
    let control = evolver.control();
    let storage = KeyframeStorage::new();
    let watcher = CancelAt {
        control: Arc::clone(&control),
        cancel_after: 5,
        total: 0,
        storage: storage.clone(),
    };

    let handle = evolver.start(watcher);
    let outcome = handle.join();

    assert!(matches!(outcome, Outcome::Cancelled), "{outcome}");
    assert!(control.is_cancelled());
    // cancellation is observed before the next step starts
    assert_eq!(control.steps_done(), 5);
    let frames = storage.frames();
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].step, 0);
}

#[test]
fn pause_holds_the_worker_until_resumed() {
    let evolver = hundred_step_evolver();
    let control = evolver.control();
    control.pause();

    let storage = KeyframeStorage::new();
    let handle = evolver.start(storage.clone());
    std::thread::sleep(Duration::from_millis(100));
    assert_eq!(handle.progress(), 0.0);
    assert!(storage.is_empty());
    assert!(!handle.is_finished());

    handle.resume();
    let outcome = handle.join();
    assert!(outcome.is_success(), "{outcome}");
    assert_eq!(control.steps_done(), 100);
    assert_eq!(control.progress(), 1.0);
    // frames due at round(f * 0.09 / 0.01) = 9 f
    let steps: Vec<u64> = storage.frames().iter().map(|f| f.step).collect();
    assert_eq!(steps, (0..12).map(|f| 9 * f).collect::<Vec<u64>>());
}

#[test]
fn cancel_while_paused_finishes_cancelled() {
    let evolver = hundred_step_evolver();
    evolver.control().pause();
    let handle = evolver.start(KeyframeStorage::new());
    handle.cancel();
    assert!(matches!(handle.join(), Outcome::Cancelled));
}

#[test]
fn failing_watcher_faults_the_run() {
    let evolver = hundred_step_evolver();
    let mut calls = 0;
    let mut failing = |keyframe: &Keyframe| {
        calls += 1;
        if keyframe.index == 2 {
            Err(SimulationError::InvalidArgument("disk full".into()))
        } else {
            Ok(())
        }
    };
    let outcome = evolver.run_blocking(&mut failing);
    match outcome {
        Outcome::Faulted(SimulationError::InvalidArgument(msg)) => assert_eq!(msg, "disk full"),
        other => panic!("expected a fault, got {other}"),
    }
    assert_eq!(calls, 3);
}

#[test]
fn panicking_potential_is_captured() {
    let spec = GridSpec::new(&[8, 8]).unwrap();
    let packet = GaussianPacket {
        center: [4.0, 4.0, 0.0],
        width: [1.0, 1.0, 1.0],
        momentum: [0.0; 3],
    };
    let initial = create_gaussian_wave_packet(&spec, 1.0, &packet, [0; 3]).unwrap();
    let config = EvolverConfig::new(spec, 1.0, 0.01, 0.1, 2).multithreaded(false);
    let broken = |p: [f64; 3], _: [f64; 3]| -> f64 {
        if p[0] > 5.0 {
            panic!("potential undefined at {p:?}");
        }
        0.0
    };
    let evolver = Evolver::single(config, 1.0, initial, Box::new(broken)).unwrap();
    let outcome = evolver.start(KeyframeStorage::new()).join();
    match outcome {
        Outcome::Faulted(SimulationError::Panicked(msg)) => {
            assert!(msg.contains("potential undefined"), "{msg}")
        }
        other => panic!("expected a captured panic, got {other}"),
    }
}
