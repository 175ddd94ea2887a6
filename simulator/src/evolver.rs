use log::{debug, info, trace, warn};
use std::fmt::Display;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;
use std::time::Instant;

use crate::damping::Damping;
use crate::ics::{create_gaussian_wave_packet, split_pair, GaussianPacket, PairDecomposition};
use crate::marginal::{marginalize, Particle};
use crate::potential::{sample_potential, Potential};
use crate::utils::error::SimulationError;
use crate::utils::grid::{check_for_nans, GridSpec};
use crate::visscher::VisscherWf;
use crate::watcher::{EvolutionWatcher, Keyframe, KeyframeContent};
use crate::wave_function::WaveFunction;

/// How a run ended.
#[derive(Debug)]
pub enum Outcome {
    Succeeded,
    Cancelled,
    Faulted(SimulationError),
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Succeeded)
    }
}

impl Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Outcome::Succeeded => write!(f, "succeeded"),
            Outcome::Cancelled => write!(f, "cancelled"),
            Outcome::Faulted(e) => write!(f, "faulted: {e}"),
        }
    }
}

/// Shared between a running evolution and whoever drives it.
///
/// Pause and cancel are cooperative: the worker looks at them between
/// steps and between marginalization slices.
#[derive(Debug, Default)]
pub struct RunControl {
    cancel: AtomicBool,
    paused: Mutex<bool>,
    resumed: Condvar,
    steps_done: AtomicU64,
    total_steps: AtomicU64,
}

impl RunControl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pause(&self) {
        *self.paused.lock().unwrap_or_else(|p| p.into_inner()) = true;
    }

    pub fn resume(&self) {
        *self.paused.lock().unwrap_or_else(|p| p.into_inner()) = false;
        self.resumed.notify_all();
    }

    /// Also wakes a paused worker so it can observe the request.
    pub fn cancel(&self) {
        let _paused = self.paused.lock().unwrap_or_else(|p| p.into_inner());
        self.cancel.store(true, Ordering::SeqCst);
        self.resumed.notify_all();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }

    pub fn is_paused(&self) -> bool {
        *self.paused.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub fn steps_done(&self) -> u64 {
        self.steps_done.load(Ordering::SeqCst)
    }

    /// Fraction of steps completed, in `[0, 1]`.
    pub fn progress(&self) -> f64 {
        let total = self.total_steps.load(Ordering::SeqCst);
        if total == 0 {
            return 0.0;
        }
        self.steps_done() as f64 / total as f64
    }

    pub(crate) fn cancel_flag(&self) -> &AtomicBool {
        &self.cancel
    }

    /// Blocks while paused. Returns true when the run should stop.
    fn checkpoint(&self) -> bool {
        let mut paused = self.paused.lock().unwrap_or_else(|p| p.into_inner());
        while *paused && !self.is_cancelled() {
            paused = self
                .resumed
                .wait(paused)
                .unwrap_or_else(|p| p.into_inner());
        }
        self.is_cancelled()
    }
}

/// Uniformly spaced keyframe times mapped onto step indices.
///
/// Frame `f` is due at step `round(f * interval / dt)`. At most one frame is
/// taken per step; frames whose step has already passed are dropped and
/// never revisited.
#[derive(Clone, Debug, PartialEq)]
pub struct FrameSchedule {
    frames: u32,
    interval: f64,
    dt: f64,
    next: u32,
}

impl FrameSchedule {
    pub fn new(total_time: f64, dt: f64, frames: u32) -> Self {
        let interval = if frames > 1 {
            total_time / (frames - 1) as f64
        } else {
            total_time
        };
        FrameSchedule {
            frames,
            interval,
            dt,
            next: 0,
        }
    }

    pub fn interval(&self) -> f64 {
        self.interval
    }

    fn due_step(&self, frame: u32) -> u64 {
        (frame as f64 * self.interval / self.dt).round() as u64
    }

    /// Returns the frame to save at `step`, if any.
    pub fn due(&mut self, step: u64) -> Option<u32> {
        if self.next >= self.frames || self.due_step(self.next) > step {
            return None;
        }
        let frame = self.next;
        self.next += 1;
        while self.next < self.frames && self.due_step(self.next) <= step {
            warn!(
                "Keyframe {} falls on step {step} with keyframe {frame} and is skipped",
                self.next
            );
            self.next += 1;
        }
        Some(frame)
    }
}

/// `round(total_time / dt) + 1`
pub fn total_steps(total_time: f64, dt: f64) -> u64 {
    (total_time / dt).round() as u64 + 1
}

/// Run settings shared by single and two-particle evolutions.
#[derive(Clone, Debug)]
pub struct EvolverConfig {
    /// Single-particle grid; two-particle runs evolve on `spec.relative()`
    pub spec: GridSpec,
    pub spacing: f64,
    pub dt: f64,
    pub total_time: f64,
    pub frames: u32,
    pub damping: Option<Damping>,
    pub multithreaded: bool,
    /// Steps between progress reports; `None` picks about a thousand reports per run
    pub progress_every: Option<u64>,
}

impl EvolverConfig {
    pub fn new(spec: GridSpec, spacing: f64, dt: f64, total_time: f64, frames: u32) -> Self {
        EvolverConfig {
            spec,
            spacing,
            dt,
            total_time,
            frames,
            damping: None,
            multithreaded: true,
            progress_every: None,
        }
    }

    pub fn with_damping(mut self, damping: Damping) -> Self {
        self.damping = Some(damping);
        self
    }

    pub fn multithreaded(mut self, multithreaded: bool) -> Self {
        self.multithreaded = multithreaded;
        self
    }

    pub fn progress_every(mut self, steps: u64) -> Self {
        self.progress_every = Some(steps.max(1));
        self
    }

    fn validate(&self) -> Result<(), SimulationError> {
        for (name, value) in [
            ("spacing", self.spacing),
            ("dt", self.dt),
            ("total_time", self.total_time),
        ] {
            if !(value > 0.0 && value.is_finite()) {
                return Err(SimulationError::invalid(format!(
                    "{name} must be positive, found {value}"
                )));
            }
        }
        Ok(())
    }

    /// Physical extent of the single-particle box.
    pub fn domain(&self) -> [f64; 3] {
        let mut domain = [0.0; 3];
        for (d, n) in domain.iter_mut().zip(self.spec.shape()) {
            *d = *n as f64 * self.spacing;
        }
        domain
    }
}

enum System {
    Single {
        mass: f64,
        initial: WaveFunction,
    },
    Pair {
        decomposition: PairDecomposition,
        relative: WaveFunction,
    },
}

/// Owns one run: potential, leapfrog state and the step loop.
pub struct Evolver {
    config: EvolverConfig,
    system: System,
    potential: Box<dyn Potential>,
    control: Arc<RunControl>,
}

impl Evolver {
    /// Single particle evolution from an arbitrary initial state.
    pub fn single(
        config: EvolverConfig,
        mass: f64,
        initial: WaveFunction,
        potential: Box<dyn Potential>,
    ) -> Result<Self, SimulationError> {
        config.validate()?;
        if initial.spec() != &config.spec {
            return Err(SimulationError::invalid(format!(
                "initial state is on {:?}, the run is on {:?}",
                initial.spec().shape(),
                config.spec.shape()
            )));
        }
        if let Some(damping) = &config.damping {
            damping.check_fits(&config.spec)?;
        }
        Ok(Evolver {
            config,
            system: System::Single { mass, initial },
            potential,
            control: Arc::new(RunControl::new()),
        })
    }

    /// Two particles starting as a product of gaussian packets. Only the
    /// relative coordinate is evolved; `potential` is sampled at relative
    /// positions.
    pub fn pair(
        config: EvolverConfig,
        masses: [f64; 2],
        packets: [GaussianPacket; 2],
        potential: Box<dyn Potential>,
    ) -> Result<Self, SimulationError> {
        config.validate()?;
        let decomposition = split_pair(masses, &packets[0], &packets[1], config.spec.dims())?;
        let relative_spec = config.spec.relative();
        if let Some(damping) = &config.damping {
            damping.check_fits(&relative_spec)?;
        }
        let relative = create_gaussian_wave_packet(
            &relative_spec,
            config.spacing,
            &decomposition.relative,
            relative_origin(&config.spec),
        )?;
        Ok(Evolver {
            config,
            system: System::Pair {
                decomposition,
                relative,
            },
            potential,
            control: Arc::new(RunControl::new()),
        })
    }

    pub fn config(&self) -> &EvolverConfig {
        &self.config
    }

    pub fn control(&self) -> Arc<RunControl> {
        Arc::clone(&self.control)
    }

    pub fn total_steps(&self) -> u64 {
        total_steps(self.config.total_time, self.config.dt)
    }

    /// Runs to completion on the calling thread. `watcher.after` is called
    /// with the outcome before it is returned.
    pub fn run_blocking(&self, watcher: &mut dyn EvolutionWatcher) -> Outcome {
        let outcome = match catch_unwind(AssertUnwindSafe(|| self.run(watcher))) {
            Ok(Ok(true)) => Outcome::Succeeded,
            Ok(Ok(false)) => Outcome::Cancelled,
            Ok(Err(e)) => Outcome::Faulted(e),
            Err(payload) => Outcome::Faulted(SimulationError::Panicked(panic_message(payload))),
        };
        match &outcome {
            Outcome::Faulted(e) => warn!("Evolution faulted: {e}"),
            other => info!("Evolution {other}"),
        }
        watcher.after(&outcome);
        outcome
    }

    /// Moves the run onto a background thread.
    pub fn start<W: EvolutionWatcher + 'static>(self, mut watcher: W) -> EvolverHandle {
        let control = self.control();
        let handle = std::thread::spawn(move || self.run_blocking(&mut watcher));
        EvolverHandle {
            control,
            handle: Some(handle),
        }
    }

    /// Returns `Ok(false)` when cancelled.
    fn run(&self, watcher: &mut dyn EvolutionWatcher) -> Result<bool, SimulationError> {
        let config = &self.config;
        let mt = config.multithreaded;
        let timer = Instant::now();

        let (wf, mass, origin) = match &self.system {
            System::Single { mass, initial } => (initial, *mass, [0; 3]),
            System::Pair {
                decomposition,
                relative,
            } => (
                relative,
                decomposition.reduced_mass,
                relative_origin(&config.spec),
            ),
        };
        let potential = sample_potential(
            self.potential.as_ref(),
            wf.spec(),
            config.spacing,
            origin,
            config.domain(),
            mt,
        );
        let mut state = VisscherWf::new(wf, &potential, mass, config.dt, mt)?;

        let total = self.total_steps();
        let report_every = config
            .progress_every
            .unwrap_or_else(|| (total / 1000).max(1));
        let mut schedule = FrameSchedule::new(config.total_time, config.dt, config.frames);
        self.control.total_steps.store(total, Ordering::SeqCst);
        self.control.steps_done.store(0, Ordering::SeqCst);

        info!(
            "Evolving {:?} for {total} steps ({} keyframes every {:.4})",
            wf.spec().shape(),
            config.frames,
            schedule.interval()
        );
        watcher.before(total);

        for step in 0..total {
            if self.control.checkpoint() {
                debug!("Cancelled before step {step}");
                return Ok(false);
            }

            if let Some(index) = schedule.due(step) {
                let Some(content) = self.keyframe_content(&state)? else {
                    debug!("Cancelled while building keyframe {index}");
                    return Ok(false);
                };
                watcher.on_keyframe(&Keyframe {
                    index,
                    step,
                    time: state.time(),
                    content,
                })?;
            }

            state.step(&potential, mt);
            if let Some(damping) = &config.damping {
                state.damp(damping, mt);
            }

            let done = step + 1;
            self.control.steps_done.store(done, Ordering::SeqCst);
            if done % report_every == 0 || done == total {
                watcher.on_progress(done as f64 / total as f64);
            }
        }

        info!(
            "Finished {total} steps in {:.2} seconds",
            timer.elapsed().as_secs_f64()
        );
        Ok(true)
    }

    /// `None` when cancellation interrupted the marginals.
    fn keyframe_content(&self, state: &VisscherWf) -> Result<Option<KeyframeContent>, SimulationError> {
        let step = state.steps();
        match &self.system {
            System::Single { .. } => {
                let wf = state.to_wave_function()?;
                if !wf.is_finite() {
                    return Err(SimulationError::NanOrInf { step });
                }
                Ok(Some(KeyframeContent::WaveFunction(wf)))
            }
            System::Pair { decomposition, .. } => {
                let density = state.probability_density();
                if !check_for_nans(&density) {
                    return Err(SimulationError::NanOrInf { step });
                }
                let cancel = self.control.cancel_flag();
                let marginal = |particle| {
                    marginalize(
                        &density,
                        &self.config.spec,
                        self.config.spacing,
                        decomposition,
                        state.time(),
                        particle,
                        self.config.multithreaded,
                        cancel,
                    )
                };
                let Some(particle1) = marginal(Particle::First)? else {
                    return Ok(None);
                };
                let Some(particle2) = marginal(Particle::Second)? else {
                    return Ok(None);
                };
                trace!(
                    "Marginal totals {:.6} and {:.6}",
                    particle1.total(),
                    particle2.total()
                );
                Ok(Some(KeyframeContent::Pair {
                    particle1,
                    particle2,
                }))
            }
        }
    }
}

/// Index of `r = 0` in the relative grid of `spec`.
fn relative_origin(spec: &GridSpec) -> [usize; 3] {
    spec.sizes().map(|n| n - 1)
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Background run started with [`Evolver::start`].
pub struct EvolverHandle {
    control: Arc<RunControl>,
    handle: Option<JoinHandle<Outcome>>,
}

impl EvolverHandle {
    pub fn control(&self) -> Arc<RunControl> {
        Arc::clone(&self.control)
    }

    pub fn pause(&self) {
        self.control.pause()
    }

    pub fn resume(&self) {
        self.control.resume()
    }

    pub fn cancel(&self) {
        self.control.cancel()
    }

    pub fn progress(&self) -> f64 {
        self.control.progress()
    }

    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// Waits for the completion notification.
    pub fn join(mut self) -> Outcome {
        match self.handle.take().map(JoinHandle::join) {
            Some(Ok(outcome)) => outcome,
            Some(Err(payload)) => Outcome::Faulted(SimulationError::Panicked(panic_message(payload))),
            None => Outcome::Faulted(SimulationError::Panicked("run was already joined".into())),
        }
    }
}

#[test]
fn test_total_steps() {
    assert_eq!(total_steps(1.0, 0.01), 101);
    assert_eq!(total_steps(0.99, 0.01), 100);
    assert_eq!(total_steps(0.004, 0.01), 1);
}

#[test]
fn test_schedule_uniform_frames() {
    let mut schedule = FrameSchedule::new(1.0, 0.01, 5);
    let due: Vec<(u64, u32)> = (0..101)
        .filter_map(|step| schedule.due(step).map(|f| (step, f)))
        .collect();
    assert_eq!(due, vec![(0, 0), (25, 1), (50, 2), (75, 3), (100, 4)]);
}

#[test]
fn test_schedule_skips_colliding_frames() {
    // 11 frames over 4 steps: several frames round onto the same step
    let mut schedule = FrameSchedule::new(0.04, 0.01, 11);
    let due: Vec<(u64, u32)> = (0..5)
        .filter_map(|step| schedule.due(step).map(|f| (step, f)))
        .collect();
    // frame f is due at round(0.4 f); the first frame on each step wins
    assert_eq!(due, vec![(0, 0), (1, 2), (2, 4), (3, 7), (4, 9)]);
}

#[test]
fn test_schedule_single_frame() {
    let mut schedule = FrameSchedule::new(2.0, 0.5, 1);
    assert_eq!(schedule.due(0), Some(0));
    assert_eq!((1..5).find_map(|s| schedule.due(s)), None);
}

#[test]
fn test_pause_blocks_until_resume() {
    let control = Arc::new(RunControl::new());
    control.pause();
    let worker = {
        let control = Arc::clone(&control);
        std::thread::spawn(move || control.checkpoint())
    };
    std::thread::sleep(std::time::Duration::from_millis(50));
    assert!(!worker.is_finished());
    control.resume();
    assert!(!worker.join().unwrap());
}

#[test]
fn test_cancel_wakes_paused_worker() {
    let control = Arc::new(RunControl::new());
    control.pause();
    let worker = {
        let control = Arc::clone(&control);
        std::thread::spawn(move || control.checkpoint())
    };
    control.cancel();
    assert!(worker.join().unwrap());
}
