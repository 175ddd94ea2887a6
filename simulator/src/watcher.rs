use indicatif::{ProgressBar, ProgressStyle};
use log::info;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use crate::evolver::Outcome;
use crate::marginal::ProbabilityDensity;
use crate::utils::error::SimulationError;
use crate::utils::io::{density_to_npy, GridFile};
use crate::wave_function::WaveFunction;

#[derive(Clone, Debug, PartialEq)]
pub enum KeyframeContent {
    /// Snapshot of a single particle run
    WaveFunction(WaveFunction),
    /// Both marginals of a two-particle run
    Pair {
        particle1: ProbabilityDensity,
        particle2: ProbabilityDensity,
    },
}

/// A snapshot saved at a scheduled time.
#[derive(Clone, Debug, PartialEq)]
pub struct Keyframe {
    /// Position in the requested frame sequence
    pub index: u32,
    /// Step at which the frame was taken
    pub step: u64,
    pub time: f64,
    pub content: KeyframeContent,
}

/// Receives everything an evolution reports. Callbacks run on the worker,
/// strictly between complete steps.
pub trait EvolutionWatcher: Send {
    fn before(&mut self, _total_steps: u64) {}

    fn on_keyframe(&mut self, keyframe: &Keyframe) -> Result<(), SimulationError>;

    fn on_progress(&mut self, _fraction: f64) {}

    fn after(&mut self, _outcome: &Outcome) {}
}

impl<F> EvolutionWatcher for F
where
    F: FnMut(&Keyframe) -> Result<(), SimulationError> + Send,
{
    fn on_keyframe(&mut self, keyframe: &Keyframe) -> Result<(), SimulationError> {
        self(keyframe)
    }
}

/// Forwards every callback to each watcher in order. A failing keyframe
/// callback stops the fan-out.
#[derive(Default)]
pub struct ManyWatchers {
    watchers: Vec<Box<dyn EvolutionWatcher>>,
}

impl ManyWatchers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push<W: EvolutionWatcher + 'static>(&mut self, watcher: W) {
        self.watchers.push(Box::new(watcher));
    }

    pub fn len(&self) -> usize {
        self.watchers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.watchers.is_empty()
    }
}

impl EvolutionWatcher for ManyWatchers {
    fn before(&mut self, total_steps: u64) {
        self.watchers.iter_mut().for_each(|w| w.before(total_steps))
    }

    fn on_keyframe(&mut self, keyframe: &Keyframe) -> Result<(), SimulationError> {
        self.watchers
            .iter_mut()
            .try_for_each(|w| w.on_keyframe(keyframe))
    }

    fn on_progress(&mut self, fraction: f64) {
        self.watchers
            .iter_mut()
            .for_each(|w| w.on_progress(fraction))
    }

    fn after(&mut self, outcome: &Outcome) {
        self.watchers.iter_mut().for_each(|w| w.after(outcome))
    }
}

/// Keeps keyframes in memory. Clones share the same storage, so one clone
/// can be handed to a background run and the other read afterwards.
#[derive(Clone, Default)]
pub struct KeyframeStorage {
    frames: Arc<Mutex<Vec<Keyframe>>>,
}

impl KeyframeStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn frames(&self) -> Vec<Keyframe> {
        self.frames
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn len(&self) -> usize {
        self.frames
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl EvolutionWatcher for KeyframeStorage {
    fn on_keyframe(&mut self, keyframe: &Keyframe) -> Result<(), SimulationError> {
        self.frames
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(keyframe.clone());
        Ok(())
    }
}

/// Writes each keyframe as `<dir>/<name>_<index>.wsg`, plus `.npy`
/// densities when requested.
pub struct GridFileWriter {
    dir: PathBuf,
    name: String,
    npy: bool,
}

impl GridFileWriter {
    pub fn new<P: Into<PathBuf>>(dir: P, name: &str, npy: bool) -> Result<Self, SimulationError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(GridFileWriter {
            dir,
            name: name.to_string(),
            npy,
        })
    }

    pub fn frame_path(&self, index: u32, suffix: &str) -> PathBuf {
        self.dir
            .join(format!("{}_{index:05}{suffix}", self.name))
    }
}

impl EvolutionWatcher for GridFileWriter {
    fn on_keyframe(&mut self, keyframe: &Keyframe) -> Result<(), SimulationError> {
        let index = keyframe.index;
        match &keyframe.content {
            KeyframeContent::WaveFunction(wf) => {
                GridFile::from_wave_function(wf, "psi").write_path(self.frame_path(index, ".wsg"))?;
                if self.npy {
                    density_to_npy(
                        self.frame_path(index, "_density.npy"),
                        wf.spec(),
                        &wf.probability_density(),
                    )?;
                }
            }
            KeyframeContent::Pair {
                particle1,
                particle2,
            } => {
                GridFile::from_densities(&[("particle1", particle1), ("particle2", particle2)])?
                    .write_path(self.frame_path(index, ".wsg"))?;
                if self.npy {
                    density_to_npy(
                        self.frame_path(index, "_particle1.npy"),
                        particle1.spec(),
                        particle1.values(),
                    )?;
                    density_to_npy(
                        self.frame_path(index, "_particle2.npy"),
                        particle2.spec(),
                        particle2.values(),
                    )?;
                }
            }
        }
        info!(
            "Saved keyframe {index} (step {}, t = {:.4})",
            keyframe.step, keyframe.time
        );
        Ok(())
    }
}

/// Terminal progress bar.
pub struct ProgressBarWatcher {
    bar: ProgressBar,
    total_steps: u64,
}

impl ProgressBarWatcher {
    pub fn new() -> Self {
        ProgressBarWatcher {
            bar: ProgressBar::hidden(),
            total_steps: 0,
        }
    }
}

impl Default for ProgressBarWatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl EvolutionWatcher for ProgressBarWatcher {
    fn before(&mut self, total_steps: u64) {
        let bar = ProgressBar::new(total_steps);
        if let Ok(style) = ProgressStyle::with_template(
            "{spinner} [{elapsed_precise}] {bar:40} {pos}/{len} steps ({eta})",
        ) {
            bar.set_style(style);
        }
        self.bar = bar;
        self.total_steps = total_steps;
    }

    fn on_keyframe(&mut self, keyframe: &Keyframe) -> Result<(), SimulationError> {
        self.bar.set_message(format!("frame {}", keyframe.index));
        Ok(())
    }

    fn on_progress(&mut self, fraction: f64) {
        self.bar
            .set_position((fraction * self.total_steps as f64).round() as u64);
    }

    fn after(&mut self, outcome: &Outcome) {
        self.bar.finish_with_message(format!("{outcome}"));
    }
}
