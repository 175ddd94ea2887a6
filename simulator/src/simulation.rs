use log::info;
use std::path::{Path, PathBuf};

use wavesim_common::RunParameters;

use crate::damping::Damping;
use crate::evolver::{EvolverConfig, Evolver, EvolverHandle, Outcome};
use crate::ics::{create_gaussian_wave_packet, GaussianPacket};
use crate::potential::BuiltinPotential;
use crate::utils::error::SimulationError;
use crate::utils::grid::GridSpec;
use crate::watcher::{
    EvolutionWatcher, GridFileWriter, Keyframe, KeyframeContent, ManyWatchers, ProgressBarWatcher,
};

/// A run assembled from a parameter file.
pub struct Simulation {
    pub parameters: RunParameters,
    pub evolver: Evolver,
}

impl Simulation {
    pub fn new_from_params(parameters: RunParameters) -> Result<Self, SimulationError> {
        parameters.validate()?;

        let spec = GridSpec::new(&parameters.size)?;
        let mut config = EvolverConfig::new(
            spec,
            parameters.spacing,
            parameters.dt,
            parameters.total_time,
            parameters.frames,
        )
        .multithreaded(parameters.multithreaded);
        if let Some(damping) = parameters.damping {
            if damping.width > 0 && damping.factor > 0.0 {
                config = config.with_damping(Damping::new(
                    damping.width,
                    damping.factor,
                    parameters.dt,
                )?);
            }
        }

        let packets = parameters
            .packets
            .iter()
            .map(|p| GaussianPacket::from_parameters(p, spec.dims()))
            .collect::<Result<Vec<_>, _>>()?;
        let two_particle = parameters.is_two_particle();
        let potential = Box::new(BuiltinPotential::new(
            parameters.potential.clone(),
            two_particle,
        ));

        let evolver = match (parameters.masses.as_slice(), packets.as_slice()) {
            (&[m1, m2], &[p1, p2]) => Evolver::pair(config, [m1, m2], [p1, p2], potential)?,
            (&[mass], &[packet]) => {
                let initial =
                    create_gaussian_wave_packet(&spec, parameters.spacing, &packet, [0; 3])?;
                Evolver::single(config, mass, initial, potential)?
            }
            _ => {
                return Err(SimulationError::invalid(
                    "each particle needs one mass and one packet",
                ))
            }
        };

        Ok(Simulation {
            parameters,
            evolver,
        })
    }

    pub fn output_dir(&self) -> Option<PathBuf> {
        self.parameters
            .output_dir
            .as_ref()
            .map(|dir| Path::new(dir).join(&self.parameters.sim_name))
    }

    /// Writes the parameters next to the keyframes as toml.
    pub fn save_parameters(&self) -> Result<Option<PathBuf>, SimulationError> {
        let Some(dir) = self.output_dir() else {
            return Ok(None);
        };
        std::fs::create_dir_all(&dir)?;
        let value = toml::Value::try_from(&self.parameters)
            .map_err(|e| SimulationError::invalid(e.to_string()))?;
        let contents =
            toml::to_string(&value).map_err(|e| SimulationError::invalid(e.to_string()))?;
        let path = dir.join("parameters.toml");
        std::fs::write(&path, contents)?;
        Ok(Some(path))
    }

    /// Keyframe logging, grid files when an output directory is set and an
    /// optional progress bar.
    pub fn watchers(&self, progress: bool) -> Result<ManyWatchers, SimulationError> {
        let mut watchers = ManyWatchers::new();
        watchers.push(log_keyframe);
        if let Some(dir) = self.output_dir() {
            watchers.push(GridFileWriter::new(
                dir,
                &self.parameters.sim_name,
                self.parameters.output_npy,
            )?);
        }
        if progress {
            watchers.push(ProgressBarWatcher::new());
        }
        Ok(watchers)
    }

    pub fn run(&self, watcher: &mut dyn EvolutionWatcher) -> Outcome {
        self.evolver.run_blocking(watcher)
    }

    pub fn start<W: EvolutionWatcher + 'static>(self, watcher: W) -> EvolverHandle {
        self.evolver.start(watcher)
    }
}

fn log_keyframe(keyframe: &Keyframe) -> Result<(), SimulationError> {
    match &keyframe.content {
        KeyframeContent::WaveFunction(wf) => info!(
            "t = {:.4}: norm {:.6}, centroid {:?}",
            keyframe.time,
            wf.norm_sq(),
            &wf.centroid()[..wf.spec().dims().count()]
        ),
        KeyframeContent::Pair {
            particle1,
            particle2,
        } => info!(
            "t = {:.4}: marginal totals {:.6} / {:.6}",
            keyframe.time,
            particle1.total(),
            particle2.total()
        ),
    }
    Ok(())
}
