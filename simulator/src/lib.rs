pub mod damping;
pub mod evolver;
pub mod ics;
pub mod marginal;
pub mod potential;
pub mod simulation;
pub mod stencil;
pub mod utils;
pub mod visscher;
pub mod watcher;
pub mod wave_function;

pub use evolver::{Evolver, EvolverConfig, EvolverHandle, Outcome, RunControl};
pub use utils::error::SimulationError;
pub use utils::grid::{Dimensions, GridSpec};
pub use visscher::VisscherWf;
pub use wave_function::WaveFunction;
