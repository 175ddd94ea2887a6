use std::f64::consts::FRAC_PI_2;

use crate::utils::error::SimulationError;
use crate::utils::grid::{for_each_slice, GridSpec};

/// Absorbing border applied after every step.
///
/// Layer `i` (0 is the outermost) is multiplied by
/// `1 - factor * dt * (1 - sin(π/2 · i / width))`. Each active axis is a
/// separate pass over the grids, so a cell inside the border of two axes
/// receives the product of both factors.
#[derive(Clone, Debug, PartialEq)]
pub struct Damping {
    width: usize,
    factors: Vec<f64>,
}

impl Damping {
    pub fn new(width: usize, factor: f64, dt: f64) -> Result<Self, SimulationError> {
        if !(factor >= 0.0 && factor.is_finite()) {
            return Err(SimulationError::invalid(format!(
                "damping factor must be non-negative, found {factor}"
            )));
        }
        if factor * dt > 1.0 {
            return Err(SimulationError::invalid(format!(
                "damping factor {factor} with dt {dt} would flip the sign of the border"
            )));
        }
        let factors = (0..width)
            .map(|i| 1.0 - factor * dt * (1.0 - (FRAC_PI_2 * i as f64 / width as f64).sin()))
            .collect();
        Ok(Damping { width, factors })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    /// Attenuation of each layer, outermost first.
    pub fn factors(&self) -> &[f64] {
        &self.factors
    }

    pub fn check_fits(&self, spec: &GridSpec) -> Result<(), SimulationError> {
        let smallest = spec.shape().iter().copied().min().unwrap_or(0);
        (2 * self.width <= smallest).then_some(()).ok_or_else(|| {
            SimulationError::invalid(format!(
                "{} damping layers do not fit in grid {:?}",
                self.width,
                spec.shape()
            ))
        })
    }

    /// Runs the X, Y and (in 3D) Z passes over every grid in turn.
    pub fn apply<const N: usize>(
        &self,
        spec: &GridSpec,
        mut grids: [&mut [f64]; N],
        multithreaded: bool,
    ) {
        if self.width == 0 {
            return;
        }
        for axis in 0..spec.dims().count() {
            for grid in grids.iter_mut() {
                self.apply_axis(spec, grid, axis, multithreaded);
            }
        }
    }

    fn apply_axis(&self, spec: &GridSpec, grid: &mut [f64], axis: usize, multithreaded: bool) {
        let size = spec.sizes()[axis];
        let slice_len = spec.slice_len();
        for_each_slice(spec, grid, multithreaded, |s, slice| {
            for (l, value) in slice.iter_mut().enumerate() {
                let position = spec.coords(s * slice_len + l)[axis];
                let layer = position.min(size - 1 - position);
                if let Some(f) = self.factors.get(layer) {
                    *value *= f;
                }
            }
        });
    }
}

#[test]
fn test_layer_factors() {
    let damping = Damping::new(4, 2.0, 0.1).unwrap();
    let factors = damping.factors();
    assert_eq!(factors.len(), 4);
    approx::assert_abs_diff_eq!(factors[0], 0.8, epsilon = 1e-15);
    for i in 1..4 {
        assert!(factors[i] > factors[i - 1]);
        assert!(factors[i] < 1.0);
    }
}

#[test]
fn test_corners_compound() {
    let spec = GridSpec::new(&[8, 8]).unwrap();
    let damping = Damping::new(2, 1.0, 0.5).unwrap();
    let f = damping.factors().to_vec();
    let mut grid = vec![1.0; spec.len()];
    damping.apply(&spec, [&mut grid[..]], false);

    assert_eq!(grid[spec.index([0, 0, 0])], f[0] * f[0]);
    assert_eq!(grid[spec.index([7, 1, 0])], f[0] * f[1]);
    assert_eq!(grid[spec.index([1, 4, 0])], f[1]);
    assert_eq!(grid[spec.index([4, 6, 0])], f[1]);
    assert_eq!(grid[spec.index([4, 4, 0])], 1.0);
}

#[test]
fn test_rejects_sign_flip() {
    assert!(Damping::new(3, 20.0, 0.1).is_err());
    assert!(Damping::new(3, -1.0, 0.1).is_err());
}
