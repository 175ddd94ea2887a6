use log::trace;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::ics::PairDecomposition;
use crate::utils::error::SimulationError;
use crate::utils::grid::{for_each_slice, GridSpec};

/// Single-particle probability density of a two-particle run.
#[derive(Clone, Debug, PartialEq)]
pub struct ProbabilityDensity {
    spec: GridSpec,
    spacing: f64,
    values: Vec<f64>,
}

impl ProbabilityDensity {
    pub fn new(spec: GridSpec, spacing: f64, values: Vec<f64>) -> Result<Self, SimulationError> {
        spec.check_len(values.len(), "probability density")?;
        Ok(ProbabilityDensity {
            spec,
            spacing,
            values,
        })
    }

    pub fn spec(&self) -> &GridSpec {
        &self.spec
    }

    pub fn spacing(&self) -> f64 {
        self.spacing
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Σ P · spacing^d
    pub fn total(&self) -> f64 {
        self.values.iter().sum::<f64>() * self.spec.cell_volume(self.spacing)
    }

    pub fn centroid(&self) -> [f64; 3] {
        let mut weighted = [0.0; 3];
        let mut total = 0.0;
        for (index, p) in self.values.iter().enumerate() {
            let coords = self.spec.coords(index);
            for (w, c) in weighted.iter_mut().zip(coords) {
                *w += p * c as f64 * self.spacing;
            }
            total += p;
        }
        weighted.map(|w| w / total)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Particle {
    First,
    Second,
}

/// `table[o * n + s]` is the center of mass density at `f1 x1 + f2 x2`,
/// where `o` indexes the kept particle and `s` the summed one.
fn weight_table(
    pair: &PairDecomposition,
    axis: usize,
    n: usize,
    spacing: f64,
    time: f64,
    particle: Particle,
) -> Vec<f64> {
    let [f1, f2] = pair.fractions;
    let mut table = Vec::with_capacity(n * n);
    for o in 0..n {
        for s in 0..n {
            let (i1, i2) = match particle {
                Particle::First => (o, s),
                Particle::Second => (s, o),
            };
            let position = (f1 * i1 as f64 + f2 * i2 as f64) * spacing;
            table.push(pair.center_of_mass.density_1d(axis, position, time));
        }
    }
    table
}

/// Integrates out one particle:
/// `P1(x1) = spacing^d Σ_x2 ρ_rel(x1 - x2) · G(f1 x1 + f2 x2; t)`
/// (and symmetrically for `P2`).
///
/// `relative_density` lives on `spec.relative()`. The cancel flag is polled
/// once per output slice; if it is raised the result is `None`.
#[allow(clippy::too_many_arguments)]
pub fn marginalize(
    relative_density: &[f64],
    spec: &GridSpec,
    spacing: f64,
    pair: &PairDecomposition,
    time: f64,
    particle: Particle,
    multithreaded: bool,
    cancel: &AtomicBool,
) -> Result<Option<ProbabilityDensity>, SimulationError> {
    let relative = spec.relative();
    relative.check_len(relative_density.len(), "relative density")?;

    let axes = spec.dims().count();
    let [nx, ny, nz] = spec.sizes();
    let [rnx, rny, _] = relative.sizes();
    let tables: Vec<Vec<f64>> = (0..3)
        .map(|axis| {
            if axis < axes {
                weight_table(pair, axis, spec.sizes()[axis], spacing, time, particle)
            } else {
                vec![1.0]
            }
        })
        .collect();
    let (tx, ty, tz) = (&tables[0], &tables[1], &tables[2]);

    // Offset of x1 - x2 in the relative grid along an axis of n cells
    let shift = |o: usize, s: usize, n: usize| match particle {
        Particle::First => o + n - 1 - s,
        Particle::Second => s + n - 1 - o,
    };

    let volume = spec.cell_volume(spacing);
    let slice_len = spec.slice_len();
    let mut values = vec![0.0; spec.len()];
    for_each_slice(spec, &mut values, multithreaded, |slice_index, slice| {
        if cancel.load(Ordering::Relaxed) {
            return;
        }
        for (l, out) in slice.iter_mut().enumerate() {
            let [ox, oy, oz] = spec.coords(slice_index * slice_len + l);
            let mut total = 0.0;
            for sz in 0..nz {
                let wz = tz[oz * nz + sz];
                let jz = shift(oz, sz, nz);
                for sy in 0..ny {
                    let wyz = wz * ty[oy * ny + sy];
                    if wyz == 0.0 {
                        continue;
                    }
                    let row = rnx * (shift(oy, sy, ny) + rny * jz);
                    for sx in 0..nx {
                        let w = wyz * tx[ox * nx + sx];
                        total += w * relative_density[row + shift(ox, sx, nx)];
                    }
                }
            }
            *out = total * volume;
        }
    });

    if cancel.load(Ordering::Relaxed) {
        trace!("marginalization of {particle:?} abandoned");
        return Ok(None);
    }
    ProbabilityDensity::new(*spec, spacing, values).map(Some)
}

#[cfg(test)]
fn point_pair(n: usize) -> (GridSpec, PairDecomposition) {
    use crate::ics::{split_pair, GaussianPacket};
    use crate::utils::grid::Dimensions;
    let spec = GridSpec::new(&[n, n]).unwrap();
    let packet = |c: f64| GaussianPacket {
        center: [c, c, 0.0],
        width: [1.5, 1.5, 1.0],
        momentum: [0.0; 3],
    };
    let pair = split_pair([1.0, 1.0], &packet(6.0), &packet(9.0), Dimensions::Two).unwrap();
    (spec, pair)
}

#[test]
fn test_delta_relative_density_shifts_center_of_mass() {
    // ρ_rel concentrated at r = 0 makes both marginals the center of mass density
    let (spec, pair) = point_pair(16);
    let relative = spec.relative();
    let mut rho = vec![0.0; relative.len()];
    rho[relative.index([15, 15, 0])] = 1.0;
    let cancel = AtomicBool::new(false);
    let p1 = marginalize(&rho, &spec, 1.0, &pair, 0.0, Particle::First, true, &cancel)
        .unwrap()
        .unwrap();
    let p2 = marginalize(&rho, &spec, 1.0, &pair, 0.0, Particle::Second, false, &cancel)
        .unwrap()
        .unwrap();
    assert_eq!(p1.values(), p2.values());
    let com = pair.center_of_mass;
    let expected = com.density_1d(0, 7.0, 0.0) * com.density_1d(1, 4.0, 0.0);
    approx::assert_relative_eq!(p1.values()[spec.index([7, 4, 0])], expected, max_relative = 1e-12);
}

#[test]
fn test_cancelled_marginal_is_empty() {
    let (spec, pair) = point_pair(8);
    let rho = vec![0.0; spec.relative().len()];
    let cancel = AtomicBool::new(true);
    let result = marginalize(&rho, &spec, 1.0, &pair, 0.0, Particle::First, true, &cancel);
    assert!(matches!(result, Ok(None)));
}

#[test]
fn test_wrong_relative_grid_is_rejected() {
    let (spec, pair) = point_pair(8);
    let rho = vec![0.0; spec.len()];
    let cancel = AtomicBool::new(false);
    assert!(marginalize(&rho, &spec, 1.0, &pair, 0.0, Particle::First, true, &cancel).is_err());
}
