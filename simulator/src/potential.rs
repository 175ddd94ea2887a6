use wavesim_common::PotentialParameters;

use crate::utils::grid::{for_each_slice, GridSpec};

/// A static potential energy surface.
///
/// `position` is a physical coordinate (z is 0 in 2D). `domain` is the
/// physical extent of a single particle's box, so two-particle potentials,
/// which are sampled at relative coordinates, can still see the box size.
pub trait Potential: Send + Sync {
    fn value(&self, position: [f64; 3], domain: [f64; 3]) -> f64;
}

impl<F> Potential for F
where
    F: Fn([f64; 3], [f64; 3]) -> f64 + Send + Sync,
{
    fn value(&self, position: [f64; 3], domain: [f64; 3]) -> f64 {
        self(position, domain)
    }
}

/// Potentials selectable from a parameter file.
#[derive(Clone, Debug, PartialEq)]
pub struct BuiltinPotential {
    parameters: PotentialParameters,
    relative: bool,
}

impl BuiltinPotential {
    /// With `relative` set, an unspecified center is the origin of relative
    /// space instead of the middle of the box.
    pub fn new(parameters: PotentialParameters, relative: bool) -> Self {
        BuiltinPotential {
            parameters,
            relative,
        }
    }

    fn center(&self, center: &Option<Vec<f64>>, domain: [f64; 3]) -> [f64; 3] {
        match center {
            Some(c) => {
                let mut out = [0.0; 3];
                out.iter_mut().zip(c).for_each(|(o, c)| *o = *c);
                out
            }
            None if self.relative => [0.0; 3],
            None => domain.map(|d| d / 2.0),
        }
    }
}

fn distance_sq(a: [f64; 3], b: [f64; 3]) -> f64 {
    a.iter().zip(b).map(|(a, b)| (a - b).powi(2)).sum()
}

impl Potential for BuiltinPotential {
    fn value(&self, position: [f64; 3], domain: [f64; 3]) -> f64 {
        match &self.parameters {
            PotentialParameters::Free => 0.0,
            PotentialParameters::Harmonic { omega, center } => {
                let c = self.center(center, domain);
                0.5 * omega * omega * distance_sq(position, c)
            }
            PotentialParameters::Barrier {
                position: start,
                thickness,
                height,
            } => {
                if position[0] >= *start && position[0] < start + thickness {
                    *height
                } else {
                    0.0
                }
            }
            PotentialParameters::SoftCoulomb {
                charge,
                softening,
                center,
            } => {
                let c = self.center(center, domain);
                -charge / (distance_sq(position, c) + softening * softening).sqrt()
            }
        }
    }
}

/// Samples `potential` once per cell. Cell `i` along an axis sits at
/// `(i - origin) * spacing`.
pub fn sample_potential(
    potential: &dyn Potential,
    spec: &GridSpec,
    spacing: f64,
    origin: [usize; 3],
    domain: [f64; 3],
    multithreaded: bool,
) -> Vec<f64> {
    let slice_len = spec.slice_len();
    let mut grid = vec![0.0; spec.len()];
    for_each_slice(spec, &mut grid, multithreaded, |s, slice| {
        for (l, v) in slice.iter_mut().enumerate() {
            let coords = spec.coords(s * slice_len + l);
            let mut position = [0.0; 3];
            for axis in 0..3 {
                position[axis] = (coords[axis] as f64 - origin[axis] as f64) * spacing;
            }
            *v = potential.value(position, domain);
        }
    });
    grid
}

#[test]
fn test_closure_potential_sampling() {
    let spec = GridSpec::new(&[4, 3]).unwrap();
    let ramp = |p: [f64; 3], _domain: [f64; 3]| p[0] + 10.0 * p[1];
    let grid = sample_potential(&ramp, &spec, 0.5, [0; 3], [2.0, 1.5, 0.0], true);
    assert_eq!(grid[spec.index([3, 2, 0])], 1.5 + 10.0);
    let shifted = sample_potential(&ramp, &spec, 1.0, [1, 1, 0], [4.0, 3.0, 0.0], false);
    assert_eq!(shifted[spec.index([0, 0, 0])], -11.0);
}

#[test]
fn test_harmonic_centers_on_box_unless_relative() {
    let params = PotentialParameters::Harmonic {
        omega: 2.0,
        center: None,
    };
    let domain = [10.0, 10.0, 0.0];
    let absolute = BuiltinPotential::new(params.clone(), false);
    assert_eq!(absolute.value([5.0, 5.0, 0.0], domain), 0.0);
    assert_eq!(absolute.value([6.0, 5.0, 0.0], domain), 2.0);
    let relative = BuiltinPotential::new(params, true);
    assert_eq!(relative.value([0.0, 0.0, 0.0], domain), 0.0);
}

#[test]
fn test_barrier_and_soft_coulomb() {
    let barrier = BuiltinPotential::new(
        PotentialParameters::Barrier {
            position: 2.0,
            thickness: 1.0,
            height: 5.0,
        },
        false,
    );
    let domain = [8.0, 8.0, 0.0];
    assert_eq!(barrier.value([2.0, 7.0, 0.0], domain), 5.0);
    assert_eq!(barrier.value([3.0, 7.0, 0.0], domain), 0.0);

    let coulomb = BuiltinPotential::new(
        PotentialParameters::SoftCoulomb {
            charge: 2.0,
            softening: 1.0,
            center: Some(vec![1.0, 1.0]),
        },
        false,
    );
    assert_eq!(coulomb.value([1.0, 1.0, 0.0], domain), -2.0);
}
