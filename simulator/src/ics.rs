use log::{debug, warn};
use num::complex::Complex64;
use std::f64::consts::PI;

use wavesim_common::WavePacket;

use crate::utils::error::SimulationError;
use crate::utils::grid::{Dimensions, GridSpec};
use crate::wave_function::WaveFunction;

/// Gaussian wavepacket `exp(-(x - center)² / (2 width²) + i momentum x)`
/// per active axis. Unused components of a 2D packet are ignored.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct GaussianPacket {
    pub center: [f64; 3],
    pub width: [f64; 3],
    pub momentum: [f64; 3],
}

fn to_array(values: &[f64], dims: usize, name: &str) -> Result<[f64; 3], SimulationError> {
    if values.len() != dims {
        return Err(SimulationError::invalid(format!(
            "packet {name} has {} components on a {dims}D grid",
            values.len()
        )));
    }
    let mut out = [0.0; 3];
    out[..dims].copy_from_slice(values);
    Ok(out)
}

impl GaussianPacket {
    pub fn from_parameters(packet: &WavePacket, dims: Dimensions) -> Result<Self, SimulationError> {
        let d = dims.count();
        let width = to_array(&packet.width, d, "width")?;
        if width[..d].iter().any(|w| !(*w > 0.0)) {
            return Err(SimulationError::invalid(format!(
                "packet widths must be positive, found {:?}",
                packet.width
            )));
        }
        Ok(GaussianPacket {
            center: to_array(&packet.center, d, "center")?,
            width,
            momentum: to_array(&packet.momentum, d, "momentum")?,
        })
    }
}

/// Builds a normalized gaussian wavepacket. Cell `i` along an axis sits at
/// `(i - origin) * spacing`.
pub fn create_gaussian_wave_packet(
    spec: &GridSpec,
    spacing: f64,
    packet: &GaussianPacket,
    origin: [usize; 3],
) -> Result<WaveFunction, SimulationError> {
    let axes = spec.dims().count();
    if packet.width[..axes].iter().any(|w| !(*w > 0.0)) {
        return Err(SimulationError::invalid(format!(
            "packet widths must be positive, found {:?}",
            &packet.width[..axes]
        )));
    }

    // Separable, so build one complex factor per axis and multiply
    let factors: Vec<Vec<Complex64>> = (0..3)
        .map(|axis| {
            let n = spec.sizes()[axis];
            if axis >= axes {
                return vec![Complex64::new(1.0, 0.0); n];
            }
            (0..n)
                .map(|i| {
                    let x = (i as f64 - origin[axis] as f64) * spacing;
                    let offset = x - packet.center[axis];
                    let envelope = (-offset * offset / (2.0 * packet.width[axis].powi(2))).exp();
                    Complex64::from_polar(envelope, packet.momentum[axis] * x)
                })
                .collect()
        })
        .collect();

    let amplitudes = (0..spec.len())
        .map(|index| {
            let [x, y, z] = spec.coords(index);
            factors[0][x] * factors[1][y] * factors[2][z]
        })
        .collect();

    let mut wf = WaveFunction::new(*spec, spacing, amplitudes)?;
    wf.normalize()?;
    debug_assert!((wf.norm_sq() - 1.0).abs() < 1e-4);
    Ok(wf)
}

/// Closed-form free motion of the center of mass of a two-particle packet.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct CenterOfMass {
    pub dims: Dimensions,
    pub total_mass: f64,
    pub center: [f64; 3],
    pub width: [f64; 3],
    pub velocity: [f64; 3],
}

impl CenterOfMass {
    /// Squared spread `s²` of the density `exp(-(X - X(t))²/s²)`:
    /// `(width⁴ + (t/M)²) / width²`.
    pub fn spread_sq(&self, axis: usize, time: f64) -> f64 {
        let w2 = self.width[axis] * self.width[axis];
        let t = time / self.total_mass;
        (w2 * w2 + t * t) / w2
    }

    pub fn center_at(&self, axis: usize, time: f64) -> f64 {
        self.center[axis] + self.velocity[axis] * time
    }

    /// Normalized one dimensional density of the center of mass.
    pub fn density_1d(&self, axis: usize, position: f64, time: f64) -> f64 {
        let s2 = self.spread_sq(axis, time);
        let offset = position - self.center_at(axis, time);
        (-offset * offset / s2).exp() / (PI * s2).sqrt()
    }
}

/// A two-particle product state rewritten in relative and center of mass
/// coordinates.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct PairDecomposition {
    pub masses: [f64; 2],
    pub reduced_mass: f64,
    /// `m1 / M` and `m2 / M`
    pub fractions: [f64; 2],
    pub relative: GaussianPacket,
    pub center_of_mass: CenterOfMass,
}

/// Splits `ψ1(x1) ψ2(x2)` into a relative packet and a center of mass
/// packet. This is exact when `m1 σ1² = m2 σ2²` on every axis; otherwise
/// the neglected cross term is reported and the split is approximate.
pub fn split_pair(
    masses: [f64; 2],
    first: &GaussianPacket,
    second: &GaussianPacket,
    dims: Dimensions,
) -> Result<PairDecomposition, SimulationError> {
    let [m1, m2] = masses;
    if !(m1 > 0.0 && m2 > 0.0) {
        return Err(SimulationError::invalid(format!(
            "masses must be positive, found {masses:?}"
        )));
    }
    let total_mass = m1 + m2;
    let (f1, f2) = (m1 / total_mass, m2 / total_mass);

    let mut relative = GaussianPacket {
        center: [0.0; 3],
        width: [1.0; 3],
        momentum: [0.0; 3],
    };
    let mut center_of_mass = CenterOfMass {
        dims,
        total_mass,
        center: [0.0; 3],
        width: [1.0; 3],
        velocity: [0.0; 3],
    };

    for axis in 0..dims.count() {
        let s1 = first.width[axis].powi(2);
        let s2 = second.width[axis].powi(2);

        let mismatch = m1 * s1 - m2 * s2;
        if mismatch.abs() > 1e-9 * (m1 * s1).max(m2 * s2) {
            warn!(
                "Axis {axis}: m1 σ1² = {} differs from m2 σ2² = {}, relative and center of mass parts are not independent",
                m1 * s1,
                m2 * s2
            );
        }

        relative.center[axis] = first.center[axis] - second.center[axis];
        relative.width[axis] = (f2 * f2 / s1 + f1 * f1 / s2).recip().sqrt();
        relative.momentum[axis] = f2 * first.momentum[axis] - f1 * second.momentum[axis];

        center_of_mass.center[axis] = f1 * first.center[axis] + f2 * second.center[axis];
        center_of_mass.width[axis] = (s1.recip() + s2.recip()).recip().sqrt();
        center_of_mass.velocity[axis] =
            (first.momentum[axis] + second.momentum[axis]) / total_mass;
    }

    debug!("Relative packet {relative:?}, center of mass {center_of_mass:?}");

    Ok(PairDecomposition {
        masses,
        reduced_mass: m1 * m2 / total_mass,
        fractions: [f1, f2],
        relative,
        center_of_mass,
    })
}

#[test]
fn test_gaussian_is_normalized() {
    let spec = GridSpec::new(&[20, 14, 9]).unwrap();
    let packet = GaussianPacket {
        center: [3.0, 2.0, 1.5],
        width: [0.7, 1.1, 0.9],
        momentum: [4.0, -1.0, 0.5],
    };
    let wf = create_gaussian_wave_packet(&spec, 0.25, &packet, [0; 3]).unwrap();
    approx::assert_abs_diff_eq!(wf.norm_sq(), 1.0, epsilon = 1e-4);
}

#[test]
fn test_gaussian_phase_follows_momentum() {
    let spec = GridSpec::new(&[16, 16]).unwrap();
    let packet = GaussianPacket {
        center: [8.0, 8.0, 0.0],
        width: [2.0, 2.0, 1.0],
        momentum: [0.5, 0.0, 0.0],
    };
    let wf = create_gaussian_wave_packet(&spec, 1.0, &packet, [0; 3]).unwrap();
    let a = wf.amplitudes()[spec.index([8, 8, 0])];
    let b = wf.amplitudes()[spec.index([9, 8, 0])];
    approx::assert_abs_diff_eq!((b / a).arg(), 0.5, epsilon = 1e-12);
    let centroid = wf.centroid();
    approx::assert_abs_diff_eq!(centroid[0], 8.0, epsilon = 1e-6);
    approx::assert_abs_diff_eq!(centroid[1], 8.0, epsilon = 1e-6);
}

#[test]
fn test_split_pair_equal_masses() {
    let first = GaussianPacket {
        center: [4.0, 6.0, 0.0],
        width: [1.0, 2.0, 1.0],
        momentum: [1.0, 0.0, 0.0],
    };
    let second = GaussianPacket {
        center: [10.0, 6.0, 0.0],
        width: [1.0, 2.0, 1.0],
        momentum: [-1.0, 0.5, 0.0],
    };
    let pair = split_pair([2.0, 2.0], &first, &second, Dimensions::Two).unwrap();
    assert_eq!(pair.reduced_mass, 1.0);
    assert_eq!(pair.relative.center[..2], [-6.0, 0.0]);
    assert_eq!(pair.relative.momentum[..2], [1.0, -0.25]);
    approx::assert_abs_diff_eq!(pair.relative.width[0], 2.0_f64.sqrt(), epsilon = 1e-12);
    approx::assert_abs_diff_eq!(pair.center_of_mass.width[1], 2.0_f64.sqrt(), epsilon = 1e-12);
    assert_eq!(pair.center_of_mass.center[..2], [7.0, 6.0]);
    assert_eq!(pair.center_of_mass.velocity[..2], [0.0, 0.125]);
}

#[test]
fn test_center_of_mass_density_is_normalized_and_spreads() {
    let com = CenterOfMass {
        dims: Dimensions::Two,
        total_mass: 2.0,
        center: [5.0, 5.0, 0.0],
        width: [1.0, 1.0, 1.0],
        velocity: [1.0, 0.0, 0.0],
    };
    let integral: f64 = (0..4000)
        .map(|i| com.density_1d(0, -10.0 + i as f64 * 0.01, 3.0) * 0.01)
        .sum();
    approx::assert_abs_diff_eq!(integral, 1.0, epsilon = 1e-6);
    assert!(com.spread_sq(0, 3.0) > com.spread_sq(0, 0.0));
    approx::assert_abs_diff_eq!(com.spread_sq(0, 0.0), 1.0, epsilon = 1e-15);
    approx::assert_abs_diff_eq!(com.center_at(0, 3.0), 8.0, epsilon = 1e-15);
}
