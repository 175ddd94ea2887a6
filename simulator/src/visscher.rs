use log::{debug, trace};
use num::complex::Complex64;

use crate::damping::Damping;
use crate::stencil;
use crate::utils::error::SimulationError;
use crate::utils::grid::{for_each_slice, sum_by, GridSpec};
use crate::wave_function::WaveFunction;

/// Staggered-time leapfrog state of Visscher's scheme.
///
/// `real` holds Re ψ at the integer step t, `imag_minus` and `imag_plus`
/// hold Im ψ at t - dt/2 and t + dt/2. The two imaginary buffers trade
/// roles every step by swapping ownership, never by copying.
#[derive(Clone, Debug)]
pub struct VisscherWf {
    spec: GridSpec,
    spacing: f64,
    mass: f64,
    dt: f64,
    real: Vec<f64>,
    imag_minus: Vec<f64>,
    imag_plus: Vec<f64>,
    steps: u64,
}

impl VisscherWf {
    /// Builds the staggered state from ψ0 by expanding exp(∓iH dt/2) to
    /// second order with the periodic Hamiltonian.
    pub fn new(
        initial: &WaveFunction,
        potential: &[f64],
        mass: f64,
        dt: f64,
        multithreaded: bool,
    ) -> Result<Self, SimulationError> {
        if !(dt > 0.0 && dt.is_finite()) {
            return Err(SimulationError::invalid(format!(
                "time step must be positive, found {dt}"
            )));
        }
        if !(mass > 0.0 && mass.is_finite()) {
            return Err(SimulationError::invalid(format!(
                "mass must be positive, found {mass}"
            )));
        }
        let h_psi = initial.apply_h(potential, mass, multithreaded)?;
        let h2_psi = h_psi.apply_h(potential, mass, multithreaded)?;

        let half = dt / 2.0;
        let second = dt * dt / 8.0;
        let psi = initial.amplitudes();
        let real = psi.iter().map(|a| a.re).collect();
        let (imag_plus, imag_minus) = psi
            .iter()
            .zip(h_psi.amplitudes())
            .zip(h2_psi.amplitudes())
            .map(|((a, h), h2)| {
                let common = a.im - second * h2.im;
                (common - half * h.re, common + half * h.re)
            })
            .unzip();

        debug!(
            "Initialized leapfrog state on {:?} (dt = {dt}, mass = {mass})",
            initial.spec().shape()
        );

        Ok(VisscherWf {
            spec: *initial.spec(),
            spacing: initial.spacing(),
            mass,
            dt,
            real,
            imag_minus,
            imag_plus,
            steps: 0,
        })
    }

    pub fn spec(&self) -> &GridSpec {
        &self.spec
    }

    pub fn spacing(&self) -> f64 {
        self.spacing
    }

    pub fn dt(&self) -> f64 {
        self.dt
    }

    pub fn steps(&self) -> u64 {
        self.steps
    }

    pub fn time(&self) -> f64 {
        self.steps as f64 * self.dt
    }

    pub fn real(&self) -> &[f64] {
        &self.real
    }

    pub fn imag_minus(&self) -> &[f64] {
        &self.imag_minus
    }

    pub fn imag_plus(&self) -> &[f64] {
        &self.imag_plus
    }

    /// Advances one full time step with the hard wall stencil.
    ///
    /// The real update reads only the old `imag_plus`; the imaginary update
    /// reads the real grid that was just written.
    pub fn step(&mut self, potential: &[f64], multithreaded: bool) {
        let spec = self.spec;
        let dt = self.dt;
        let scale = (2.0 * self.mass * self.spacing * self.spacing).recip();
        let slice_len = spec.slice_len();

        let Self {
            real,
            imag_minus,
            imag_plus,
            ..
        } = self;

        {
            let imag: &[f64] = &imag_plus[..];
            for_each_slice(&spec, real, multithreaded, |s, slice| {
                for (l, r) in slice.iter_mut().enumerate() {
                    let index = s * slice_len + l;
                    let coords = spec.coords(index);
                    let h = scale * stencil::hard_wall(imag, &spec, index, coords)
                        + potential[index] * imag[index];
                    *r += dt * h;
                }
            });
        }

        std::mem::swap(imag_minus, imag_plus);

        {
            let real: &[f64] = &real[..];
            let minus: &[f64] = &imag_minus[..];
            for_each_slice(&spec, imag_plus, multithreaded, |s, slice| {
                for (l, i) in slice.iter_mut().enumerate() {
                    let index = s * slice_len + l;
                    let coords = spec.coords(index);
                    let h = scale * stencil::hard_wall(real, &spec, index, coords)
                        + potential[index] * real[index];
                    *i = minus[index] - dt * h;
                }
            });
        }

        self.steps += 1;
        trace!("leapfrog step {}", self.steps);
    }

    /// Multiplies all three grids by the absorbing border profile.
    pub fn damp(&mut self, damping: &Damping, multithreaded: bool) {
        damping.apply(
            &self.spec,
            [&mut self.real[..], &mut self.imag_minus[..], &mut self.imag_plus[..]],
            multithreaded,
        );
    }

    /// Σ(Re² + Im₋·Im₊)·spacing^d, exactly conserved by the undamped
    /// recursion for a real potential.
    pub fn conserved_norm(&self, multithreaded: bool) -> f64 {
        let real = sum_by(&self.real, multithreaded, |r| r * r);
        let cross: f64 = self
            .imag_minus
            .iter()
            .zip(&self.imag_plus)
            .map(|(m, p)| m * p)
            .sum();
        (real + cross) * self.spec.cell_volume(self.spacing)
    }

    /// Snapshot at the integer step. Im ψ is the geometric mean of the two
    /// staggered values carrying the sign of `imag_minus`, or zero when they
    /// disagree in sign.
    pub fn to_wave_function(&self) -> Result<WaveFunction, SimulationError> {
        let amplitudes = self
            .real
            .iter()
            .zip(&self.imag_minus)
            .zip(&self.imag_plus)
            .map(|((&re, &minus), &plus)| {
                let product = minus * plus;
                let im = if product > 0.0 {
                    minus.signum() * product.sqrt()
                } else {
                    0.0
                };
                Complex64::new(re, im)
            })
            .collect();
        WaveFunction::new(self.spec, self.spacing, amplitudes)
    }

    /// |ψ|² at the integer step, consistent with [`Self::to_wave_function`].
    pub fn probability_density(&self) -> Vec<f64> {
        self.real
            .iter()
            .zip(&self.imag_minus)
            .zip(&self.imag_plus)
            .map(|((re, minus), plus)| re * re + (minus * plus).max(0.0))
            .collect()
    }
}

#[cfg(test)]
fn bump(spec: GridSpec) -> WaveFunction {
    let [nx, ny, nz] = spec.sizes();
    let amplitudes = (0..spec.len())
        .map(|i| {
            let [x, y, z] = spec.coords(i);
            let r2 = (x as f64 - nx as f64 / 2.0).powi(2)
                + (y as f64 - ny as f64 / 2.0).powi(2)
                + if nz > 1 {
                    (z as f64 - nz as f64 / 2.0).powi(2)
                } else {
                    0.0
                };
            Complex64::from_polar((-r2 / 8.0).exp(), 0.7 * x as f64)
        })
        .collect();
    let mut wf = WaveFunction::new(spec, 1.0, amplitudes).unwrap();
    wf.normalize().unwrap();
    wf
}

#[test]
fn test_initial_real_part_is_copied() {
    let spec = GridSpec::new(&[12, 12]).unwrap();
    let wf = bump(spec);
    let v = vec![0.0; spec.len()];
    let leapfrog = VisscherWf::new(&wf, &v, 1.0, 0.01, false).unwrap();
    for (r, a) in leapfrog.real().iter().zip(wf.amplitudes()) {
        assert_eq!(*r, a.re);
    }
    assert_eq!(leapfrog.steps(), 0);
}

#[test]
fn test_snapshot_zero_when_signs_disagree() {
    let spec = GridSpec::new(&[2, 2]).unwrap();
    let mut leapfrog = VisscherWf {
        spec,
        spacing: 1.0,
        mass: 1.0,
        dt: 0.1,
        real: vec![1.0, 0.5, 0.0, 0.0],
        imag_minus: vec![-4.0, 1.0, 2.0, 0.0],
        imag_plus: vec![-1.0, -1.0, 8.0, 3.0],
        steps: 0,
    };
    let wf = leapfrog.to_wave_function().unwrap();
    let im: Vec<f64> = wf.amplitudes().iter().map(|a| a.im).collect();
    assert_eq!(im, vec![-2.0, 0.0, 4.0, 0.0]);
    leapfrog.real[0] = 0.0;
    assert_eq!(leapfrog.probability_density(), vec![4.0, 0.25, 16.0, 0.0]);
}

#[test]
fn test_step_is_identical_serial_and_parallel() {
    let spec = GridSpec::new(&[10, 9, 8]).unwrap();
    let wf = bump(spec);
    let v: Vec<f64> = (0..spec.len()).map(|i| 0.01 * (i % 7) as f64).collect();
    let mut serial = VisscherWf::new(&wf, &v, 1.5, 0.02, false).unwrap();
    let mut parallel = VisscherWf::new(&wf, &v, 1.5, 0.02, true).unwrap();
    for _ in 0..5 {
        serial.step(&v, false);
        parallel.step(&v, true);
    }
    assert_eq!(serial.real(), parallel.real());
    assert_eq!(serial.imag_plus(), parallel.imag_plus());
    assert_eq!(serial.imag_minus(), parallel.imag_minus());
    approx::assert_abs_diff_eq!(serial.time(), 0.1, epsilon = 1e-15);
}
