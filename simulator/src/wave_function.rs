use num::complex::Complex64;

use crate::stencil;
use crate::utils::error::SimulationError;
use crate::utils::grid::{for_each_slice, sum_by, GridSpec};

/// Complex amplitudes over a [`GridSpec`] with a uniform lattice spacing.
#[derive(Clone, Debug, PartialEq)]
pub struct WaveFunction {
    spec: GridSpec,
    spacing: f64,
    amplitudes: Vec<Complex64>,
}

impl WaveFunction {
    pub fn new(
        spec: GridSpec,
        spacing: f64,
        amplitudes: Vec<Complex64>,
    ) -> Result<Self, SimulationError> {
        spec.check_len(amplitudes.len(), "wavefunction")?;
        if !(spacing > 0.0 && spacing.is_finite()) {
            return Err(SimulationError::invalid(format!(
                "lattice spacing must be positive, found {spacing}"
            )));
        }
        Ok(WaveFunction {
            spec,
            spacing,
            amplitudes,
        })
    }

    pub fn zeros(spec: GridSpec, spacing: f64) -> Result<Self, SimulationError> {
        Self::new(spec, spacing, vec![Complex64::new(0.0, 0.0); spec.len()])
    }

    pub fn spec(&self) -> &GridSpec {
        &self.spec
    }

    pub fn spacing(&self) -> f64 {
        self.spacing
    }

    pub fn amplitudes(&self) -> &[Complex64] {
        &self.amplitudes
    }

    pub fn amplitudes_mut(&mut self) -> &mut [Complex64] {
        &mut self.amplitudes
    }

    pub fn into_amplitudes(self) -> Vec<Complex64> {
        self.amplitudes
    }

    pub fn norm_sq(&self) -> f64 {
        sum_by(&self.amplitudes, false, |a| a.norm_sqr()) * self.spec.cell_volume(self.spacing)
    }

    pub fn scale_by(&mut self, factor: f64) {
        self.amplitudes.iter_mut().for_each(|a| *a *= factor);
    }

    pub fn normalize(&mut self) -> Result<(), SimulationError> {
        let norm = self.norm_sq().sqrt();
        if !(norm > 0.0 && norm.is_finite()) {
            return Err(SimulationError::invalid(format!(
                "cannot normalize a wavefunction with norm {norm}"
            )));
        }
        self.scale_by(norm.recip());
        Ok(())
    }

    pub fn probability_density(&self) -> Vec<f64> {
        self.amplitudes.iter().map(|a| a.norm_sqr()).collect()
    }

    /// Probability weighted mean position, in physical units.
    pub fn centroid(&self) -> [f64; 3] {
        let mut weighted = [0.0; 3];
        let mut total = 0.0;
        for (index, a) in self.amplitudes.iter().enumerate() {
            let p = a.norm_sqr();
            let coords = self.spec.coords(index);
            for (w, c) in weighted.iter_mut().zip(coords) {
                *w += p * c as f64 * self.spacing;
            }
            total += p;
        }
        weighted.map(|w| w / total)
    }

    /// Applies `H = -∇²/(2 mass) + V` with periodic edges.
    ///
    /// In 2D the kinetic term uses the nine point stencil with diagonal
    /// neighbours; in 3D the face-only radius 2 stencil.
    pub fn apply_h(
        &self,
        potential: &[f64],
        mass: f64,
        multithreaded: bool,
    ) -> Result<WaveFunction, SimulationError> {
        self.spec.check_len(potential.len(), "potential")?;
        let spec = self.spec;
        let kinetic_scale = (2.0 * mass * self.spacing * self.spacing).recip();
        let source = &self.amplitudes;
        let slice_len = spec.slice_len();

        let mut out = vec![Complex64::new(0.0, 0.0); spec.len()];
        for_each_slice(&spec, &mut out, multithreaded, |s, slice| {
            for (l, cell) in slice.iter_mut().enumerate() {
                let index = s * slice_len + l;
                let coords = spec.coords(index);
                let kinetic = stencil::periodic(source, &spec, index, coords) * kinetic_scale;
                *cell = kinetic + source[index] * potential[index];
            }
        });

        WaveFunction::new(spec, self.spacing, out)
    }

    pub fn is_finite(&self) -> bool {
        self.amplitudes
            .iter()
            .all(|a| a.re.is_finite() && a.im.is_finite())
    }
}

#[cfg(test)]
fn plane_wave(spec: GridSpec, k: [f64; 3]) -> WaveFunction {
    let amplitudes = (0..spec.len())
        .map(|i| {
            let [x, y, z] = spec.coords(i);
            let phase = k[0] * x as f64 + k[1] * y as f64 + k[2] * z as f64;
            Complex64::from_polar(1.0, phase)
        })
        .collect();
    WaveFunction::new(spec, 1.0, amplitudes).unwrap()
}

#[test]
fn test_normalize() {
    let spec = GridSpec::new(&[8, 8, 8]).unwrap();
    let mut wf = WaveFunction::new(spec, 0.125, vec![Complex64::new(1.0, 1.0); spec.len()]).unwrap();
    wf.normalize().unwrap();
    approx::assert_abs_diff_eq!(wf.norm_sq(), 1.0, epsilon = 1e-12);
    wf.scale_by(2.0);
    approx::assert_abs_diff_eq!(wf.norm_sq(), 4.0, epsilon = 1e-12);
}

#[test]
fn test_normalize_zero_is_an_error() {
    let spec = GridSpec::new(&[4, 4]).unwrap();
    let mut wf = WaveFunction::zeros(spec, 1.0).unwrap();
    assert!(matches!(
        wf.normalize(),
        Err(SimulationError::InvalidArgument(_))
    ));
}

#[test]
fn test_shape_mismatch_is_rejected() {
    let spec = GridSpec::new(&[4, 4]).unwrap();
    assert!(WaveFunction::new(spec, 1.0, vec![Complex64::new(0.0, 0.0); 15]).is_err());
    let wf = WaveFunction::zeros(spec, 1.0).unwrap();
    assert!(wf.apply_h(&[0.0; 3], 1.0, false).is_err());
}

#[test]
fn test_apply_h_plane_wave_eigenvalue_2d() {
    // A periodic plane wave is an eigenvector of the nine point stencil
    let spec = GridSpec::new(&[16, 16]).unwrap();
    let k = [2.0 * std::f64::consts::PI * 3.0 / 16.0, 2.0 * std::f64::consts::PI / 16.0, 0.0];
    let wf = plane_wave(spec, k);
    let (cx, cy) = (k[0].cos(), k[1].cos());
    let symbol = stencil::CENTER_WEIGHT
        + 2.0 * stencil::FACE_WEIGHT * (cx + cy)
        + 4.0 * stencil::DIAGONAL_WEIGHT * cx * cy;
    let v = 0.3;
    let h = wf.apply_h(&vec![v; spec.len()], 2.0, true).unwrap();
    let expected = symbol / 4.0 + v;
    for (out, input) in h.amplitudes().iter().zip(wf.amplitudes()) {
        approx::assert_abs_diff_eq!(out.re, expected * input.re, epsilon = 1e-12);
        approx::assert_abs_diff_eq!(out.im, expected * input.im, epsilon = 1e-12);
    }
}

#[test]
fn test_apply_h_plane_wave_eigenvalue_3d() {
    let spec = GridSpec::new(&[8, 8, 8]).unwrap();
    let step = 2.0 * std::f64::consts::PI / 8.0;
    let k = [step, 2.0 * step, 3.0 * step];
    let wf = plane_wave(spec, k);
    let symbol: f64 = k
        .iter()
        .map(|k| {
            stencil::RADIUS_TWO.center
                + 2.0 * stencil::RADIUS_TWO.near * k.cos()
                + 2.0 * stencil::RADIUS_TWO.far * (2.0 * k).cos()
        })
        .sum();
    let h = wf.apply_h(&vec![0.0; spec.len()], 1.0, false).unwrap();
    for (out, input) in h.amplitudes().iter().zip(wf.amplitudes()) {
        approx::assert_abs_diff_eq!(out.re, symbol / 2.0 * input.re, epsilon = 1e-12);
        approx::assert_abs_diff_eq!(out.im, symbol / 2.0 * input.im, epsilon = 1e-12);
    }
}
