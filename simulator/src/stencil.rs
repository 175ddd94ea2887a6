//! Finite difference forms of `-∇²`.
//!
//! Two unrelated families live here. The periodic forms are used only when
//! applying the full Hamiltonian to a complex wavefunction (the leapfrog
//! initializer); the hard wall form is the per-step operator of the
//! leapfrog itself. They are different shapes and are kept apart.

use num::Zero;
use std::ops::{Add, Mul};

use crate::utils::grid::{Dimensions, GridSpec};

/// Values a stencil can be applied to: `f64` and `Complex<f64>`.
pub trait FieldValue:
    Copy + Zero + Add<Output = Self> + Mul<f64, Output = Self> + Send + Sync
{
}

impl<T> FieldValue for T where
    T: Copy + Zero + Add<Output = T> + Mul<f64, Output = T> + Send + Sync
{
}

/// One dimensional radius 2 weights, per axis.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct AxisWeights {
    pub center: f64,
    pub near: f64,
    pub far: f64,
}

/// Fourth order `-d²/dx²`: `(5/2, -4/3, 1/12)`.
pub const RADIUS_TWO: AxisWeights = AxisWeights {
    center: 5.0 / 2.0,
    near: -4.0 / 3.0,
    far: 1.0 / 12.0,
};

/// Isotropic nine point `-∇²` in 2D.
pub const DIAGONAL_WEIGHT: f64 = -1.0 / 6.0;
pub const FACE_WEIGHT: f64 = -2.0 / 3.0;
pub const CENTER_WEIGHT: f64 = -4.0 * (DIAGONAL_WEIGHT + FACE_WEIGHT);

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Boundary {
    /// Indices wrap around the grid
    Periodic,
    /// Neighbours outside the grid are zero
    HardWall,
}

#[inline]
fn neighbour<T: FieldValue>(
    field: &[T],
    index: usize,
    position: usize,
    size: usize,
    stride: usize,
    offset: isize,
    boundary: Boundary,
) -> T {
    let target = position as isize + offset;
    let n = size as isize;
    let wrapped = match boundary {
        Boundary::HardWall if target < 0 || target >= n => return T::zero(),
        Boundary::HardWall => target,
        Boundary::Periodic => target.rem_euclid(n),
    };
    let delta = (wrapped - position as isize) * stride as isize;
    field[(index as isize + delta) as usize]
}

/// `(ψ[-1] + ψ[+1], ψ[-2] + ψ[+2])` along `axis`.
#[inline]
fn axis_sums<T: FieldValue>(
    field: &[T],
    spec: &GridSpec,
    index: usize,
    coords: [usize; 3],
    axis: usize,
    boundary: Boundary,
) -> (T, T) {
    let size = spec.sizes()[axis];
    let stride = spec.strides()[axis];
    let at = |offset| neighbour(field, index, coords[axis], size, stride, offset, boundary);
    (at(-1) + at(1), at(-2) + at(2))
}

/// Axis-separable radius 2 form, summed over the active axes, without any
/// diagonal coupling. Result is `-∇²ψ · spacing²`.
#[inline]
pub fn separable<T: FieldValue>(
    field: &[T],
    spec: &GridSpec,
    index: usize,
    coords: [usize; 3],
    boundary: Boundary,
) -> T {
    let axes = spec.dims().count();
    let mut total = field[index] * (RADIUS_TWO.center * axes as f64);
    for axis in 0..axes {
        let (near, far) = axis_sums(field, spec, index, coords, axis, boundary);
        total = total + near * RADIUS_TWO.near + far * RADIUS_TWO.far;
    }
    total
}

/// Nine point form mixing the four diagonal neighbours, periodic.
/// Result is `-∇²ψ · spacing²`.
#[inline]
pub fn nine_point<T: FieldValue>(
    field: &[T],
    spec: &GridSpec,
    index: usize,
    coords: [usize; 3],
) -> T {
    let [nx, ny, _] = spec.sizes();
    let [x, y, z] = coords;
    let at = |dx: isize, dy: isize| {
        let xx = (x as isize + dx).rem_euclid(nx as isize) as usize;
        let yy = (y as isize + dy).rem_euclid(ny as isize) as usize;
        field[spec.index([xx, yy, z])]
    };
    let faces = at(-1, 0) + at(1, 0) + at(0, -1) + at(0, 1);
    let diagonals = at(-1, -1) + at(1, -1) + at(-1, 1) + at(1, 1);
    field[index] * CENTER_WEIGHT + faces * FACE_WEIGHT + diagonals * DIAGONAL_WEIGHT
}

/// Periodic `-∇²ψ · spacing²` used by the Hamiltonian: the nine point
/// form in 2D and the face-only radius 2 form in 3D.
#[inline]
pub fn periodic<T: FieldValue>(field: &[T], spec: &GridSpec, index: usize, coords: [usize; 3]) -> T {
    match spec.dims() {
        Dimensions::Two => nine_point(field, spec, index, coords),
        Dimensions::Three => separable(field, spec, index, coords, Boundary::Periodic),
    }
}

/// Hard wall `-∇²ψ · spacing²` used by every leapfrog step.
#[inline]
pub fn hard_wall(field: &[f64], spec: &GridSpec, index: usize, coords: [usize; 3]) -> f64 {
    separable(field, spec, index, coords, Boundary::HardWall)
}

#[cfg(test)]
fn quadratic(spec: &GridSpec) -> Vec<f64> {
    (0..spec.len())
        .map(|i| {
            let [x, y, z] = spec.coords(i);
            (x * x + y * y + z * z) as f64
        })
        .collect()
}

#[test]
fn test_weights_annihilate_constants() {
    approx::assert_abs_diff_eq!(
        RADIUS_TWO.center + 2.0 * RADIUS_TWO.near + 2.0 * RADIUS_TWO.far,
        0.0,
        epsilon = 1e-15
    );
    approx::assert_abs_diff_eq!(CENTER_WEIGHT, 10.0 / 3.0, epsilon = 1e-15);
    approx::assert_abs_diff_eq!(
        CENTER_WEIGHT + 4.0 * FACE_WEIGHT + 4.0 * DIAGONAL_WEIGHT,
        0.0,
        epsilon = 1e-14
    );
}

#[test]
fn test_interior_laplacian_of_quadratic() {
    // -∇²(x² + y² + z²) = -2d exactly for both forms, away from the edges
    let spec2 = GridSpec::new(&[9, 9]).unwrap();
    let field2 = quadratic(&spec2);
    let i = spec2.index([4, 4, 0]);
    approx::assert_abs_diff_eq!(nine_point(&field2, &spec2, i, [4, 4, 0]), -4.0, epsilon = 1e-12);
    approx::assert_abs_diff_eq!(hard_wall(&field2, &spec2, i, [4, 4, 0]), -4.0, epsilon = 1e-12);

    let spec3 = GridSpec::new(&[9, 9, 9]).unwrap();
    let field3 = quadratic(&spec3);
    let i = spec3.index([4, 4, 4]);
    approx::assert_abs_diff_eq!(periodic(&field3, &spec3, i, [4, 4, 4]), -6.0, epsilon = 1e-12);
}

#[test]
fn test_hard_wall_drops_outside_neighbours() {
    let spec = GridSpec::new(&[5, 5]).unwrap();
    let field = vec![1.0; spec.len()];
    // corner: along each axis only +1 and +2 exist
    let corner = hard_wall(&field, &spec, 0, [0, 0, 0]);
    let per_axis = RADIUS_TWO.center + RADIUS_TWO.near + RADIUS_TWO.far;
    approx::assert_abs_diff_eq!(corner, 2.0 * per_axis, epsilon = 1e-14);
    // periodic sees a constant field and gives zero everywhere
    approx::assert_abs_diff_eq!(periodic(&field, &spec, 0, [0, 0, 0]), 0.0, epsilon = 1e-14);
}
