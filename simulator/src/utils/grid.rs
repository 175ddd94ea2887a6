use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use super::error::SimulationError;

#[derive(Copy, Clone, Debug, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Dimensions {
    Two = 2,
    Three = 3,
}

impl Dimensions {
    pub fn count(self) -> usize {
        self as usize
    }
}

/// Extent of every grid in a run.
///
/// Cells are stored in one flat buffer with x varying fastest:
/// `index = x + nx * (y + ny * z)`. Two dimensional grids carry `nz = 1`.
#[derive(Copy, Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct GridSpec {
    sizes: [usize; 3],
    dims: Dimensions,
}

impl GridSpec {
    pub fn new(sizes: &[usize]) -> Result<Self, SimulationError> {
        if sizes.iter().any(|&n| n == 0) {
            return Err(SimulationError::invalid(format!(
                "grid sizes must be at least 1, found {sizes:?}"
            )));
        }
        match *sizes {
            [nx, ny] => Ok(GridSpec {
                sizes: [nx, ny, 1],
                dims: Dimensions::Two,
            }),
            [nx, ny, nz] => Ok(GridSpec {
                sizes: [nx, ny, nz],
                dims: Dimensions::Three,
            }),
            _ => Err(SimulationError::invalid(format!(
                "grids have 2 or 3 axes, found {}",
                sizes.len()
            ))),
        }
    }

    pub fn dims(&self) -> Dimensions {
        self.dims
    }

    /// Sizes of all three axes; the unused z axis of a 2D grid has size 1.
    pub fn sizes(&self) -> [usize; 3] {
        self.sizes
    }

    /// Sizes of the active axes only.
    pub fn shape(&self) -> &[usize] {
        &self.sizes[..self.dims.count()]
    }

    pub fn len(&self) -> usize {
        self.sizes.iter().product()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn strides(&self) -> [usize; 3] {
        [1, self.sizes[0], self.sizes[0] * self.sizes[1]]
    }

    #[inline]
    pub fn index(&self, [x, y, z]: [usize; 3]) -> usize {
        x + self.sizes[0] * (y + self.sizes[1] * z)
    }

    #[inline]
    pub fn coords(&self, index: usize) -> [usize; 3] {
        let [nx, ny, _] = self.sizes;
        [index % nx, (index / nx) % ny, index / (nx * ny)]
    }

    /// Number of cells in one outer slice: a row in 2D, a plane in 3D.
    /// Parallel work is partitioned along these slices.
    pub fn slice_len(&self) -> usize {
        match self.dims {
            Dimensions::Two => self.sizes[0],
            Dimensions::Three => self.sizes[0] * self.sizes[1],
        }
    }

    pub fn slice_count(&self) -> usize {
        self.len() / self.slice_len()
    }

    /// Grid of relative coordinates `r1 - r2`: `2n - 1` cells per active axis.
    pub fn relative(&self) -> GridSpec {
        let mut sizes = self.sizes;
        for n in sizes.iter_mut().take(self.dims.count()) {
            *n = 2 * *n - 1;
        }
        GridSpec {
            sizes,
            dims: self.dims,
        }
    }

    /// Volume element `spacing^d`.
    pub fn cell_volume(&self, spacing: f64) -> f64 {
        spacing.powi(self.dims.count() as i32)
    }

    pub fn check_len(&self, len: usize, what: &str) -> Result<(), SimulationError> {
        (len == self.len()).then_some(()).ok_or_else(|| {
            SimulationError::invalid(format!(
                "{what} has {len} cells but the grid {:?} has {}",
                self.shape(),
                self.len()
            ))
        })
    }
}

/// Runs `f(slice_index, slice)` over every outer slice of `buffer`,
/// on the rayon pool when `multithreaded` is set.
pub fn for_each_slice<T, F>(spec: &GridSpec, buffer: &mut [T], multithreaded: bool, f: F)
where
    T: Send,
    F: Fn(usize, &mut [T]) + Send + Sync,
{
    let chunk = spec.slice_len();
    if multithreaded {
        buffer
            .par_chunks_mut(chunk)
            .enumerate()
            .for_each(|(s, slice)| f(s, slice));
    } else {
        buffer
            .chunks_mut(chunk)
            .enumerate()
            .for_each(|(s, slice)| f(s, slice));
    }
}

/// Sums `f(value)` over the buffer, in parallel when `multithreaded` is set.
pub fn sum_by<T, F>(buffer: &[T], multithreaded: bool, f: F) -> f64
where
    T: Sync,
    F: Fn(&T) -> f64 + Send + Sync,
{
    if multithreaded {
        buffer.par_iter().map(f).sum()
    } else {
        buffer.iter().map(f).sum()
    }
}

pub fn check_for_nans(values: &[f64]) -> bool {
    values.iter().all(|v| v.is_finite())
}

#[test]
fn test_index_round_trip_3d() {
    let spec = GridSpec::new(&[4, 3, 5]).unwrap();
    for index in 0..spec.len() {
        assert_eq!(spec.index(spec.coords(index)), index);
    }
    assert_eq!(spec.coords(4), [0, 1, 0]);
    assert_eq!(spec.coords(12), [0, 0, 1]);
    assert_eq!(spec.slice_len(), 12);
    assert_eq!(spec.slice_count(), 5);
}

#[test]
fn test_relative_grid() {
    let spec = GridSpec::new(&[16, 8]).unwrap();
    let relative = spec.relative();
    assert_eq!(relative.shape(), &[31, 15]);
    assert_eq!(relative.sizes()[2], 1);
    assert_eq!(relative.dims(), Dimensions::Two);
}

#[test]
fn test_rejects_bad_extents() {
    assert!(GridSpec::new(&[4]).is_err());
    assert!(GridSpec::new(&[4, 0]).is_err());
    assert!(GridSpec::new(&[2, 2, 2, 2]).is_err());
}

#[test]
fn test_for_each_slice_serial_matches_parallel() {
    let spec = GridSpec::new(&[5, 4, 3]).unwrap();
    let mut serial = vec![0usize; spec.len()];
    let mut parallel = vec![0usize; spec.len()];
    let fill = |s: usize, slice: &mut [usize]| {
        for (l, v) in slice.iter_mut().enumerate() {
            *v = s * 1000 + l;
        }
    };
    for_each_slice(&spec, &mut serial, false, fill);
    for_each_slice(&spec, &mut parallel, true, fill);
    assert_eq!(serial, parallel);
}
