//! Volume of interest (VOI) and its voxel grid.
//!
//! The VOI is an axis-aligned box split into cubic voxels. Voxel centers and
//! edges are computed once at construction; the grid is immutable afterwards
//! and shared read-only by the reconstruction stage.
#![allow(
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss,
    clippy::cast_sign_loss
)]

use crate::error::{Error, Result};
use crate::voxel::{Vec3, VoxelIndex};
use ndarray::Array3;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Relative tolerance when checking that an extent is a multiple of the
/// voxel width.
const DIVISIBILITY_TOLERANCE: f64 = 1e-9;

/// Voxelized volume of interest.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(try_from = "VoxelGridParams", into = "VoxelGridParams")
)]
pub struct VoxelGrid {
    center: Vec3,
    extent: Vec3,
    voxel_width: f64,
    xyz_min: Vec3,
    xyz_max: Vec3,
    n_voxels: [usize; 3],
    /// Voxel centers, x-major.
    centers: Vec<Vec3>,
    /// Voxel (min, max) corners, x-major.
    edges: Vec<(Vec3, Vec3)>,
    rad_length: Option<f64>,
}

impl VoxelGrid {
    /// Creates a VOI centered at `center` with full side lengths `extent` (mm).
    ///
    /// # Errors
    /// Returns [`Error::Config`] for non-finite or non-positive parameters and
    /// [`Error::IndivisibleExtent`] if an extent is not a multiple of
    /// `voxel_width`.
    pub fn new(center: Vec3, extent: Vec3, voxel_width: f64) -> Result<Self> {
        if !voxel_width.is_finite() || voxel_width <= 0.0 {
            return Err(Error::Config(format!(
                "voxel width must be positive and finite, got {voxel_width}"
            )));
        }
        if center.iter().any(|c| !c.is_finite()) {
            return Err(Error::Config(format!(
                "VOI center must be finite, got {center:?}"
            )));
        }

        let mut n_voxels = [0usize; 3];
        for (axis, name) in ['x', 'y', 'z'].into_iter().enumerate() {
            let side = extent[axis];
            if !side.is_finite() || side <= 0.0 {
                return Err(Error::Config(format!(
                    "VOI extent along {name} must be positive and finite, got {side}"
                )));
            }
            let ratio = side / voxel_width;
            let rounded = ratio.round();
            if rounded < 1.0 || (ratio - rounded).abs() > DIVISIBILITY_TOLERANCE * rounded {
                return Err(Error::IndivisibleExtent {
                    axis: name,
                    extent: side,
                    voxel_width,
                });
            }
            n_voxels[axis] = rounded as usize;
        }

        let xyz_min = center - extent / 2.0;
        let xyz_max = center + extent / 2.0;

        let axis_centers: [Vec<f64>; 3] = std::array::from_fn(|axis| {
            let step = extent[axis] / n_voxels[axis] as f64;
            (0..n_voxels[axis])
                .map(|i| xyz_min[axis] + i as f64 * step + voxel_width / 2.0)
                .collect()
        });

        let len = n_voxels.iter().product();
        let mut centers = Vec::with_capacity(len);
        let mut edges = Vec::with_capacity(len);
        let half = Vec3::repeat(voxel_width / 2.0);
        for &x in &axis_centers[0] {
            for &y in &axis_centers[1] {
                for &z in &axis_centers[2] {
                    let c = Vec3::new(x, y, z);
                    centers.push(c);
                    edges.push((c - half, c + half));
                }
            }
        }

        Ok(Self {
            center,
            extent,
            voxel_width,
            xyz_min,
            xyz_max,
            n_voxels,
            centers,
            edges,
            rad_length: None,
        })
    }

    /// Attaches a uniform radiation length (mm) to every voxel.
    #[must_use]
    pub fn with_rad_length(mut self, x0: f64) -> Self {
        self.rad_length = Some(x0);
        self
    }

    /// Per-voxel radiation length, if one was attached.
    #[must_use]
    pub fn rad_length(&self) -> Option<Array3<f64>> {
        self.rad_length
            .map(|x0| Array3::from_elem(self.shape(), x0))
    }

    /// VOI center.
    #[must_use]
    pub fn center(&self) -> Vec3 {
        self.center
    }

    /// VOI side lengths.
    #[must_use]
    pub fn extent(&self) -> Vec3 {
        self.extent
    }

    /// Voxel side length.
    #[must_use]
    pub fn voxel_width(&self) -> f64 {
        self.voxel_width
    }

    /// Lower VOI corner.
    #[must_use]
    pub fn xyz_min(&self) -> Vec3 {
        self.xyz_min
    }

    /// Upper VOI corner.
    #[must_use]
    pub fn xyz_max(&self) -> Vec3 {
        self.xyz_max
    }

    /// Number of voxels along x, y and z.
    #[must_use]
    pub fn n_voxels(&self) -> [usize; 3] {
        self.n_voxels
    }

    /// Grid shape as an `ndarray` dimension tuple.
    #[must_use]
    pub fn shape(&self) -> (usize, usize, usize) {
        let [nx, ny, nz] = self.n_voxels;
        (nx, ny, nz)
    }

    /// Total number of voxels.
    #[must_use]
    pub fn len(&self) -> usize {
        self.centers.len()
    }

    /// Always false for a successfully constructed grid.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.centers.is_empty()
    }

    /// Flat x-major index of a voxel, or `None` if it is out of range.
    #[must_use]
    pub fn linear_index(&self, index: VoxelIndex) -> Option<usize> {
        let [ix, iy, iz] = index.as_usize()?;
        let [nx, ny, nz] = self.n_voxels;
        (ix < nx && iy < ny && iz < nz).then(|| self.flat_index([ix, iy, iz]))
    }

    /// Flat x-major index of in-range voxel components, without bounds checks.
    #[must_use]
    pub fn flat_index(&self, [ix, iy, iz]: [usize; 3]) -> usize {
        let [_, ny, nz] = self.n_voxels;
        (ix * ny + iy) * nz + iz
    }

    /// Inverse of [`VoxelGrid::linear_index`].
    #[must_use]
    pub fn voxel_index(&self, linear: usize) -> VoxelIndex {
        let [_, ny, nz] = self.n_voxels;
        VoxelIndex::new(
            (linear / (ny * nz)) as i32,
            ((linear / nz) % ny) as i32,
            (linear % nz) as i32,
        )
    }

    /// Center of a voxel.
    #[must_use]
    pub fn voxel_center(&self, index: VoxelIndex) -> Option<Vec3> {
        self.linear_index(index).map(|i| self.centers[i])
    }

    /// `(min, max)` corners of a voxel.
    #[must_use]
    pub fn voxel_edges(&self, index: VoxelIndex) -> Option<(Vec3, Vec3)> {
        self.linear_index(index).map(|i| self.edges[i])
    }

    /// All voxel centers, x-major.
    #[must_use]
    pub fn centers(&self) -> &[Vec3] {
        &self.centers
    }

    /// Strict bounding-box test. NaN coordinates are never inside.
    #[must_use]
    pub fn contains(&self, point: &Vec3) -> bool {
        (0..3).all(|axis| point[axis] > self.xyz_min[axis] && point[axis] < self.xyz_max[axis])
    }

    /// Finds the voxel containing `point`.
    ///
    /// Containment is tested against the precomputed voxel edges with strict
    /// inequalities, so a point lying exactly on a voxel face matches no
    /// voxel and maps to [`VoxelIndex::OUTSIDE`]. Only the voxel predicted by
    /// the grid arithmetic and its neighbours are tested. If rounding makes
    /// more than one voxel match, the one with the nearest center wins.
    #[must_use]
    pub fn locate(&self, point: &Vec3) -> VoxelIndex {
        if point.iter().any(|c| !c.is_finite()) {
            return VoxelIndex::OUTSIDE;
        }

        let guess: [i64; 3] = std::array::from_fn(|axis| {
            ((point[axis] - self.xyz_min[axis]) / self.voxel_width).floor() as i64
        });

        let mut best: Option<(usize, f64)> = None;
        for dx in -1..=1 {
            for dy in -1..=1 {
                for dz in -1..=1 {
                    let Some(linear) = self.checked_linear(guess, [dx, dy, dz]) else {
                        continue;
                    };
                    let (lo, hi) = &self.edges[linear];
                    let inside =
                        (0..3).all(|axis| point[axis] > lo[axis] && point[axis] < hi[axis]);
                    if !inside {
                        continue;
                    }
                    let distance = (point - self.centers[linear]).norm_squared();
                    if !best.is_some_and(|(_, d)| d <= distance) {
                        best = Some((linear, distance));
                    }
                }
            }
        }

        best.map_or(VoxelIndex::OUTSIDE, |(linear, _)| self.voxel_index(linear))
    }

    fn checked_linear(&self, guess: [i64; 3], offset: [i64; 3]) -> Option<usize> {
        let mut idx = [0i32; 3];
        for axis in 0..3 {
            let i = guess[axis].checked_add(offset[axis])?;
            if i < 0 || i >= self.n_voxels[axis] as i64 {
                return None;
            }
            idx[axis] = i as i32;
        }
        self.linear_index(VoxelIndex::new(idx[0], idx[1], idx[2]))
    }
}

/// Construction parameters, used as the serialized form of [`VoxelGrid`] so
/// that a deserialized grid is always rebuilt through [`VoxelGrid::new`].
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct VoxelGridParams {
    pub center: [f64; 3],
    pub extent: [f64; 3],
    pub voxel_width: f64,
    pub rad_length: Option<f64>,
}

impl From<VoxelGrid> for VoxelGridParams {
    fn from(grid: VoxelGrid) -> Self {
        Self {
            center: grid.center.into(),
            extent: grid.extent.into(),
            voxel_width: grid.voxel_width,
            rad_length: grid.rad_length,
        }
    }
}

impl TryFrom<VoxelGridParams> for VoxelGrid {
    type Error = Error;

    fn try_from(params: VoxelGridParams) -> Result<Self> {
        let grid = Self::new(
            Vec3::from(params.center),
            Vec3::from(params.extent),
            params.voxel_width,
        )?;
        Ok(match params.rad_length {
            Some(x0) => grid.with_rad_length(x0),
            None => grid,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn cube() -> VoxelGrid {
        VoxelGrid::new(Vec3::zeros(), Vec3::repeat(100.0), 10.0).unwrap()
    }

    #[test]
    fn test_grid_dimensions() {
        let voi = cube();
        assert_eq!(voi.n_voxels(), [10, 10, 10]);
        assert_eq!(voi.len(), 1000);
        assert_eq!(voi.xyz_min(), Vec3::repeat(-50.0));
        assert_eq!(voi.xyz_max(), Vec3::repeat(50.0));
    }

    #[test]
    fn test_voxel_centers_and_edges() {
        let voi = VoxelGrid::new(Vec3::new(0.0, 0.0, -200.0), Vec3::new(40.0, 20.0, 60.0), 20.0)
            .unwrap();
        assert_eq!(voi.n_voxels(), [2, 1, 3]);

        let first = VoxelIndex::new(0, 0, 0);
        assert_eq!(voi.voxel_center(first), Some(Vec3::new(-10.0, 0.0, -220.0)));
        let (lo, hi) = voi.voxel_edges(VoxelIndex::new(1, 0, 2)).unwrap();
        assert_eq!(lo, Vec3::new(0.0, -10.0, -190.0));
        assert_eq!(hi, Vec3::new(20.0, 10.0, -170.0));

        assert_eq!(voi.voxel_center(VoxelIndex::new(2, 0, 0)), None);
        assert_eq!(voi.voxel_center(VoxelIndex::OUTSIDE), None);
    }

    #[test]
    fn test_linear_index_roundtrip() {
        let voi = VoxelGrid::new(Vec3::zeros(), Vec3::new(30.0, 40.0, 50.0), 10.0).unwrap();
        for linear in 0..voi.len() {
            let idx = voi.voxel_index(linear);
            assert_eq!(voi.linear_index(idx), Some(linear));
        }
        // x-major: z varies fastest
        assert_eq!(voi.flat_index([0, 0, 1]), 1);
        assert_eq!(voi.flat_index([0, 1, 0]), 5);
        assert_eq!(voi.flat_index([1, 0, 0]), 20);
    }

    #[test]
    fn test_indivisible_extent() {
        let err = VoxelGrid::new(Vec3::zeros(), Vec3::new(100.0, 105.0, 100.0), 10.0).unwrap_err();
        assert!(matches!(err, Error::IndivisibleExtent { axis: 'y', .. }));

        let err = VoxelGrid::new(Vec3::zeros(), Vec3::repeat(5.0), 10.0).unwrap_err();
        assert!(matches!(err, Error::IndivisibleExtent { axis: 'x', .. }));

        // 0.3 / 0.1 is not exactly 3 in floating point
        let voi = VoxelGrid::new(Vec3::zeros(), Vec3::repeat(0.3), 0.1).unwrap();
        assert_eq!(voi.n_voxels(), [3, 3, 3]);
    }

    #[test]
    fn test_invalid_parameters() {
        assert!(matches!(
            VoxelGrid::new(Vec3::zeros(), Vec3::repeat(100.0), 0.0),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            VoxelGrid::new(Vec3::zeros(), Vec3::new(100.0, -100.0, 100.0), 10.0),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            VoxelGrid::new(Vec3::new(f64::NAN, 0.0, 0.0), Vec3::repeat(100.0), 10.0),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_locate() {
        let voi = cube();
        assert_eq!(voi.locate(&Vec3::new(5.0, 5.0, 5.0)), VoxelIndex::new(5, 5, 5));
        assert_eq!(voi.locate(&Vec3::new(-49.0, 0.5, 49.9)), VoxelIndex::new(0, 5, 9));
        assert_eq!(voi.locate(&Vec3::new(-5.0, -15.0, 25.0)), VoxelIndex::new(4, 3, 7));
        assert_eq!(voi.locate(&Vec3::new(60.0, 0.0, 0.0)), VoxelIndex::OUTSIDE);
        assert_eq!(voi.locate(&Vec3::new(f64::NAN, 0.0, 0.0)), VoxelIndex::OUTSIDE);
        // exactly on a voxel face
        assert_eq!(voi.locate(&Vec3::new(10.0, 5.0, 5.0)), VoxelIndex::OUTSIDE);
    }

    #[test]
    fn test_locate_agrees_with_exhaustive_search() {
        let voi = VoxelGrid::new(Vec3::new(3.0, -7.0, 11.0), Vec3::new(30.0, 20.0, 40.0), 5.0)
            .unwrap();
        let mut seed = 12_345u64;
        let mut next = || {
            seed = seed.wrapping_mul(6_364_136_223_846_793_005).wrapping_add(1);
            (seed >> 11) as f64 / (1u64 << 53) as f64
        };
        for _ in 0..500 {
            let p = Vec3::new(
                voi.xyz_min().x - 5.0 + next() * 40.0,
                voi.xyz_min().y - 5.0 + next() * 30.0,
                voi.xyz_min().z - 5.0 + next() * 50.0,
            );
            let exhaustive: Vec<usize> = (0..voi.len())
                .filter(|&i| {
                    let (lo, hi) = voi.edges[i];
                    (0..3).all(|a| p[a] > lo[a] && p[a] < hi[a])
                })
                .collect();
            let found = voi.locate(&p);
            match exhaustive.as_slice() {
                [] => assert!(found.is_outside()),
                [only] => assert_eq!(voi.linear_index(found), Some(*only)),
                _ => panic!("overlapping voxels at {p:?}"),
            }
        }
    }

    #[test]
    fn test_contains() {
        let voi = cube();
        assert!(voi.contains(&Vec3::new(0.0, 49.0, -49.0)));
        assert!(!voi.contains(&Vec3::new(0.0, 50.0, 0.0)));
        assert!(!voi.contains(&Vec3::new(f64::NAN, 0.0, 0.0)));
    }

    #[test]
    fn test_rad_length() {
        let voi = cube();
        assert!(voi.rad_length().is_none());
        let map = voi.with_rad_length(88.97).rad_length().unwrap();
        assert_eq!(map.dim(), (10, 10, 10));
        assert_abs_diff_eq!(map[[3, 4, 5]], 88.97);
    }
}
