//! Small geometric value types shared across the workspace.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// 3D point or direction in detector coordinates (mm).
pub type Vec3 = nalgebra::Vector3<f64>;

/// Integer index of a voxel in the VOI grid.
///
/// Events whose scattering point lies outside every voxel carry
/// [`VoxelIndex::OUTSIDE`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct VoxelIndex {
    pub ix: i32,
    pub iy: i32,
    pub iz: i32,
}

impl VoxelIndex {
    /// Sentinel for "no voxel".
    pub const OUTSIDE: Self = Self {
        ix: -1,
        iy: -1,
        iz: -1,
    };

    /// Creates a new voxel index.
    #[must_use]
    pub const fn new(ix: i32, iy: i32, iz: i32) -> Self {
        Self { ix, iy, iz }
    }

    /// Returns true for the sentinel index.
    #[must_use]
    pub fn is_outside(&self) -> bool {
        *self == Self::OUTSIDE
    }

    /// Returns the index as unsigned components, or `None` if any is negative.
    #[must_use]
    pub fn as_usize(&self) -> Option<[usize; 3]> {
        Some([
            usize::try_from(self.ix).ok()?,
            usize::try_from(self.iy).ok()?,
            usize::try_from(self.iz).ok()?,
        ])
    }
}

impl Default for VoxelIndex {
    fn default() -> Self {
        Self::OUTSIDE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_voxel_index_sentinel() {
        assert!(VoxelIndex::OUTSIDE.is_outside());
        assert!(VoxelIndex::default().is_outside());
        assert_eq!(VoxelIndex::OUTSIDE.as_usize(), None);

        let idx = VoxelIndex::new(5, 0, 9);
        assert!(!idx.is_outside());
        assert_eq!(idx.as_usize(), Some([5, 0, 9]));
        assert_eq!(VoxelIndex::new(2, -1, 0).as_usize(), None);
    }
}
