//! muograph-core: Core types for muon scattering tomography.
//!
//! This crate provides the foundational data model shared by the
//! reconstruction stages: validated detector hit arrays, the voxelized
//! volume of interest, and the error taxonomy.
//!

pub mod error;
#[cfg(feature = "serde")]
pub mod float_serde;
pub mod hits;
pub mod voxel;
pub mod volume;

pub use error::{Error, FitError, Result};
pub use hits::{HitArray, Leg};
pub use voxel::{Vec3, VoxelIndex};
pub use volume::VoxelGrid;
