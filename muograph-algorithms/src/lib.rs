//! muograph-algorithms: Reconstruction algorithms for muon scattering tomography.
//!
//! This crate provides the batch reconstruction pipeline:
//! - **Tracking** - orthogonal least-squares line fits of the incoming and
//!   outgoing legs, zenith/azimuth and scattering angles
//! - **POCA** - point of closest approach between the two legs, VOI
//!   membership and voxel assignment
//! - **Scoring** - per-voxel grouping of an event feature and its reduction
//!   to a dense score map
//!
#![warn(missing_docs)]

mod angles;
mod fit;
mod poca;
mod scoring;
mod tracking;

pub use angles::{scattering_angles, zenith_azimuth, ScatteringAngles};
pub use fit::{fit_line, Line};
pub use poca::{poca_point, Poca, PocaConfig};
pub use scoring::{ScoreMethod, VoxelMap, VoxelScores};
pub use tracking::{Distribution, ScoreFeature, Tracking, TrackingConfig, TrackingSummary};

// Re-export core types used throughout the public API
pub use muograph_core::{Error, HitArray, Result, Vec3, VoxelGrid, VoxelIndex};
