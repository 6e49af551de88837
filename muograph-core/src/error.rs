//! Error types for muograph-core.

use thiserror::Error;

/// Result type alias for muograph operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for muograph operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// Malformed construction parameters.
    #[error("configuration error: {0}")]
    Config(String),

    /// VOI extent is not an integer multiple of the voxel width.
    #[error("VOI extent {extent} along {axis} is not a multiple of voxel width {voxel_width}")]
    IndivisibleExtent {
        axis: char,
        extent: f64,
        voxel_width: f64,
    },

    /// Input array dimensions are inconsistent.
    #[error("shape error: {0}")]
    Shape(String),

    /// Two per-event arrays that must be aligned have different lengths.
    #[error("length mismatch for {what}: expected {expected}, found {found}")]
    LengthMismatch {
        what: &'static str,
        expected: usize,
        found: usize,
    },

    /// Stored derived values disagree with the values they derive from.
    #[error("inconsistent state: {0}")]
    Inconsistent(String),

    /// Line fit could not be performed.
    #[error("fitting error: {0}")]
    Fitting(#[from] FitError),
}

/// Line fitting errors.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum FitError {
    /// Fewer than two points were supplied.
    #[error("at least 2 points are required to fit a line, found {found}")]
    TooFewPoints { found: usize },

    /// All supplied points coincide, so no direction is defined.
    #[error("all points coincide, line direction is undefined")]
    CoincidentPoints,

    /// A point has a NaN or infinite coordinate.
    #[error("point coordinates must be finite")]
    NonFinite,
}
