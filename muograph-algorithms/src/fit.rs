//! Orthogonal least-squares line fitting.

use muograph_core::{FitError, Vec3};
use nalgebra::{Matrix3, SymmetricEigen};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A 3D line given by a point and a direction.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Line {
    /// A point on the line (the centroid of the fitted points).
    pub point: Vec3,
    /// Unit direction, oriented from the first towards the last fitted point.
    pub direction: Vec3,
}

impl Line {
    /// Line with every component set to NaN, used for events that cannot be fit.
    #[must_use]
    pub fn invalid() -> Self {
        Self {
            point: Vec3::repeat(f64::NAN),
            direction: Vec3::repeat(f64::NAN),
        }
    }

    /// Point at parameter `t` along the line.
    #[must_use]
    pub fn at(&self, t: f64) -> Vec3 {
        self.point + self.direction * t
    }
}

/// Fits a line through `points` minimising the sum of squared perpendicular
/// distances.
///
/// The direction is the principal axis of the point set: the eigenvector of
/// the scatter matrix with the largest eigenvalue.
///
/// # Errors
/// Returns [`FitError::TooFewPoints`] for fewer than two points,
/// [`FitError::NonFinite`] for NaN or infinite coordinates and
/// [`FitError::CoincidentPoints`] when all points are identical.
#[allow(clippy::cast_precision_loss)]
pub fn fit_line(points: &[Vec3]) -> Result<Line, FitError> {
    let (first, last) = match points {
        [first, .., last] => (first, last),
        _ => return Err(FitError::TooFewPoints { found: points.len() }),
    };
    if points.iter().any(|p| p.iter().any(|c| !c.is_finite())) {
        return Err(FitError::NonFinite);
    }
    if points.iter().all(|p| p == first) {
        return Err(FitError::CoincidentPoints);
    }

    let centroid = points.iter().sum::<Vec3>() / points.len() as f64;
    let scatter = points.iter().fold(Matrix3::zeros(), |acc, p| {
        let d = p - centroid;
        acc + d * d.transpose()
    });

    let eigen = SymmetricEigen::new(scatter);
    let mut direction: Vec3 = eigen.eigenvectors.column(eigen.eigenvalues.imax()).into_owned();
    if direction.dot(&(last - first)) < 0.0 {
        direction = -direction;
    }

    Ok(Line {
        point: centroid,
        direction,
    })
}
