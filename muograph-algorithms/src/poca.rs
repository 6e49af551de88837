//! POCA (Point Of Closest Approach) reconstruction.
//!
//! Pipeline run once at construction:
//! 1. Drop events whose scattering angle is not above `dtheta_cut`.
//! 2. Solve for the closest points of the two legs of every remaining event;
//!    the POCA point is their midpoint.
//! 3. Flag POCA points inside the VOI and find the voxel containing each.
//!
//! Scoring (grouping a per-event feature by voxel and reducing it) can then be
//! repeated with different features, masks and reductions.

use crate::scoring::{ScoreMethod, VoxelMap, VoxelScores};
use crate::tracking::{check_len, same_points, ScoreFeature, Tracking};
use log::{debug, info, warn};
use muograph_core::{Error, Result, Vec3, VoxelGrid, VoxelIndex};
use nalgebra::Matrix3;
use rayon::prelude::*;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Squared sine of the angle between the legs below which they are treated
/// as parallel.
const PARALLEL_TOLERANCE: f64 = 1e-12;

/// POCA configuration.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PocaConfig {
    /// Events with `dtheta <= dtheta_cut` (rad) are discarded.
    pub dtheta_cut: f64,
    /// Run the per-event and per-voxel loops on the rayon thread pool.
    pub parallel: bool,
}

impl Default for PocaConfig {
    fn default() -> Self {
        Self {
            dtheta_cut: 0.005,
            parallel: true,
        }
    }
}

impl PocaConfig {
    /// Creates a POCA configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the scattering angle cut.
    #[must_use]
    pub fn with_dtheta_cut(mut self, dtheta_cut: f64) -> Self {
        self.dtheta_cut = dtheta_cut;
        self
    }

    /// Sets whether to use parallel processing.
    #[must_use]
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }
}

/// Closest-approach midpoint of the lines `p1 + t * v1` and `p2 + t * v2`.
///
/// With `v3 = v2 x v1`, solves `t1 * v1 - t2 * v2 + t3 * v3 = p2 - p1`; the
/// closest points are `q1 = p1 + t1 * v1` and `q2 = p2 + t2 * v2`. Parallel
/// legs, a singular system or NaN inputs give a NaN point.
#[must_use]
#[allow(clippy::neg_cmp_op_on_partial_ord)]
pub fn poca_point(p1: &Vec3, v1: &Vec3, p2: &Vec3, v2: &Vec3) -> Vec3 {
    let invalid = Vec3::repeat(f64::NAN);
    let v3 = v2.cross(v1);
    let scale = v1.norm_squared() * v2.norm_squared();
    // negated so that NaN also bails out
    if !(v3.norm_squared() > PARALLEL_TOLERANCE * scale) {
        return invalid;
    }

    let system = Matrix3::from_columns(&[*v1, -*v2, v3]);
    let Some(t) = system.lu().solve(&(p2 - p1)) else {
        return invalid;
    };
    let q1 = p1 + v1 * t[0];
    let q2 = p2 + v2 * t[1];
    (q2 - q1) / 2.0 + q1
}

/// POCA reconstruction over a tracked event set and a VOI.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Poca {
    config: PocaConfig,
    voi: VoxelGrid,
    /// Tracking before the angle cut.
    all_tracks: Tracking,
    /// Tracking after the angle cut; every array below is aligned with it.
    tracks: Tracking,
    /// One entry per event of `all_tracks`, true if kept.
    parallel_mask: Vec<bool>,
    #[cfg_attr(feature = "serde", serde(with = "muograph_core::float_serde::vec3"))]
    poca_points: Vec<Vec3>,
    mask_in_voi: Vec<bool>,
    triggered_voxels: Vec<VoxelIndex>,
}

impl Poca {
    /// Runs the angle cut, the POCA solve and the voxel assignment.
    ///
    /// # Errors
    /// Returns [`Error::Config`] for a negative or non-finite `dtheta_cut`,
    /// and propagates tracking validation errors.
    pub fn new(all_tracks: Tracking, voi: VoxelGrid, config: PocaConfig) -> Result<Self> {
        if !config.dtheta_cut.is_finite() || config.dtheta_cut < 0.0 {
            return Err(Error::Config(format!(
                "dtheta cut must be finite and non-negative, got {}",
                config.dtheta_cut
            )));
        }
        all_tracks.validate()?;

        let parallel_mask: Vec<bool> = all_tracks
            .dtheta()
            .iter()
            .map(|&dtheta| dtheta > config.dtheta_cut)
            .collect();
        let tracks = all_tracks.apply_mask(&parallel_mask)?;
        info!(
            "{} of {} events pass the dtheta > {} rad cut",
            tracks.n_event(),
            all_tracks.n_event(),
            config.dtheta_cut
        );

        let solve = |event: usize| {
            let (line_in, line_out) = (tracks.line_in(event), tracks.line_out(event));
            poca_point(
                &line_in.point,
                &line_in.direction,
                &line_out.point,
                &line_out.direction,
            )
        };
        let poca_points: Vec<Vec3> = if config.parallel {
            (0..tracks.n_event()).into_par_iter().map(solve).collect()
        } else {
            (0..tracks.n_event()).map(solve).collect()
        };

        let degenerate = poca_points.iter().filter(|p| p.x.is_nan()).count();
        if degenerate > 0 {
            warn!("{degenerate} events have near-parallel legs and no POCA point");
        }

        let mask_in_voi: Vec<bool> = poca_points.iter().map(|p| voi.contains(p)).collect();

        debug!("Locating scattering points in {} voxels", voi.len());
        let triggered_voxels: Vec<VoxelIndex> = if config.parallel {
            poca_points.par_iter().map(|p| voi.locate(p)).collect()
        } else {
            poca_points.iter().map(|p| voi.locate(p)).collect()
        };
        info!(
            "{} POCA points inside the VOI",
            mask_in_voi.iter().filter(|&&inside| inside).count()
        );

        Ok(Self {
            config,
            voi,
            all_tracks,
            tracks,
            parallel_mask,
            poca_points,
            mask_in_voi,
            triggered_voxels,
        })
    }

    /// Groups `feature` (one value per retained event) by triggered voxel.
    ///
    /// Events outside every voxel, and events where `mask` is false, are
    /// skipped.
    ///
    /// # Errors
    /// Returns [`Error::LengthMismatch`] if `feature` or `mask` are not
    /// aligned with [`Poca::tracks`].
    pub fn voxel_scores(&self, feature: &[f64], mask: Option<&[bool]>) -> Result<VoxelScores<'_>> {
        let n = self.tracks.n_event();
        check_len("score feature", n, feature.len())?;
        if let Some(mask) = mask {
            check_len("score mask", n, mask.len())?;
        }
        Ok(VoxelScores::group(
            &self.voi,
            &self.triggered_voxels,
            feature,
            mask,
        ))
    }

    /// Per-voxel reduced score and hit count for `feature`.
    ///
    /// # Errors
    /// See [`Poca::voxel_scores`].
    pub fn reconstruct(
        &self,
        feature: &[f64],
        method: &ScoreMethod,
        mask: Option<&[bool]>,
    ) -> Result<VoxelMap> {
        let scores = self.voxel_scores(feature, mask)?;
        debug!(
            "Reducing {} scores with {}",
            scores.total(),
            method.name()
        );
        Ok(scores.reduce(method, self.config.parallel))
    }

    /// [`Poca::reconstruct`] using one of the tracking features.
    ///
    /// # Errors
    /// Returns [`Error::Config`] when the energy feature is requested but no
    /// energy was supplied.
    pub fn reconstruct_feature(
        &self,
        feature: ScoreFeature,
        method: &ScoreMethod,
        mask: Option<&[bool]>,
    ) -> Result<VoxelMap> {
        let values = self.tracks.feature(feature).ok_or_else(|| {
            Error::Config(format!("feature {} is not available", feature.name()))
        })?;
        self.reconstruct(values, method, mask)
    }

    /// POCA points inside the VOI.
    #[must_use]
    pub fn poca_points_in(&self) -> Vec<Vec3> {
        self.poca_points
            .iter()
            .zip(&self.mask_in_voi)
            .filter_map(|(p, &inside)| inside.then_some(*p))
            .collect()
    }

    /// In-VOI POCA points rescaled with the x range of those points.
    ///
    /// The same x-axis minimum and maximum are applied to y and z as well, so
    /// only x is guaranteed to land in `[0, 1]`. See
    /// [`Poca::normalized_poca_points_per_axis`] for independent axes.
    /// A zero-width range maps to 0.
    #[must_use]
    pub fn normalized_poca_points(&self) -> Vec<Vec3> {
        let points = self.poca_points_in();
        let (lo, hi) = axis_range(&points, 0);
        points
            .iter()
            .map(|p| p.map(|c| rescale(c, lo, hi)))
            .collect()
    }

    /// In-VOI POCA points rescaled to `[0, 1]` independently on each axis.
    /// A zero-width range maps to 0.
    #[must_use]
    pub fn normalized_poca_points_per_axis(&self) -> Vec<Vec3> {
        let points = self.poca_points_in();
        let ranges: [(f64, f64); 3] = std::array::from_fn(|axis| axis_range(&points, axis));
        points
            .iter()
            .map(|p| {
                Vec3::from_fn(|axis, _| {
                    let (lo, hi) = ranges[axis];
                    rescale(p[axis], lo, hi)
                })
            })
            .collect()
    }

    /// Re-checks the invariants, e.g. after deserialization.
    ///
    /// After the alignment checks, the angle cut, filtered tracking, POCA
    /// points, VOI mask and voxel assignment are recomputed from
    /// `all_tracks`, the VOI and the configuration and compared with the
    /// stored ones.
    ///
    /// # Errors
    /// Returns the first inconsistency found: [`Error::LengthMismatch`] or
    /// [`Error::Shape`] for misaligned arrays, [`Error::Inconsistent`] for
    /// stored values that disagree with the recomputed ones.
    pub fn validate(&self) -> Result<()> {
        self.all_tracks.validate()?;
        self.tracks.validate()?;
        check_len("parallel mask", self.all_tracks.n_event(), self.parallel_mask.len())?;
        let kept = self.parallel_mask.iter().filter(|&&k| k).count();
        let n = self.tracks.n_event();
        check_len("filtered tracks", kept, n)?;
        check_len("poca points", n, self.poca_points.len())?;
        check_len("VOI mask", n, self.mask_in_voi.len())?;
        check_len("triggered voxels", n, self.triggered_voxels.len())?;
        if let Some(bad) = self
            .triggered_voxels
            .iter()
            .find(|idx| !idx.is_outside() && self.voi.linear_index(**idx).is_none())
        {
            return Err(Error::Shape(format!(
                "triggered voxel {bad:?} is outside a {:?} grid",
                self.voi.n_voxels()
            )));
        }

        let expected = Self::new(self.all_tracks.clone(), self.voi.clone(), self.config.clone())?;
        let inconsistent = |what: &str| {
            Err(Error::Inconsistent(format!(
                "{what} does not match the stored tracks, VOI and configuration"
            )))
        };
        if self.parallel_mask != expected.parallel_mask {
            return inconsistent("parallel mask");
        }
        if !self.tracks.same_values(&expected.tracks) {
            return inconsistent("filtered tracking");
        }
        if !same_points(&self.poca_points, &expected.poca_points) {
            return inconsistent("POCA points");
        }
        if self.mask_in_voi != expected.mask_in_voi {
            return inconsistent("VOI mask");
        }
        if self.triggered_voxels != expected.triggered_voxels {
            return inconsistent("triggered voxels");
        }
        Ok(())
    }

    /// Configuration used for this reconstruction.
    #[must_use]
    pub fn config(&self) -> &PocaConfig {
        &self.config
    }

    /// Volume of interest.
    #[must_use]
    pub fn voi(&self) -> &VoxelGrid {
        &self.voi
    }

    /// Tracking before the angle cut.
    #[must_use]
    pub fn all_tracks(&self) -> &Tracking {
        &self.all_tracks
    }

    /// Tracking after the angle cut.
    #[must_use]
    pub fn tracks(&self) -> &Tracking {
        &self.tracks
    }

    /// Angle-cut mask over [`Poca::all_tracks`].
    #[must_use]
    pub fn parallel_mask(&self) -> &[bool] {
        &self.parallel_mask
    }

    /// POCA point of every retained event, NaN when undefined.
    #[must_use]
    pub fn poca_points(&self) -> &[Vec3] {
        &self.poca_points
    }

    /// True where the POCA point lies strictly inside the VOI.
    #[must_use]
    pub fn mask_in_voi(&self) -> &[bool] {
        &self.mask_in_voi
    }

    /// Voxel containing each POCA point, [`VoxelIndex::OUTSIDE`] if none.
    #[must_use]
    pub fn triggered_voxels(&self) -> &[VoxelIndex] {
        &self.triggered_voxels
    }
}

fn rescale(c: f64, lo: f64, hi: f64) -> f64 {
    let span = hi - lo;
    if span > 0.0 {
        (c - lo) / span
    } else {
        0.0
    }
}

fn axis_range(points: &[Vec3], axis: usize) -> (f64, f64) {
    points.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), p| {
        (lo.min(p[axis]), hi.max(p[axis]))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_intersecting_lines() {
        let m = Vec3::new(12.5, -3.0, 40.0);
        let v1 = Vec3::new(0.2, 0.1, -1.0);
        let v2 = Vec3::new(-0.3, 0.05, -1.0);
        let p1 = m - v1 * 250.0;
        let p2 = m + v2 * 170.0;
        let poca = poca_point(&p1, &v1, &p2, &v2);
        assert_abs_diff_eq!(poca, m, epsilon = 1e-6);
    }

    #[test]
    fn test_perpendicular_lines() {
        let poca = poca_point(
            &Vec3::new(0.0, 0.0, 10.0),
            &Vec3::new(0.0, 0.0, -1.0),
            &Vec3::new(0.0, 0.0, -10.0),
            &Vec3::new(1.0, 0.0, 0.0),
        );
        assert_abs_diff_eq!(poca, Vec3::new(0.0, 0.0, -10.0), epsilon = 1e-12);
    }

    #[test]
    fn test_skew_lines_midpoint() {
        // z axis and the line y = 5, z = -10 along x; common perpendicular
        // runs from (0, 0, -10) to (0, 5, -10)
        let poca = poca_point(
            &Vec3::new(0.0, 0.0, 10.0),
            &Vec3::new(0.0, 0.0, -1.0),
            &Vec3::new(3.0, 5.0, -10.0),
            &Vec3::new(1.0, 0.0, 0.0),
        );
        assert_abs_diff_eq!(poca, Vec3::new(0.0, 2.5, -10.0), epsilon = 1e-12);
    }

    #[test]
    fn test_parallel_lines_are_invalid() {
        let v = Vec3::new(0.1, 0.0, -1.0);
        let poca = poca_point(&Vec3::zeros(), &v, &Vec3::new(5.0, 0.0, 0.0), &(v * 3.0));
        assert!(poca.iter().all(|c| c.is_nan()));

        let nan = Vec3::repeat(f64::NAN);
        assert!(poca_point(&Vec3::zeros(), &nan, &Vec3::zeros(), &v).x.is_nan());
    }

    const PLANES: [f64; 4] = [300.0, 200.0, -200.0, -300.0];

    fn muon(vertex: Vec3, d_in: Vec3, d_out: Vec3) -> Vec<Vec3> {
        PLANES
            .iter()
            .map(|&z| {
                let d = if z > vertex.z { d_in } else { d_out };
                vertex + d * ((z - vertex.z) / d.z)
            })
            .collect()
    }

    fn sample_poca() -> Poca {
        let down = Vec3::new(0.0, 0.0, -1.0);
        let kicked = Vec3::new(0.08, -0.03, -1.0);
        let hits = muograph_core::HitArray::from_events(&[
            muon(Vec3::new(12.0, -7.0, 3.0), down, kicked),
            muon(Vec3::new(-24.0, 31.0, -16.0), kicked, down),
            muon(Vec3::new(5.0, 5.0, 5.0), down, down),
            muon(Vec3::new(33.0, 2.0, 41.0), down, kicked),
        ])
        .unwrap();
        let voi = VoxelGrid::new(Vec3::zeros(), Vec3::repeat(100.0), 10.0).unwrap();
        Poca::new(Tracking::new(hits).unwrap(), voi, PocaConfig::default()).unwrap()
    }

    #[test]
    fn test_pipeline_state() {
        let poca = sample_poca();
        assert_eq!(poca.parallel_mask(), &[true, true, false, true]);
        assert_eq!(poca.tracks().n_event(), 3);
        assert_abs_diff_eq!(poca.poca_points()[0], Vec3::new(12.0, -7.0, 3.0), epsilon = 1e-6);
        assert_eq!(poca.triggered_voxels()[0], VoxelIndex::new(6, 4, 5));
        poca.validate().unwrap();
    }

    #[test]
    fn test_validate_rejects_tampered_state() {
        let poca = sample_poca();
        let is_inconsistent = |p: &Poca| matches!(p.validate(), Err(Error::Inconsistent(_)));

        // same kept count, different events
        let mut tampered = poca.clone();
        tampered.parallel_mask = vec![true, true, true, false];
        assert!(is_inconsistent(&tampered));

        let mut tampered = poca.clone();
        tampered.tracks = poca.all_tracks.apply_mask(&[true, true, true, false]).unwrap();
        assert!(is_inconsistent(&tampered));

        let mut tampered = poca.clone();
        tampered.poca_points[1].z += 1.0;
        assert!(is_inconsistent(&tampered));

        let mut tampered = poca.clone();
        tampered.triggered_voxels[0] = VoxelIndex::OUTSIDE;
        assert!(is_inconsistent(&tampered));

        let mut tampered = poca.clone();
        tampered.mask_in_voi[0] = false;
        assert!(is_inconsistent(&tampered));
    }

    #[test]
    fn test_config_builder() {
        let config = PocaConfig::new().with_dtheta_cut(0.01).with_parallel(false);
        assert_abs_diff_eq!(config.dtheta_cut, 0.01);
        assert!(!config.parallel);
        assert_abs_diff_eq!(PocaConfig::default().dtheta_cut, 0.005);
    }
}
