//! Per-voxel score grouping and reduction.
#![allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]

use log::debug;
use muograph_core::{VoxelGrid, VoxelIndex};
use ndarray::Array3;
use rayon::prelude::*;

/// Reduction applied to the scores collected in one voxel.
#[derive(Clone, Copy, Default)]
pub enum ScoreMethod {
    /// 50% quantile.
    #[default]
    Median,
    /// Arithmetic mean.
    Mean,
    /// Quantile `q` in `[0, 1]`, linearly interpolated between order statistics.
    Quantile(f64),
    /// Population variance.
    Variance,
    /// Population standard deviation.
    StdDev,
    /// Largest score.
    Max,
    /// Smallest score.
    Min,
    /// Sum of scores.
    Sum,
    /// User-supplied reduction.
    Custom(fn(&[f64]) -> f64),
}

impl ScoreMethod {
    /// Reduces a non-empty list of scores to one value.
    ///
    /// Any NaN in `scores` makes the result NaN.
    #[must_use]
    pub fn reduce(&self, scores: &[f64]) -> f64 {
        if scores.is_empty() {
            return f64::NAN;
        }
        let n = scores.len() as f64;
        match *self {
            Self::Median => quantile(scores, 0.5),
            Self::Quantile(q) => quantile(scores, q),
            Self::Mean => scores.iter().sum::<f64>() / n,
            Self::Variance => variance(scores),
            Self::StdDev => variance(scores).sqrt(),
            Self::Max => scores.iter().copied().fold(f64::NEG_INFINITY, nan_max),
            Self::Min => scores.iter().copied().fold(f64::INFINITY, nan_min),
            Self::Sum => scores.iter().sum(),
            Self::Custom(f) => f(scores),
        }
    }

    /// Short lowercase name.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Median => "median",
            Self::Mean => "mean",
            Self::Quantile(_) => "quantile",
            Self::Variance => "variance",
            Self::StdDev => "std",
            Self::Max => "max",
            Self::Min => "min",
            Self::Sum => "sum",
            Self::Custom(_) => "custom",
        }
    }
}

impl std::fmt::Debug for ScoreMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Quantile(q) => write!(f, "Quantile({q})"),
            other => f.write_str(other.name()),
        }
    }
}

fn quantile(scores: &[f64], q: f64) -> f64 {
    if scores.iter().any(|s| s.is_nan()) || !(0.0..=1.0).contains(&q) {
        return f64::NAN;
    }
    let mut sorted = scores.to_vec();
    sorted.sort_unstable_by(f64::total_cmp);
    let pos = q * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64)
}

fn variance(scores: &[f64]) -> f64 {
    let n = scores.len() as f64;
    let mean = scores.iter().sum::<f64>() / n;
    scores.iter().map(|s| (s - mean).powi(2)).sum::<f64>() / n
}

fn nan_max(a: f64, b: f64) -> f64 {
    if a.is_nan() || b.is_nan() {
        f64::NAN
    } else {
        a.max(b)
    }
}

fn nan_min(a: f64, b: f64) -> f64 {
    if a.is_nan() || b.is_nan() {
        f64::NAN
    } else {
        a.min(b)
    }
}

/// Dense per-voxel outputs of a reconstruction.
#[derive(Debug, Clone, PartialEq)]
pub struct VoxelMap {
    /// Reduced score per voxel, 0 where no event contributed.
    pub scores: Array3<f64>,
    /// Number of contributing events per voxel.
    pub hits: Array3<usize>,
}

/// Scores grouped by the voxel their event falls in.
///
/// Stored flat in x-major voxel order, one growable list per voxel.
#[derive(Debug, Clone, PartialEq)]
pub struct VoxelScores<'a> {
    voi: &'a VoxelGrid,
    lists: Vec<Vec<f64>>,
}

impl<'a> VoxelScores<'a> {
    /// Groups `scores` by `triggered` voxel.
    ///
    /// Events with the sentinel index, and events masked out, are skipped.
    /// Callers check that all slices have the same length.
    pub(crate) fn group(
        voi: &'a VoxelGrid,
        triggered: &[VoxelIndex],
        scores: &[f64],
        mask: Option<&[bool]>,
    ) -> Self {
        let mut lists = vec![Vec::new(); voi.len()];
        let mut skipped = 0usize;
        for (event, (index, &score)) in triggered.iter().zip(scores).enumerate() {
            if mask.is_some_and(|m| !m[event]) {
                continue;
            }
            match voi.linear_index(*index) {
                Some(linear) => lists[linear].push(score),
                None => skipped += 1,
            }
        }
        debug!("{skipped} events outside every voxel were not scored");
        Self { voi, lists }
    }

    /// Scores collected in one voxel; empty for out-of-range indices.
    #[must_use]
    pub fn scores_at(&self, index: VoxelIndex) -> &[f64] {
        match self.voi.linear_index(index) {
            Some(i) => &self.lists[i],
            None => &[],
        }
    }

    /// Number of events collected in one voxel.
    #[must_use]
    pub fn hit_count(&self, index: VoxelIndex) -> usize {
        self.scores_at(index).len()
    }

    /// Total number of scored events.
    #[must_use]
    pub fn total(&self) -> usize {
        self.lists.iter().map(Vec::len).sum()
    }

    /// Reduces every non-empty voxel with `method`.
    #[must_use]
    pub fn reduce(&self, method: &ScoreMethod, parallel: bool) -> VoxelMap {
        let reduce_one = |scores: &Vec<f64>| {
            if scores.is_empty() {
                0.0
            } else {
                method.reduce(scores)
            }
        };
        let values: Vec<f64> = if parallel {
            self.lists.par_iter().map(reduce_one).collect()
        } else {
            self.lists.iter().map(reduce_one).collect()
        };

        let [nx, ny, nz] = self.voi.n_voxels();
        let flat = |(i, j, k): (usize, usize, usize)| self.voi.flat_index([i, j, k]);
        VoxelMap {
            scores: Array3::from_shape_fn((nx, ny, nz), |idx| values[flat(idx)]),
            hits: Array3::from_shape_fn((nx, ny, nz), |idx| self.lists[flat(idx)].len()),
        }
    }
}
