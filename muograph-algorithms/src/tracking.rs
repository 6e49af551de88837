//! Muon tracking: per-event line fits and derived angles.
//!
//! Assumes perfect detector alignment. Every per-event quantity is stored in
//! its own column; [`Tracking::apply_mask`] filters all of them together and
//! returns a new value.
#![allow(clippy::cast_precision_loss)]

use crate::angles::{scattering_angles, zenith_azimuth};
use crate::fit::{fit_line, Line};
use log::{debug, info, warn};
use muograph_core::error::{Error, FitError, Result};
use muograph_core::hits::{HitArray, Leg};
use muograph_core::Vec3;
use rayon::prelude::*;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Tracking configuration.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TrackingConfig {
    /// Fit events on the rayon thread pool.
    pub parallel: bool,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self { parallel: true }
    }
}

impl TrackingConfig {
    /// Creates a tracking configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets whether to fit events in parallel.
    #[must_use]
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }
}

/// Scalar per-event quantity that can be used as a voxel score.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoreFeature {
    /// 3D scattering angle.
    Dtheta,
    /// Signed scattering angle in the x-z plane.
    DthetaX,
    /// Signed scattering angle in the y-z plane.
    DthetaY,
    /// Incoming zenith angle.
    ThetaIn,
    /// Outgoing zenith angle.
    ThetaOut,
    /// Incoming azimuth.
    PhiIn,
    /// Outgoing azimuth.
    PhiOut,
    /// Muon energy, when provided at construction.
    Energy,
}

impl ScoreFeature {
    /// Short lowercase name.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Dtheta => "dtheta",
            Self::DthetaX => "dtheta_x",
            Self::DthetaY => "dtheta_y",
            Self::ThetaIn => "theta_in",
            Self::ThetaOut => "theta_out",
            Self::PhiIn => "phi_in",
            Self::PhiOut => "phi_out",
            Self::Energy => "energy",
        }
    }
}

/// Mean, standard deviation and range of the finite values of an array.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Distribution {
    /// Number of finite values.
    pub count: usize,
    /// Arithmetic mean.
    pub mean: f64,
    /// Population standard deviation.
    pub std: f64,
    /// Smallest value.
    pub min: f64,
    /// Largest value.
    pub max: f64,
}

impl Distribution {
    fn of<'a>(values: impl Iterator<Item = &'a f64>) -> Self {
        let finite: Vec<f64> = values.copied().filter(|v| v.is_finite()).collect();
        if finite.is_empty() {
            return Self {
                count: 0,
                mean: f64::NAN,
                std: f64::NAN,
                min: f64::NAN,
                max: f64::NAN,
            };
        }
        let n = finite.len() as f64;
        let mean = finite.iter().sum::<f64>() / n;
        let var = finite.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
        Self {
            count: finite.len(),
            mean,
            std: var.sqrt(),
            min: finite.iter().copied().fold(f64::INFINITY, f64::min),
            max: finite.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        }
    }
}

/// Summary statistics of a tracking run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackingSummary {
    /// Number of events summarised.
    pub n_event: usize,
    /// Incoming zenith angle distribution.
    pub theta_in: Distribution,
    /// Outgoing zenith angle distribution.
    pub theta_out: Distribution,
    /// 3D scattering angle distribution.
    pub dtheta: Distribution,
}

/// Fitted tracks and angles for a set of events.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Tracking {
    hits: HitArray,
    #[cfg_attr(feature = "serde", serde(with = "muograph_core::float_serde::option_vec"))]
    energy: Option<Vec<f64>>,
    #[cfg_attr(feature = "serde", serde(with = "muograph_core::float_serde::vec3"))]
    direction_in: Vec<Vec3>,
    #[cfg_attr(feature = "serde", serde(with = "muograph_core::float_serde::vec3"))]
    direction_out: Vec<Vec3>,
    #[cfg_attr(feature = "serde", serde(with = "muograph_core::float_serde::vec3"))]
    point_in: Vec<Vec3>,
    #[cfg_attr(feature = "serde", serde(with = "muograph_core::float_serde::vec3"))]
    point_out: Vec<Vec3>,
    #[cfg_attr(feature = "serde", serde(with = "muograph_core::float_serde::vec"))]
    theta_in: Vec<f64>,
    #[cfg_attr(feature = "serde", serde(with = "muograph_core::float_serde::vec"))]
    phi_in: Vec<f64>,
    #[cfg_attr(feature = "serde", serde(with = "muograph_core::float_serde::vec"))]
    theta_out: Vec<f64>,
    #[cfg_attr(feature = "serde", serde(with = "muograph_core::float_serde::vec"))]
    phi_out: Vec<f64>,
    #[cfg_attr(feature = "serde", serde(with = "muograph_core::float_serde::vec"))]
    dtheta: Vec<f64>,
    #[cfg_attr(feature = "serde", serde(with = "muograph_core::float_serde::vec"))]
    dtheta_x: Vec<f64>,
    #[cfg_attr(feature = "serde", serde(with = "muograph_core::float_serde::vec"))]
    dtheta_y: Vec<f64>,
}

impl Tracking {
    /// Fits every event of `hits` with the default configuration.
    ///
    /// # Errors
    /// Returns [`Error::Fitting`] if a leg has fewer than two planes.
    pub fn new(hits: HitArray) -> Result<Self> {
        Self::with_config(hits, None, &TrackingConfig::default())
    }

    /// Fits every event and attaches a per-event energy.
    ///
    /// # Errors
    /// Returns [`Error::LengthMismatch`] if `energy` does not have one entry
    /// per event, and [`Error::Fitting`] if a leg has fewer than two planes.
    pub fn with_energy(hits: HitArray, energy: Vec<f64>) -> Result<Self> {
        Self::with_config(hits, Some(energy), &TrackingConfig::default())
    }

    /// Fits every event with an explicit configuration.
    ///
    /// Events whose hits on a leg all coincide or are not finite get NaN
    /// lines and angles; they do not abort the batch.
    ///
    /// # Errors
    /// See [`Tracking::with_energy`].
    pub fn with_config(
        hits: HitArray,
        energy: Option<Vec<f64>>,
        config: &TrackingConfig,
    ) -> Result<Self> {
        hits.validate()?;
        if hits.planes_per_leg() < 2 {
            return Err(FitError::TooFewPoints {
                found: hits.planes_per_leg(),
            }
            .into());
        }
        if let Some(energy) = &energy {
            check_len("energy", hits.n_event(), energy.len())?;
        }

        info!(
            "Tracking {} events over {} planes",
            hits.n_event(),
            hits.n_plane()
        );

        let fit_event = |event: usize| -> (Line, Line) {
            let fit =
                |leg| fit_line(&hits.leg_points(leg, event)).unwrap_or_else(|_| Line::invalid());
            (fit(Leg::Incoming), fit(Leg::Outgoing))
        };
        let fits: Vec<(Line, Line)> = if config.parallel {
            (0..hits.n_event()).into_par_iter().map(fit_event).collect()
        } else {
            (0..hits.n_event()).map(fit_event).collect()
        };

        let degenerate = fits
            .iter()
            .filter(|(a, b)| a.direction.x.is_nan() || b.direction.x.is_nan())
            .count();
        if degenerate > 0 {
            warn!("{degenerate} events have degenerate hits on a leg and were left unfitted");
        }

        let tracking = Self::from_fits(hits, energy, &fits);
        debug!("Tracking completed");
        Ok(tracking)
    }

    fn from_fits(hits: HitArray, energy: Option<Vec<f64>>, fits: &[(Line, Line)]) -> Self {
        let n = fits.len();
        let mut tracking = Self {
            hits,
            energy,
            direction_in: Vec::with_capacity(n),
            direction_out: Vec::with_capacity(n),
            point_in: Vec::with_capacity(n),
            point_out: Vec::with_capacity(n),
            theta_in: Vec::with_capacity(n),
            phi_in: Vec::with_capacity(n),
            theta_out: Vec::with_capacity(n),
            phi_out: Vec::with_capacity(n),
            dtheta: Vec::with_capacity(n),
            dtheta_x: Vec::with_capacity(n),
            dtheta_y: Vec::with_capacity(n),
        };

        for (line_in, line_out) in fits {
            let (theta_in, phi_in) = zenith_azimuth(&line_in.direction);
            let (theta_out, phi_out) = zenith_azimuth(&line_out.direction);
            let angles = scattering_angles(&line_in.direction, &line_out.direction);

            tracking.direction_in.push(line_in.direction);
            tracking.direction_out.push(line_out.direction);
            tracking.point_in.push(line_in.point);
            tracking.point_out.push(line_out.point);
            tracking.theta_in.push(theta_in);
            tracking.phi_in.push(phi_in);
            tracking.theta_out.push(theta_out);
            tracking.phi_out.push(phi_out);
            tracking.dtheta.push(angles.dtheta);
            tracking.dtheta_x.push(angles.dtheta_x);
            tracking.dtheta_y.push(angles.dtheta_y);
        }
        tracking
    }

    /// Returns a new tracking holding only the events where `mask` is true,
    /// in their original order.
    ///
    /// # Errors
    /// Returns [`Error::LengthMismatch`] if `mask` does not have one entry
    /// per event.
    pub fn apply_mask(&self, mask: &[bool]) -> Result<Self> {
        check_len("event mask", self.n_event(), mask.len())?;
        Ok(Self {
            hits: self.hits.select(mask)?,
            energy: self.energy.as_deref().map(|e| keep(e, mask)),
            direction_in: keep(&self.direction_in, mask),
            direction_out: keep(&self.direction_out, mask),
            point_in: keep(&self.point_in, mask),
            point_out: keep(&self.point_out, mask),
            theta_in: keep(&self.theta_in, mask),
            phi_in: keep(&self.phi_in, mask),
            theta_out: keep(&self.theta_out, mask),
            phi_out: keep(&self.phi_out, mask),
            dtheta: keep(&self.dtheta, mask),
            dtheta_x: keep(&self.dtheta_x, mask),
            dtheta_y: keep(&self.dtheta_y, mask),
        })
    }

    /// Re-checks that every per-event column has one entry per event.
    ///
    /// # Errors
    /// Returns the first [`Error::Shape`] or [`Error::LengthMismatch`] found.
    pub fn validate(&self) -> Result<()> {
        self.hits.validate()?;
        let n = self.n_event();
        if let Some(energy) = &self.energy {
            check_len("energy", n, energy.len())?;
        }
        for (what, len) in [
            ("direction_in", self.direction_in.len()),
            ("direction_out", self.direction_out.len()),
            ("point_in", self.point_in.len()),
            ("point_out", self.point_out.len()),
            ("theta_in", self.theta_in.len()),
            ("phi_in", self.phi_in.len()),
            ("theta_out", self.theta_out.len()),
            ("phi_out", self.phi_out.len()),
            ("dtheta", self.dtheta.len()),
            ("dtheta_x", self.dtheta_x.len()),
            ("dtheta_y", self.dtheta_y.len()),
        ] {
            check_len(what, n, len)?;
        }
        Ok(())
    }

    /// True if both trackings hold the same events, treating NaN as equal
    /// to NaN.
    pub(crate) fn same_values(&self, other: &Self) -> bool {
        let (a, b) = (self.hits.as_array(), other.hits.as_array());
        a.dim() == b.dim()
            && a.iter().zip(b).all(|(x, y)| same_float(*x, *y))
            && match (&self.energy, &other.energy) {
                (Some(a), Some(b)) => same_floats(a, b),
                (None, None) => true,
                _ => false,
            }
            && same_points(&self.direction_in, &other.direction_in)
            && same_points(&self.direction_out, &other.direction_out)
            && same_points(&self.point_in, &other.point_in)
            && same_points(&self.point_out, &other.point_out)
            && same_floats(&self.theta_in, &other.theta_in)
            && same_floats(&self.phi_in, &other.phi_in)
            && same_floats(&self.theta_out, &other.theta_out)
            && same_floats(&self.phi_out, &other.phi_out)
            && same_floats(&self.dtheta, &other.dtheta)
            && same_floats(&self.dtheta_x, &other.dtheta_x)
            && same_floats(&self.dtheta_y, &other.dtheta_y)
    }

    /// Event count summary of the theta and dtheta distributions, optionally
    /// restricted to a mask.
    ///
    /// # Errors
    /// Returns [`Error::LengthMismatch`] for a mask of the wrong length.
    pub fn summary(&self, mask: Option<&[bool]>) -> Result<TrackingSummary> {
        if let Some(mask) = mask {
            check_len("summary mask", self.n_event(), mask.len())?;
        }
        let selected = |values: &[f64]| -> Distribution {
            match mask {
                Some(mask) => Distribution::of(
                    values.iter().zip(mask).filter(|(_, &m)| m).map(|(v, _)| v),
                ),
                None => Distribution::of(values.iter()),
            }
        };
        Ok(TrackingSummary {
            n_event: mask.map_or(self.n_event(), |m| m.iter().filter(|&&k| k).count()),
            theta_in: selected(&self.theta_in),
            theta_out: selected(&self.theta_out),
            dtheta: selected(&self.dtheta),
        })
    }

    /// Per-event values of a scalar feature, `None` for [`ScoreFeature::Energy`]
    /// when no energy was supplied.
    #[must_use]
    pub fn feature(&self, feature: ScoreFeature) -> Option<&[f64]> {
        Some(match feature {
            ScoreFeature::Dtheta => &self.dtheta,
            ScoreFeature::DthetaX => &self.dtheta_x,
            ScoreFeature::DthetaY => &self.dtheta_y,
            ScoreFeature::ThetaIn => &self.theta_in,
            ScoreFeature::ThetaOut => &self.theta_out,
            ScoreFeature::PhiIn => &self.phi_in,
            ScoreFeature::PhiOut => &self.phi_out,
            ScoreFeature::Energy => return self.energy.as_deref(),
        })
    }

    /// Number of events.
    #[must_use]
    pub fn n_event(&self) -> usize {
        self.hits.n_event()
    }

    /// Number of detection planes.
    #[must_use]
    pub fn n_plane(&self) -> usize {
        self.hits.n_plane()
    }

    /// Raw hits.
    #[must_use]
    pub fn hits(&self) -> &HitArray {
        &self.hits
    }

    /// Per-event energy, if supplied.
    #[must_use]
    pub fn energy(&self) -> Option<&[f64]> {
        self.energy.as_deref()
    }

    /// Incoming line of one event.
    #[must_use]
    pub fn line_in(&self, event: usize) -> Line {
        Line {
            point: self.point_in[event],
            direction: self.direction_in[event],
        }
    }

    /// Outgoing line of one event.
    #[must_use]
    pub fn line_out(&self, event: usize) -> Line {
        Line {
            point: self.point_out[event],
            direction: self.direction_out[event],
        }
    }

    /// Incoming track directions.
    #[must_use]
    pub fn direction_in(&self) -> &[Vec3] {
        &self.direction_in
    }

    /// Outgoing track directions.
    #[must_use]
    pub fn direction_out(&self) -> &[Vec3] {
        &self.direction_out
    }

    /// Points on the incoming tracks.
    #[must_use]
    pub fn point_in(&self) -> &[Vec3] {
        &self.point_in
    }

    /// Points on the outgoing tracks.
    #[must_use]
    pub fn point_out(&self) -> &[Vec3] {
        &self.point_out
    }

    /// Incoming zenith angles.
    #[must_use]
    pub fn theta_in(&self) -> &[f64] {
        &self.theta_in
    }

    /// Incoming azimuths.
    #[must_use]
    pub fn phi_in(&self) -> &[f64] {
        &self.phi_in
    }

    /// Outgoing zenith angles.
    #[must_use]
    pub fn theta_out(&self) -> &[f64] {
        &self.theta_out
    }

    /// Outgoing azimuths.
    #[must_use]
    pub fn phi_out(&self) -> &[f64] {
        &self.phi_out
    }

    /// 3D scattering angles.
    #[must_use]
    pub fn dtheta(&self) -> &[f64] {
        &self.dtheta
    }

    /// Scattering angles projected on the x-z plane.
    #[must_use]
    pub fn dtheta_x(&self) -> &[f64] {
        &self.dtheta_x
    }

    /// Scattering angles projected on the y-z plane.
    #[must_use]
    pub fn dtheta_y(&self) -> &[f64] {
        &self.dtheta_y
    }
}

fn keep<T: Copy>(values: &[T], mask: &[bool]) -> Vec<T> {
    values
        .iter()
        .zip(mask)
        .filter_map(|(&v, &k)| k.then_some(v))
        .collect()
}

#[allow(clippy::float_cmp)]
fn same_float(a: f64, b: f64) -> bool {
    a == b || (a.is_nan() && b.is_nan())
}

fn same_floats(a: &[f64], b: &[f64]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| same_float(*x, *y))
}

pub(crate) fn same_points(a: &[Vec3], b: &[Vec3]) -> bool {
    a.len() == b.len()
        && a
            .iter()
            .zip(b)
            .all(|(p, q)| p.iter().zip(q.iter()).all(|(x, y)| same_float(*x, *y)))
}

pub(crate) fn check_len(what: &'static str, expected: usize, found: usize) -> Result<()> {
    if expected == found {
        Ok(())
    } else {
        Err(Error::LengthMismatch {
            what,
            expected,
            found,
        })
    }
}
