//! Detector hit storage.
//!
//! Hits are kept as a dense `(3, n_plane, n_event)` array: axis 0 is the
//! spatial coordinate (x, y, z), axis 1 the detection plane ordered along
//! the muon path, axis 2 the event. The first half of the planes measure
//! the incoming leg, the second half the outgoing leg.

use crate::error::{Error, Result};
use crate::voxel::Vec3;
use ndarray::{Array2, Array3, ArrayView2, Axis};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Half of the plane stack a hit belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Leg {
    /// Planes above the volume (first half).
    Incoming,
    /// Planes below the volume (second half).
    Outgoing,
}

/// Validated hit array with shape `(3, n_plane, n_event)`.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct HitArray {
    #[cfg_attr(feature = "serde", serde(with = "crate::float_serde::array3"))]
    data: Array3<f64>,
}

impl HitArray {
    /// Wraps a `(3, n_plane, n_event)` array after checking its shape.
    ///
    /// # Errors
    /// Returns [`Error::Shape`] if axis 0 is not 3 or the plane count is
    /// zero or odd.
    pub fn new(data: Array3<f64>) -> Result<Self> {
        let hits = Self { data };
        hits.validate()?;
        Ok(hits)
    }

    /// Builds a hit array from per-axis `(n_plane, n_event)` arrays.
    ///
    /// # Errors
    /// Returns [`Error::Shape`] if the three arrays disagree in shape or the
    /// resulting plane count is invalid.
    pub fn from_planes<'a>(
        x: ArrayView2<'a, f64>,
        y: ArrayView2<'a, f64>,
        z: ArrayView2<'a, f64>,
    ) -> Result<Self> {
        if x.dim() != y.dim() || x.dim() != z.dim() {
            return Err(Error::Shape(format!(
                "x, y and z hit arrays must share a shape, got {:?}, {:?}, {:?}",
                x.dim(),
                y.dim(),
                z.dim()
            )));
        }
        let data = ndarray::stack(Axis(0), &[x, y, z])
            .map_err(|e| Error::Shape(e.to_string()))?;
        Self::new(data)
    }

    /// Checks the shape invariants.
    ///
    /// # Errors
    /// Returns [`Error::Shape`] on a malformed array.
    pub fn validate(&self) -> Result<()> {
        let (n_axis, n_plane, _) = self.data.dim();
        if n_axis != 3 {
            return Err(Error::Shape(format!(
                "hit array must have 3 spatial axes, found {n_axis}"
            )));
        }
        if n_plane == 0 || n_plane % 2 != 0 {
            return Err(Error::Shape(format!(
                "plane count must be even and at least 2, found {n_plane}"
            )));
        }
        Ok(())
    }

    /// Number of detection planes.
    #[must_use]
    pub fn n_plane(&self) -> usize {
        self.data.dim().1
    }

    /// Number of events.
    #[must_use]
    pub fn n_event(&self) -> usize {
        self.data.dim().2
    }

    /// Number of planes measuring each leg.
    #[must_use]
    pub fn planes_per_leg(&self) -> usize {
        self.n_plane() / 2
    }

    /// Returns true if there are no events.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.n_event() == 0
    }

    /// Raw `(3, n_plane, n_event)` view.
    #[must_use]
    pub fn as_array(&self) -> &Array3<f64> {
        &self.data
    }

    /// Hit coordinates on one plane for one event.
    #[must_use]
    pub fn hit(&self, plane: usize, event: usize) -> Vec3 {
        Vec3::new(
            self.data[[0, plane, event]],
            self.data[[1, plane, event]],
            self.data[[2, plane, event]],
        )
    }

    /// Hits of one leg of one event, in plane order.
    #[must_use]
    pub fn leg_points(&self, leg: Leg, event: usize) -> Vec<Vec3> {
        let half = self.planes_per_leg();
        let planes = match leg {
            Leg::Incoming => 0..half,
            Leg::Outgoing => half..self.n_plane(),
        };
        planes.map(|plane| self.hit(plane, event)).collect()
    }

    /// Per-axis `(n_plane, n_event)` view (0 = x, 1 = y, 2 = z).
    #[must_use]
    pub fn axis(&self, axis: usize) -> ArrayView2<'_, f64> {
        self.data.index_axis(Axis(0), axis)
    }

    /// Keeps the events whose mask entry is true, in original order.
    ///
    /// # Errors
    /// Returns [`Error::LengthMismatch`] if the mask length differs from
    /// the event count.
    pub fn select(&self, mask: &[bool]) -> Result<Self> {
        if mask.len() != self.n_event() {
            return Err(Error::LengthMismatch {
                what: "hit mask",
                expected: self.n_event(),
                found: mask.len(),
            });
        }
        let kept: Vec<usize> = mask
            .iter()
            .enumerate()
            .filter_map(|(i, &keep)| keep.then_some(i))
            .collect();
        Ok(Self {
            data: self.data.select(Axis(2), &kept),
        })
    }

    /// Builds an array of `n_event` events from a per-event plane list.
    ///
    /// Each inner slice holds one hit per plane.
    ///
    /// # Errors
    /// Returns [`Error::Shape`] if events disagree on the plane count.
    pub fn from_events(events: &[Vec<Vec3>]) -> Result<Self> {
        let n_plane = events.first().map_or(0, Vec::len);
        let mut planes = [
            Array2::<f64>::zeros((n_plane, events.len())),
            Array2::<f64>::zeros((n_plane, events.len())),
            Array2::<f64>::zeros((n_plane, events.len())),
        ];
        for (event, hits) in events.iter().enumerate() {
            if hits.len() != n_plane {
                return Err(Error::Shape(format!(
                    "event {event} has {} hits, expected {n_plane}",
                    hits.len()
                )));
            }
            for (plane, hit) in hits.iter().enumerate() {
                for (axis, values) in planes.iter_mut().enumerate() {
                    values[[plane, event]] = hit[axis];
                }
            }
        }
        let [x, y, z] = planes;
        Self::from_planes(x.view(), y.view(), z.view())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_events() -> HitArray {
        HitArray::from_events(&[
            vec![
                Vec3::new(0.0, 0.0, 30.0),
                Vec3::new(0.0, 0.0, 20.0),
                Vec3::new(0.0, 0.0, -20.0),
                Vec3::new(0.0, 0.0, -30.0),
            ],
            vec![
                Vec3::new(1.0, 2.0, 30.0),
                Vec3::new(1.0, 2.0, 20.0),
                Vec3::new(1.0, 2.0, -20.0),
                Vec3::new(1.0, 2.0, -30.0),
            ],
        ])
        .unwrap()
    }

    #[test]
    fn test_hit_array_layout() {
        let hits = two_events();
        assert_eq!(hits.n_plane(), 4);
        assert_eq!(hits.n_event(), 2);
        assert_eq!(hits.planes_per_leg(), 2);
        assert_eq!(hits.hit(1, 1), Vec3::new(1.0, 2.0, 20.0));

        let outgoing = hits.leg_points(Leg::Outgoing, 1);
        assert_eq!(outgoing.len(), 2);
        assert_eq!(outgoing[0], Vec3::new(1.0, 2.0, -20.0));
        assert_eq!(outgoing[1], Vec3::new(1.0, 2.0, -30.0));
    }

    #[test]
    fn test_shape_validation() {
        assert!(matches!(
            HitArray::new(Array3::zeros((2, 4, 5))),
            Err(Error::Shape(_))
        ));
        assert!(matches!(
            HitArray::new(Array3::zeros((3, 3, 5))),
            Err(Error::Shape(_))
        ));
        assert!(matches!(
            HitArray::new(Array3::zeros((3, 0, 5))),
            Err(Error::Shape(_))
        ));
        assert!(HitArray::new(Array3::zeros((3, 2, 0))).is_ok());

        let x = Array2::<f64>::zeros((4, 3));
        let y = Array2::<f64>::zeros((4, 2));
        assert!(matches!(
            HitArray::from_planes(x.view(), y.view(), x.view()),
            Err(Error::Shape(_))
        ));
    }

    #[test]
    fn test_from_planes_stacks_axes() {
        let x = Array2::from_shape_fn((2, 3), |(p, e)| (p * 3 + e) as f64);
        let y = x.mapv(|v| v + 100.0);
        let z = x.mapv(|v| -v);
        let hits = HitArray::from_planes(x.view(), y.view(), z.view()).unwrap();
        assert_eq!(hits.n_plane(), 2);
        assert_eq!(hits.n_event(), 3);
        assert_eq!(hits.hit(1, 2), Vec3::new(5.0, 105.0, -5.0));
        assert_eq!(hits.axis(1), y.view());
    }

    #[test]
    fn test_select_keeps_order() {
        let hits = two_events();
        let selected = hits.select(&[false, true]).unwrap();
        assert_eq!(selected.n_event(), 1);
        assert_eq!(selected.hit(0, 0), Vec3::new(1.0, 2.0, 30.0));

        assert!(matches!(
            hits.select(&[true]),
            Err(Error::LengthMismatch { expected: 2, found: 1, .. })
        ));
    }
}
