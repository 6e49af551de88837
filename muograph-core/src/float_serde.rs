//! Serde adapters for per-event float columns that may hold NaN.
//!
//! Non-finite values are written as `null` and read back as NaN, so a
//! batch with degenerate events survives formats without NaN (JSON). Use
//! through `#[serde(with = "muograph_core::float_serde::<kind>")]`.

use crate::voxel::Vec3;
use ndarray::Array3;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// One float, `null` when not finite.
#[derive(Clone, Copy)]
struct Nullable(f64);

impl Serialize for Nullable {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if self.0.is_finite() {
            serializer.serialize_f64(self.0)
        } else {
            serializer.serialize_none()
        }
    }
}

impl<'de> Deserialize<'de> for Nullable {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(Self(Option::<f64>::deserialize(deserializer)?.unwrap_or(f64::NAN)))
    }
}

struct Floats<'a>(&'a [f64]);

impl Serialize for Floats<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.0.iter().map(|&v| Nullable(v)))
    }
}

fn from_nullable(values: Vec<Nullable>) -> Vec<f64> {
    values.into_iter().map(|v| v.0).collect()
}

/// `Vec<f64>` columns.
pub mod vec {
    use super::{from_nullable, Floats, Nullable};
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    /// Serializes `values` with non-finite entries as `null`.
    ///
    /// # Errors
    /// Propagates serializer errors.
    pub fn serialize<S: Serializer>(values: &[f64], serializer: S) -> Result<S::Ok, S::Error> {
        Floats(values).serialize(serializer)
    }

    /// Deserializes a sequence in which `null` stands for NaN.
    ///
    /// # Errors
    /// Propagates deserializer errors.
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<f64>, D::Error> {
        Ok(from_nullable(Vec::<Nullable>::deserialize(deserializer)?))
    }
}

/// `Option<Vec<f64>>` columns, such as an optional energy.
pub mod option_vec {
    use super::{from_nullable, Floats, Nullable};
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    /// Serializes the column, or `null` when absent.
    ///
    /// # Errors
    /// Propagates serializer errors.
    #[allow(clippy::ref_option)]
    pub fn serialize<S: Serializer>(
        values: &Option<Vec<f64>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        values.as_deref().map(Floats).serialize(serializer)
    }

    /// Inverse of [`serialize`].
    ///
    /// # Errors
    /// Propagates deserializer errors.
    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Vec<f64>>, D::Error> {
        Ok(Option::<Vec<Nullable>>::deserialize(deserializer)?.map(from_nullable))
    }
}

/// `Vec<Vec3>` columns, each vector stored as `[x, y, z]`.
pub mod vec3 {
    use super::{Nullable, Vec3};
    use serde::{Deserialize, Deserializer, Serializer};

    /// Serializes the vectors with non-finite components as `null`.
    ///
    /// # Errors
    /// Propagates serializer errors.
    pub fn serialize<S: Serializer>(values: &[Vec3], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(
            values
                .iter()
                .map(|v| [Nullable(v.x), Nullable(v.y), Nullable(v.z)]),
        )
    }

    /// Inverse of [`serialize`].
    ///
    /// # Errors
    /// Propagates deserializer errors.
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<Vec3>, D::Error> {
        Ok(Vec::<[Nullable; 3]>::deserialize(deserializer)?
            .into_iter()
            .map(|[x, y, z]| Vec3::new(x.0, y.0, z.0))
            .collect())
    }
}

/// Dense `Array3<f64>`, stored as `[shape, row-major values]`.
pub mod array3 {
    use super::{from_nullable, Array3, Floats, Nullable};
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    /// Serializes the shape and the values in logical order.
    ///
    /// # Errors
    /// Propagates serializer errors.
    pub fn serialize<S: Serializer>(array: &Array3<f64>, serializer: S) -> Result<S::Ok, S::Error> {
        let values: Vec<f64> = array.iter().copied().collect();
        (array.dim(), Floats(&values)).serialize(serializer)
    }

    /// Inverse of [`serialize`].
    ///
    /// # Errors
    /// Fails if the value count does not match the shape.
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Array3<f64>, D::Error> {
        let (dim, values) =
            <((usize, usize, usize), Vec<Nullable>)>::deserialize(deserializer)?;
        Array3::from_shape_vec(dim, from_nullable(values)).map_err(D::Error::custom)
    }
}

#[cfg(test)]
#[allow(clippy::float_cmp)]
mod tests {
    use super::*;

    #[derive(Debug, Serialize, Deserialize)]
    struct Columns {
        #[serde(with = "vec")]
        values: Vec<f64>,
        #[serde(with = "option_vec")]
        energy: Option<Vec<f64>>,
        #[serde(with = "vec3")]
        points: Vec<Vec3>,
        #[serde(with = "array3")]
        grid: Array3<f64>,
    }

    #[test]
    fn test_non_finite_round_trip() {
        let columns = Columns {
            values: vec![1.5, f64::NAN, f64::INFINITY],
            energy: None,
            points: vec![Vec3::new(1.0, 2.0, 3.0), Vec3::repeat(f64::NAN)],
            grid: Array3::from_shape_fn((3, 2, 2), |(a, p, e)| {
                if (a, p, e) == (2, 1, 0) {
                    f64::NAN
                } else {
                    (a * 4 + p * 2 + e) as f64
                }
            }),
        };
        let json = serde_json::to_string(&columns).unwrap();
        assert!(json.contains("[1.5,null,null]"));
        assert!(json.contains("\"energy\":null"));

        let loaded: Columns = serde_json::from_str(&json).unwrap();
        assert_eq!(loaded.values[0], 1.5);
        assert!(loaded.values[1].is_nan() && loaded.values[2].is_nan());
        assert_eq!(loaded.energy, None);
        assert_eq!(loaded.points[0], Vec3::new(1.0, 2.0, 3.0));
        assert!(loaded.points[1].iter().all(|c| c.is_nan()));
        assert_eq!(loaded.grid.dim(), (3, 2, 2));
        assert_eq!(loaded.grid[[1, 1, 1]], 7.0);
        assert!(loaded.grid[[2, 1, 0]].is_nan());
    }

    #[test]
    fn test_array_shape_is_checked() {
        let err = serde_json::from_str::<Columns>(
            r#"{"values":[],"energy":[2.0],"points":[],"grid":[[1,1,2],[1.0]]}"#,
        );
        assert!(err.is_err());
    }
}
