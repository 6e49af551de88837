//! Detector hits in CSV form.
//!
//! One row per event. Plane `k` is stored in columns `X<k>`, `Y<k>` and
//! `Z<k>`; an optional `E` column carries the muon energy. Other columns are
//! ignored.

use crate::{Error, Result};
use csv::{ReaderBuilder, StringRecord, Trim};
use log::{debug, info};
use muograph_core::HitArray;
use ndarray::Array3;
use std::path::Path;

/// Hits and optional per-event energies read from a CSV file.
#[derive(Debug, Clone, PartialEq)]
pub struct HitFile {
    /// Hit coordinates, `(3, n_plane, n_event)`.
    pub hits: HitArray,
    /// Muon energy per event, when the file has an `E` column.
    pub energy: Option<Vec<f64>>,
}

struct Columns {
    // indexed by [axis][plane]
    planes: [Vec<usize>; 3],
    energy: Option<usize>,
}

impl Columns {
    fn locate(headers: &StringRecord) -> Result<Self> {
        let n_plane = headers.iter().filter(|h| is_plane_column(h, 'X')).count();
        if n_plane == 0 {
            return Err(Error::InvalidFormat("no X<k> hit columns".into()));
        }

        let find = |name: &str| headers.iter().position(|h| h == name);
        let mut planes: [Vec<usize>; 3] = Default::default();
        for (axis, columns) in ['X', 'Y', 'Z'].into_iter().zip(planes.iter_mut()) {
            for plane in 0..n_plane {
                let name = format!("{axis}{plane}");
                let column =
                    find(&name).ok_or_else(|| Error::InvalidFormat(format!("missing column {name}")))?;
                columns.push(column);
            }
        }

        Ok(Self {
            planes,
            energy: find("E"),
        })
    }

    fn n_plane(&self) -> usize {
        self.planes[0].len()
    }
}

fn is_plane_column(header: &str, axis: char) -> bool {
    header
        .strip_prefix(axis)
        .is_some_and(|rest| !rest.is_empty() && rest.bytes().all(|b| b.is_ascii_digit()))
}

fn field(record: &StringRecord, column: usize, row: usize) -> Result<f64> {
    let raw = record.get(column).unwrap_or_default();
    raw.parse()
        .map_err(|_| Error::InvalidFormat(format!("row {row}: cannot parse {raw:?} as a number")))
}

/// Reads detector hits from a CSV file.
///
/// The number of planes is the number of `X<k>` columns; every plane must
/// also have its `Y<k>` and `Z<k>` columns.
///
/// # Errors
///
/// Returns `InvalidFormat` for missing columns or unparsable values, and
/// a core error when the resulting hit array has an invalid shape.
pub fn read_hits_csv<P: AsRef<Path>>(path: P) -> Result<HitFile> {
    let path = path.as_ref();
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .trim(Trim::All)
        .from_path(path)?;
    let columns = Columns::locate(reader.headers()?)?;
    let n_plane = columns.n_plane();

    // per event, coordinates in (axis, plane) order
    let mut events: Vec<Vec<f64>> = Vec::new();
    let mut energy = columns.energy.map(|_| Vec::new());
    for (row, record) in reader.records().enumerate() {
        let record = record?;
        let mut coords = Vec::with_capacity(3 * n_plane);
        for axis in &columns.planes {
            for &column in axis {
                coords.push(field(&record, column, row + 1)?);
            }
        }
        events.push(coords);
        if let (Some(column), Some(energy)) = (columns.energy, energy.as_mut()) {
            energy.push(field(&record, column, row + 1)?);
        }
    }

    let data = Array3::from_shape_fn((3, n_plane, events.len()), |(axis, plane, event)| {
        events[event][axis * n_plane + plane]
    });
    let hits = HitArray::new(data)?;
    info!(
        "Read {} events on {} planes from {}",
        hits.n_event(),
        n_plane,
        path.display()
    );
    Ok(HitFile { hits, energy })
}

/// Writes detector hits, and energies when given, as CSV.
///
/// # Errors
///
/// Returns an error if `energy` is not aligned with the events or the file
/// cannot be written.
pub fn write_hits_csv<P: AsRef<Path>>(
    path: P,
    hits: &HitArray,
    energy: Option<&[f64]>,
) -> Result<()> {
    if let Some(energy) = energy {
        if energy.len() != hits.n_event() {
            return Err(muograph_core::Error::LengthMismatch {
                what: "energy",
                expected: hits.n_event(),
                found: energy.len(),
            }
            .into());
        }
    }

    let n_plane = hits.n_plane();
    let mut header = Vec::with_capacity(3 * n_plane + 1);
    for plane in 0..n_plane {
        for axis in ['X', 'Y', 'Z'] {
            header.push(format!("{axis}{plane}"));
        }
    }
    if energy.is_some() {
        header.push("E".to_string());
    }

    let mut writer = csv::Writer::from_path(path.as_ref())?;
    writer.write_record(&header)?;
    let data = hits.as_array();
    let mut record = Vec::with_capacity(header.len());
    for event in 0..hits.n_event() {
        record.clear();
        for plane in 0..n_plane {
            for axis in 0..3 {
                record.push(data[[axis, plane, event]].to_string());
            }
        }
        if let Some(energy) = energy {
            record.push(energy[event].to_string());
        }
        writer.write_record(&record)?;
    }
    writer.flush()?;
    debug!("Wrote {} events to {}", hits.n_event(), path.as_ref().display());
    Ok(())
}
