//! JSON persistence of reconstruction state.

use crate::{Error, Result};
use log::info;
use muograph_algorithms::{Poca, Tracking};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::{File, OpenOptions};
use std::io::{BufReader, BufWriter, ErrorKind, Write};
use std::path::Path;

/// Serializes `value` as JSON into a new file.
///
/// The per-event columns of [`Tracking`] and [`Poca`] write non-finite
/// values as `null`, which load back as NaN.
///
/// # Errors
///
/// Returns `AlreadyExists` if `path` exists; it is never overwritten.
pub fn save_json<T: Serialize, P: AsRef<Path>>(value: &T, path: P) -> Result<()> {
    let path = path.as_ref();
    let file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .map_err(|e| match e.kind() {
            ErrorKind::AlreadyExists => Error::AlreadyExists(path.to_path_buf()),
            _ => Error::Io(e),
        })?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer(&mut writer, value)?;
    writer.flush()?;
    info!("Saved {}", path.display());
    Ok(())
}

/// Deserializes a JSON file.
///
/// # Errors
///
/// Returns an error if the file cannot be opened or decoded.
pub fn load_json<T: DeserializeOwned, P: AsRef<Path>>(path: P) -> Result<T> {
    let reader = BufReader::new(File::open(path)?);
    Ok(serde_json::from_reader(reader)?)
}

/// Loads a saved [`Tracking`] and checks that its arrays are aligned.
///
/// # Errors
///
/// Returns an error if decoding fails or the loaded tracking is inconsistent.
pub fn load_tracking<P: AsRef<Path>>(path: P) -> Result<Tracking> {
    let tracking: Tracking = load_json(path.as_ref())?;
    tracking.validate()?;
    info!(
        "Loaded tracking of {} events from {}",
        tracking.n_event(),
        path.as_ref().display()
    );
    Ok(tracking)
}

/// Loads a saved [`Poca`] and checks it against its own inputs.
///
/// # Errors
///
/// Returns an error if decoding fails or the loaded reconstruction is
/// inconsistent (see [`Poca::validate`]).
pub fn load_poca<P: AsRef<Path>>(path: P) -> Result<Poca> {
    let poca: Poca = load_json(path.as_ref())?;
    poca.validate()?;
    info!(
        "Loaded {} POCA points from {}",
        poca.poca_points().len(),
        path.as_ref().display()
    );
    Ok(poca)
}
