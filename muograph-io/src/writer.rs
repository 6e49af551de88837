//! CSV writers for reconstruction outputs.

use crate::Result;
use log::debug;
use muograph_algorithms::VoxelMap;
use muograph_core::{Vec3, VoxelGrid};
use std::path::Path;

/// Writes POCA points as `x,y,z` rows.
///
/// # Errors
///
/// Returns an error if the file cannot be written.
pub fn write_poca_points_csv<P: AsRef<Path>>(path: P, points: &[Vec3]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path.as_ref())?;
    writer.write_record(["x", "y", "z"])?;
    for p in points {
        writer.write_record(&[p.x.to_string(), p.y.to_string(), p.z.to_string()])?;
    }
    writer.flush()?;
    debug!("Wrote {} POCA points to {}", points.len(), path.as_ref().display());
    Ok(())
}

/// Writes one row per voxel: `ix,iy,iz,x,y,z,score,hits`.
///
/// Rows follow x-major voxel order; `x,y,z` is the voxel centre.
///
/// # Errors
///
/// Returns a core shape error if `map` does not match the grid, or an I/O
/// error if the file cannot be written.
pub fn write_voxel_map_csv<P: AsRef<Path>>(
    path: P,
    voi: &VoxelGrid,
    map: &VoxelMap,
) -> Result<()> {
    if map.scores.dim() != voi.shape() || map.hits.dim() != voi.shape() {
        return Err(muograph_core::Error::Shape(format!(
            "voxel map of shape {:?} does not match grid {:?}",
            map.scores.dim(),
            voi.shape()
        ))
        .into());
    }

    let mut writer = csv::Writer::from_path(path.as_ref())?;
    writer.write_record(["ix", "iy", "iz", "x", "y", "z", "score", "hits"])?;
    for (linear, center) in voi.centers().iter().enumerate() {
        let index = voi.voxel_index(linear);
        let Some([ix, iy, iz]) = index.as_usize() else {
            continue;
        };
        writer.write_record(&[
            ix.to_string(),
            iy.to_string(),
            iz.to_string(),
            center.x.to_string(),
            center.y.to_string(),
            center.z.to_string(),
            map.scores[[ix, iy, iz]].to_string(),
            map.hits[[ix, iy, iz]].to_string(),
        ])?;
    }
    writer.flush()?;
    debug!("Wrote {} voxels to {}", voi.len(), path.as_ref().display());
    Ok(())
}
