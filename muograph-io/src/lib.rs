//! muograph-io: File I/O for muograph.
//!
//! This crate reads detector hits from CSV, exports reconstruction
//! outputs as CSV and persists tracking and POCA results as JSON.
//!

mod error;
mod hits;
mod persist;
mod writer;

pub use error::{Error, Result};
pub use hits::{read_hits_csv, write_hits_csv, HitFile};
pub use persist::{load_json, load_poca, load_tracking, save_json};
pub use writer::{write_poca_points_csv, write_voxel_map_csv};
