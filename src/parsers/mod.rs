//! Readers for GROMACS and PLUMED output files.
//!
//! Every reader is a pure function of the file contents and a cursor, so
//! it is safe to call repeatedly while the engine keeps appending.

use std::path::Path;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

pub mod colvar;
pub mod edr;
mod error;
pub mod hills;
pub mod progress;
mod xdr;

pub use colvar::{parse_colvar, read_colvar, ColvarChunk, ColvarRow};
pub use edr::{energy_since, read_energy_file, EnergyFile, EnergyFrame, EnergySeries, EnergyTerm};
pub use error::ParseError;
pub use hills::count_hills;
pub use progress::{parse_progress, Progress};
pub use xdr::Precision;

/// Modification time and length of a file at one observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileStamp {
    pub modified: SystemTime,
    pub len: u64,
}

/// Observe a file's stamp, or `None` if it cannot be stat'ed.
#[must_use]
pub fn file_stamp(path: &Path) -> Option<FileStamp> {
    let metadata = std::fs::metadata(path).ok()?;
    Some(FileStamp {
        modified: metadata.modified().ok()?,
        len: metadata.len(),
    })
}
