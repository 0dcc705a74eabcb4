//! PLUMED HILLS deposition log.

use std::path::Path;

use super::error::ParseError;

/// Count deposited hills in HILLS text (non-blank, non-comment lines).
#[must_use]
pub fn count_hills_in(text: &str) -> usize {
    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .count()
}

/// Count deposited hills in a HILLS file. A missing file counts zero.
///
/// # Errors
///
/// Returns an error if the file exists but cannot be read.
pub fn count_hills(path: &Path) -> Result<usize, ParseError> {
    match std::fs::read(path) {
        Ok(bytes) => Ok(count_hills_in(&String::from_utf8_lossy(&bytes))),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(0),
        Err(e) => Err(ParseError::from_io(path, e)),
    }
}
