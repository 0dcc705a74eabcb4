//! PLUMED COLVAR reader.
//!
//! ```text
//! #! FIELDS time phi psi
//! #! SET min_phi -pi
//! 0.000 -1.234 2.345
//! 0.002 -1.250 2.300
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use super::error::ParseError;

/// Marker that opens a header line.
pub const FIELDS_MARKER: &str = "#! FIELDS";

/// One parsed data row.
#[derive(Debug, Clone, PartialEq)]
pub struct ColvarRow {
    /// Zero-based position of the row among all data lines of the file.
    pub line: usize,
    pub values: BTreeMap<String, f64>,
}

impl ColvarRow {
    /// Value of a named field.
    #[must_use]
    pub fn get(&self, field: &str) -> Option<f64> {
        self.values.get(field).copied()
    }
}

/// Rows found after a cursor, plus the cursor to resume from.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ColvarChunk {
    pub rows: Vec<ColvarRow>,
    /// Number of complete data lines in the file, never less than the
    /// requested skip.
    pub consumed: usize,
}

/// Parse COLVAR text, skipping the first `skip` data lines.
///
/// Data lines count toward the cursor whether or not they parse. A last
/// line without a trailing newline is still being written and is left
/// for the next call.
#[must_use]
pub fn parse_colvar(text: &str, skip: usize) -> ColvarChunk {
    let complete = match text.rfind('\n') {
        Some(end) => &text[..=end],
        None => "",
    };

    let mut headers: Option<Vec<String>> = None;
    let mut rows = Vec::new();
    let mut data_lines = 0usize;

    for raw in complete.lines() {
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }
        if let Some(fields) = line.strip_prefix(FIELDS_MARKER) {
            headers = Some(fields.split_whitespace().map(String::from).collect());
            continue;
        }
        if line.starts_with('#') {
            continue;
        }

        let index = data_lines;
        data_lines += 1;
        if index < skip {
            continue;
        }
        let Some(names) = headers.as_ref() else {
            continue;
        };
        if let Some(values) = parse_row(line, names) {
            rows.push(ColvarRow {
                line: index,
                values,
            });
        }
    }

    ColvarChunk {
        rows,
        consumed: data_lines.max(skip),
    }
}

fn parse_row(line: &str, names: &[String]) -> Option<BTreeMap<String, f64>> {
    let values: Vec<f64> = line
        .split_whitespace()
        .map(str::parse::<f64>)
        .collect::<Result<_, _>>()
        .ok()?;
    if values.len() != names.len() {
        return None;
    }
    Some(names.iter().cloned().zip(values).collect())
}

/// Read a COLVAR file, skipping the first `skip` data lines.
///
/// A missing file yields an empty chunk at `skip`.
///
/// # Errors
///
/// Returns an error if the file exists but cannot be read.
pub fn read_colvar(path: &Path, skip: usize) -> Result<ColvarChunk, ParseError> {
    match std::fs::read(path) {
        Ok(bytes) => Ok(parse_colvar(&String::from_utf8_lossy(&bytes), skip)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(ColvarChunk {
            rows: Vec::new(),
            consumed: skip,
        }),
        Err(e) => Err(ParseError::from_io(path, e)),
    }
}
