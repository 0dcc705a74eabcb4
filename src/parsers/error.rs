//! Parser error types.

use std::path::PathBuf;

/// Errors that can occur while reading simulation output files.
#[derive(thiserror::Error, Debug)]
pub enum ParseError {
    /// The file does not exist yet.
    #[error("File not found: {0}")]
    NotFound(PathBuf),

    /// Permission denied reading the file.
    #[error("Permission denied: {0}")]
    PermissionDenied(PathBuf),

    /// The data ended before a complete record was read.
    #[error("Unexpected end of data at byte {offset}")]
    UnexpectedEof { offset: usize },

    /// A magic number did not match the expected value.
    #[error("Bad magic at byte {offset}: expected {expected}, found {found}")]
    BadMagic {
        offset: usize,
        expected: i32,
        found: i32,
    },

    /// The file uses a format revision this reader does not handle.
    #[error("Unsupported energy file version: {0}")]
    UnsupportedVersion(i32),

    /// A structural field held an impossible value.
    #[error("Corrupt record: {0}")]
    Corrupt(String),

    /// I/O error.
    #[error("I/O error reading {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl ParseError {
    /// Classify an I/O error raised while opening or reading `path`.
    pub(crate) fn from_io(path: &std::path::Path, source: std::io::Error) -> Self {
        match source.kind() {
            std::io::ErrorKind::NotFound => Self::NotFound(path.to_path_buf()),
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied(path.to_path_buf()),
            _ => Self::Io {
                path: path.to_path_buf(),
                source,
            },
        }
    }

    /// Whether this error is an expected state of a file that is still
    /// being created or written.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::NotFound(_)
                | Self::UnexpectedEof { .. }
                | Self::BadMagic { .. }
                | Self::Corrupt(_)
        )
    }
}
