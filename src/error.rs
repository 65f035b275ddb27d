//! Error types for ICS reading and writing.

use std::path::PathBuf;

use thiserror::Error;

/// All errors that can occur when working with ICS files.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error from the underlying reader/writer.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The file could not be opened under any of the names tried.
    #[error("Couldn't open ICS file '{}': {source}", path.display())]
    FileOpen {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Header fields are missing or unparseable.
    #[error("Couldn't read ICS file: {0}")]
    HeaderParse(String),

    /// The sample representation has no counterpart in [`DataType`](crate::DataType).
    #[error("Unsupported sample type: {0}")]
    UnsupportedSampleType(String),

    /// An array argument has a length inconsistent with the image dimensionality.
    #[error("Array sizes don't match: expected {expected}, found {found}")]
    ArraySizeMismatch { expected: usize, found: usize },

    /// A write option string was not recognized.
    #[error("Invalid option: {0}")]
    InvalidOption(String),

    /// A region bound lies outside the axis.
    #[error("Index {index} out of range for axis of size {size}")]
    IndexOutOfRange { index: isize, size: usize },

    /// Tensor shape descriptor is invalid.
    #[error("Invalid tensor shape: {0}")]
    InvalidTensorShape(String),

    /// Unit string could not be parsed.
    #[error("Invalid units: '{0}'")]
    InvalidUnits(String),

    /// A history line exceeds the header line length.
    #[error("History line too long ({length} bytes, limit {limit})")]
    HistoryLineTooLong { length: usize, limit: usize },

    /// A history line contains characters that cannot be stored.
    #[error("History line contains illegal characters")]
    HistoryLineIllegal,

    /// Image data is missing or does not match its declared layout.
    #[error("Invalid image: {0}")]
    InvalidImage(String),

    /// The data stream ended before the requested samples were read.
    #[error("Unexpected end of pixel data")]
    UnexpectedEof,

    /// An invariant of the transfer engine was violated.
    #[error("Internal consistency error: {0}")]
    InternalConsistency(String),
}

pub type Result<T> = std::result::Result<T, Error>;
