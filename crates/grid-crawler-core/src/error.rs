use std::path::PathBuf;
use thiserror::Error;

use crate::types::Axis;

pub type Result<T> = core::result::Result<T, Error>;

/// Custom error types for the grid-crawler library
#[derive(Error, Debug)]
pub enum Error {
    /// I/O operation error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed JSON (dataset descriptors, configuration, stored shapes)
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Source file could not be turned into a dataset
    #[error("Extraction error: {0}")]
    Extraction(String),

    /// Zero or several dimension coordinates found along an axis
    #[error("Ambiguous grid: found {found} dimension coordinates along the {axis} axis")]
    AmbiguousGrid { axis: Axis, found: usize },

    /// A coordinate array with a zero-length axis
    #[error("Cannot hash an empty array (shape {0:?})")]
    EmptyArray(Vec<usize>),

    /// Perceptual hash requested for an array that is neither 1-D nor 2-D
    #[error("Unsupported array rank {0}: perceptual hashing needs a 1-D or 2-D array")]
    UnsupportedRank(usize),

    /// Low-frequency block does not fit in 64 bits
    #[error("Perceptual hash needs {coefficients} coefficients, at most 64 fit in a hash")]
    ArrayTooLarge { coefficients: usize },

    /// Uniqueness violation that could not be resolved by a re-lookup
    #[error("Duplicate key race on {0}")]
    DuplicateKeyRace(String),

    /// Catalog store failure
    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    /// Stored record that cannot be decoded
    #[error("Corrupt catalog record: {0}")]
    Corrupt(String),

    /// Failure while registering a single source file
    #[error("Failed to ingest {}: {source}", path.display())]
    Ingest {
        path: PathBuf,
        #[source]
        source: Box<Error>,
    },

    /// File not found error
    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    /// Invalid configuration error
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    #[error("Operation interrupted")]
    Interrupted,
}

impl Error {
    /// Wrap a per-file failure with the path that caused it
    pub fn ingest(path: impl Into<PathBuf>, source: Error) -> Self {
        match source {
            // Already carries a path
            Error::Ingest { .. } => source,
            other => Error::Ingest {
                path: path.into(),
                source: Box::new(other),
            },
        }
    }

    /// Contract violations indicate a bug rather than bad input data and must
    /// not be skipped over by a crawl.
    pub fn is_fatal(&self) -> bool {
        match self {
            Error::UnsupportedRank(_) | Error::ArrayTooLarge { .. } | Error::Configuration(_) => {
                true
            }
            Error::Ingest { source, .. } => source.is_fatal(),
            _ => false,
        }
    }

    /// True for a store-level uniqueness violation
    pub(crate) fn is_unique_violation(err: &rusqlite::Error) -> bool {
        matches!(
            err,
            rusqlite::Error::SqliteFailure(e, _)
                if e.code == rusqlite::ErrorCode::ConstraintViolation
        )
    }
}
