use ndarray::{ArrayD, IxDyn};

use crate::error::{Error, Result};
use crate::processing::ExactHash;

/// Reference to a stored coordinate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CoordinateRef(pub i64);

/// Reference to a stored grid
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GridRef(pub i64);

/// Reference to a stored file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FileRef(pub i64);

/// Representation of a registered source file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
    /// ID in the database
    pub id: FileRef,

    /// Base name of the source file
    pub filename: String,

    /// Unique identifier from the file's global attributes
    pub tracking_id: String,

    /// Grid shared with every file on the same coordinates
    pub grid: GridRef,
}

/// Outcome of registering a file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Registration {
    /// The file was already in the catalog and nothing was written
    Existing(FileRecord),

    /// A new file record was inserted
    Created(FileRecord),
}

impl Registration {
    pub fn record(&self) -> &FileRecord {
        match self {
            Registration::Existing(record) | Registration::Created(record) => record,
        }
    }

    pub fn file_ref(&self) -> FileRef {
        self.record().id
    }

    pub fn grid(&self) -> GridRef {
        self.record().grid
    }

    pub fn is_new(&self) -> bool {
        matches!(self, Registration::Created(_))
    }
}

/// A coordinate as persisted in the catalog
#[derive(Debug, Clone, PartialEq)]
pub struct StoredCoordinate {
    pub id: CoordinateRef,
    pub points: ArrayD<f64>,
    pub points_exact_hash: ExactHash,
    pub points_perceptual_hash: u64,
    pub bounds: Option<ArrayD<f64>>,
    pub bounds_exact_hash: Option<ExactHash>,
    pub bounds_lower_perceptual_hash: Option<u64>,
    pub bounds_upper_perceptual_hash: Option<u64>,
}

/// A grid together with its coordinates and the number of files using it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GridSummary {
    pub grid: GridRef,
    pub coordinates: Vec<CoordinateRef>,
    pub files: usize,
}

/// Row counts of the catalog tables
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CatalogStats {
    pub coordinates: usize,
    pub grids: usize,
    pub files: usize,
}

// Perceptual hashes are stored bit-cast into signed INTEGER columns
pub(crate) fn phash_to_i64(value: u64) -> i64 {
    value as i64
}

pub(crate) fn phash_from_i64(value: i64) -> u64 {
    value as u64
}

/// Rebuild an array from its stored bytes and JSON encoded shape
pub(crate) fn decode_array(bytes: &[u8], shape: &str) -> Result<ArrayD<f64>> {
    let shape: Vec<usize> = serde_json::from_str(shape)
        .map_err(|e| Error::Corrupt(format!("array shape '{}': {}", shape, e)))?;
    if bytes.len() % 8 != 0 {
        return Err(Error::Corrupt(format!(
            "array of {} bytes is not a whole number of f64 values",
            bytes.len()
        )));
    }
    let values: Vec<f64> = bytes
        .chunks_exact(8)
        .map(|chunk| {
            let mut raw = [0u8; 8];
            raw.copy_from_slice(chunk);
            f64::from_le_bytes(raw)
        })
        .collect();
    ArrayD::from_shape_vec(IxDyn(&shape), values)
        .map_err(|e| Error::Corrupt(format!("array shape {:?}: {}", shape, e)))
}

/// JSON encoding of an array shape
pub(crate) fn encode_shape(array: &ArrayD<f64>) -> Result<String> {
    Ok(serde_json::to_string(array.shape())?)
}
