//! Preparation of a source file for registration.
//!
//! Everything here is pure CPU work with no catalog access, so it can run on
//! worker threads ahead of the (sequential) catalog writes.
use std::path::Path;

use crate::error::{Error, Result};
use crate::processing::{fingerprint_grid, GridFingerprint, PHashParams};
use crate::types::{GridSource, TRACKING_ID};

/// Natural key of a file record
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FileIdentity {
    pub filename: String,
    pub tracking_id: String,
}

impl FileIdentity {
    /// Base name of `path` plus the dataset's tracking identifier
    pub fn of<S: GridSource + ?Sized>(path: &Path, source: &S) -> Result<Self> {
        let filename = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .ok_or_else(|| Error::Extraction(format!("no file name in '{}'", path.display())))?;
        let tracking_id = source
            .attribute(TRACKING_ID)
            .ok_or_else(|| Error::Extraction(format!("missing '{}' attribute", TRACKING_ID)))?
            .to_string();

        Ok(Self {
            filename,
            tracking_id,
        })
    }
}

/// A file ready to be written to the catalog
#[derive(Debug, Clone)]
pub struct PreparedFile<'a> {
    pub identity: FileIdentity,
    pub grid: GridFingerprint<'a>,
}

/// Fingerprint the grid of a file, failures carry the file's path
pub fn prepare_file<'a, S>(
    path: &Path,
    source: &'a S,
    params: PHashParams,
) -> Result<PreparedFile<'a>>
where
    S: GridSource + ?Sized,
{
    let identity = FileIdentity::of(path, source).map_err(|e| Error::ingest(path, e))?;
    let grid = fingerprint_grid(source, params).map_err(|e| Error::ingest(path, e))?;
    Ok(PreparedFile { identity, grid })
}
