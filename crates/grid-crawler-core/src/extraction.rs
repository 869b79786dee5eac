//! Turning source files into datasets.
//!
//! `DatasetReader` is the seam for file formats. The built-in reader parses a
//! JSON descriptor listing the coordinates of a dataset:
//!
//! ```json
//! {
//!   "attributes": { "tracking_id": "hdl:21.14100/..." },
//!   "coordinates": [
//!     { "name": "latitude", "axes": ["y"], "dimension": true,
//!       "points": { "shape": [180], "data": [-89.5, ...] },
//!       "bounds": { "shape": [180, 2], "data": [-90.0, -89.0, ...] } }
//!   ]
//! }
//! ```
use ndarray::{ArrayD, IxDyn};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use crate::error::{Error, Result};
use crate::types::{Axis, Coordinate, Dataset, DatasetCoordinate};

/// Reads the coordinates and attributes of a source file
pub trait DatasetReader: Send + Sync {
    fn read(&self, path: &Path) -> Result<Dataset>;
}

/// Reader for JSON dataset descriptors
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonDatasetReader;

impl JsonDatasetReader {
    pub fn new() -> Self {
        Self
    }

    /// Parse a descriptor from any reader
    pub fn from_reader<R: Read>(&self, reader: R) -> Result<Dataset> {
        let descriptor: DatasetDescriptor = serde_json::from_reader(reader)
            .map_err(|e| Error::Extraction(format!("malformed dataset descriptor: {}", e)))?;
        descriptor.into_dataset()
    }
}

impl DatasetReader for JsonDatasetReader {
    fn read(&self, path: &Path) -> Result<Dataset> {
        if !path.exists() {
            return Err(Error::FileNotFound(path.to_path_buf()));
        }
        let file = File::open(path)?;
        self.from_reader(BufReader::new(file))
    }
}

#[derive(Debug, Deserialize)]
struct DatasetDescriptor {
    #[serde(default)]
    attributes: BTreeMap<String, String>,
    #[serde(default)]
    coordinates: Vec<CoordinateDescriptor>,
}

#[derive(Debug, Deserialize)]
struct CoordinateDescriptor {
    name: String,
    #[serde(default)]
    axes: Vec<Axis>,
    #[serde(default)]
    dimension: bool,
    points: ArrayDescriptor,
    bounds: Option<ArrayDescriptor>,
}

#[derive(Debug, Deserialize)]
struct ArrayDescriptor {
    shape: Vec<usize>,
    data: Vec<f64>,
}

impl DatasetDescriptor {
    fn into_dataset(self) -> Result<Dataset> {
        let coordinates = self
            .coordinates
            .into_iter()
            .map(CoordinateDescriptor::into_coordinate)
            .collect::<Result<Vec<_>>>()?;

        Ok(Dataset {
            attributes: self.attributes,
            coordinates,
        })
    }
}

impl CoordinateDescriptor {
    fn into_coordinate(self) -> Result<DatasetCoordinate> {
        let points = self.points.into_array(&self.name, "points")?;
        let mut coordinate = Coordinate::new(self.name.clone(), points);
        if let Some(bounds) = self.bounds {
            coordinate = coordinate.with_bounds(bounds.into_array(&self.name, "bounds")?);
        }

        Ok(DatasetCoordinate {
            coordinate,
            axes: self.axes,
            dimension: self.dimension,
        })
    }
}

impl ArrayDescriptor {
    fn into_array(self, name: &str, field: &str) -> Result<ArrayD<f64>> {
        ArrayD::from_shape_vec(IxDyn(&self.shape), self.data).map_err(|e| {
            Error::Extraction(format!(
                "{} of coordinate '{}' do not match shape {:?}: {}",
                field, name, self.shape, e
            ))
        })
    }
}
