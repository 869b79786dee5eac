use ndarray::{Array1, ArrayD};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Attribute holding the unique identifier of a source file
pub const TRACKING_ID: &str = "tracking_id";

/// Spatial axes that make up a grid
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Axis {
    X,
    Y,
}

impl Axis {
    /// The axes a grid is built from, in lookup order
    pub const SPATIAL: [Axis; 2] = [Axis::X, Axis::Y];
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Axis::X => write!(f, "x"),
            Axis::Y => write!(f, "y"),
        }
    }
}

/// Role a coordinate plays in a grid
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CoordKind {
    /// 1-D coordinate indexing one axis of the data
    Dimension,

    /// Coordinate giving extra per-cell location info, often 2-D
    Auxiliary,
}

/// A named coordinate with its point values and optional cell bounds
#[derive(Debug, Clone, PartialEq)]
pub struct Coordinate {
    pub name: String,
    pub points: ArrayD<f64>,
    pub bounds: Option<ArrayD<f64>>,
}

impl Coordinate {
    pub fn new(name: impl Into<String>, points: ArrayD<f64>) -> Self {
        Self {
            name: name.into(),
            points,
            bounds: None,
        }
    }

    /// Build a 1-D coordinate from a vector of points
    pub fn from_points(name: impl Into<String>, points: Vec<f64>) -> Self {
        Self::new(name, Array1::from(points).into_dyn())
    }

    /// Attach cell bounds
    pub fn with_bounds(mut self, bounds: ArrayD<f64>) -> Self {
        self.bounds = Some(bounds);
        self
    }

    /// Number of dimensions of the points array
    pub fn rank(&self) -> usize {
        self.points.ndim()
    }
}

/// A coordinate as declared in a dataset
#[derive(Debug, Clone, PartialEq)]
pub struct DatasetCoordinate {
    pub coordinate: Coordinate,

    /// Spatial axes the coordinate is declared along
    pub axes: Vec<Axis>,

    /// Whether this is the dimension coordinate of its axis
    pub dimension: bool,
}

/// Coordinates and global attributes extracted from one source file
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dataset {
    pub attributes: BTreeMap<String, String>,
    pub coordinates: Vec<DatasetCoordinate>,
}

impl Dataset {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    pub fn with_tracking_id(self, tracking_id: impl Into<String>) -> Self {
        self.with_attribute(TRACKING_ID, tracking_id)
    }

    /// Declare the dimension coordinate of an axis
    pub fn with_dim_coord(mut self, axis: Axis, coordinate: Coordinate) -> Self {
        self.coordinates.push(DatasetCoordinate {
            coordinate,
            axes: vec![axis],
            dimension: true,
        });
        self
    }

    /// Declare an auxiliary coordinate spanning the given axes
    pub fn with_aux_coord(mut self, axes: &[Axis], coordinate: Coordinate) -> Self {
        self.coordinates.push(DatasetCoordinate {
            coordinate,
            axes: axes.to_vec(),
            dimension: false,
        });
        self
    }
}

/// Read access to the coordinates that define a dataset's grid
pub trait GridSource {
    /// Coordinates declared along `axis`, either dimension or auxiliary ones
    fn coords(&self, axis: Axis, dimension: bool) -> Vec<&Coordinate>;

    /// Global attribute lookup
    fn attribute(&self, name: &str) -> Option<&str>;
}

impl GridSource for Dataset {
    fn coords(&self, axis: Axis, dimension: bool) -> Vec<&Coordinate> {
        self.coordinates
            .iter()
            .filter(|c| c.dimension == dimension && c.axes.contains(&axis))
            .map(|c| &c.coordinate)
            .collect()
    }

    fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }
}
