//! Coordinate and grid fingerprints.
//!
//! A coordinate fingerprint combines exact hashes (the catalog identity) with
//! perceptual hashes (carried for similarity queries). A grid fingerprint is
//! the set of coordinate fingerprints of the X/Y dimension coordinates and
//! every auxiliary coordinate declared along those axes.
use ndarray::{ArrayD, Axis as NdAxis, Ix1};
use rayon::prelude::*;

use super::exact::{exact_hash, ExactHash};
use super::perceptual::{phash, phash_1d, ArrayHash, PHashParams};
use crate::error::{Error, Result};
use crate::types::{Axis, CoordKind, Coordinate, GridSource};

/// Hashes identifying a single coordinate
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CoordinateFingerprint {
    pub points_exact_hash: ExactHash,
    pub points_perceptual_hash: ArrayHash,
    pub bounds_exact_hash: Option<ExactHash>,
    pub bounds_lower_perceptual_hash: Option<ArrayHash>,
    pub bounds_upper_perceptual_hash: Option<ArrayHash>,
}

impl CoordinateFingerprint {
    /// The part of the fingerprint that defines catalog identity
    pub fn key(&self) -> (ExactHash, Option<ExactHash>) {
        (self.points_exact_hash, self.bounds_exact_hash)
    }
}

/// Fingerprint one coordinate
pub fn fingerprint(
    coordinate: &Coordinate,
    kind: CoordKind,
    params: PHashParams,
) -> Result<CoordinateFingerprint> {
    if kind == CoordKind::Dimension && coordinate.rank() != 1 {
        return Err(Error::Extraction(format!(
            "dimension coordinate '{}' has rank {}, expected 1",
            coordinate.name,
            coordinate.rank()
        )));
    }

    let points_exact_hash = exact_hash(&coordinate.points);
    let points_perceptual_hash = phash(&coordinate.points, params)?;

    let (bounds_exact_hash, bounds_lower_perceptual_hash, bounds_upper_perceptual_hash) =
        match (&coordinate.bounds, kind) {
            (None, _) => (None, None, None),
            (Some(bounds), CoordKind::Dimension) => {
                check_cell_bounds(coordinate, bounds)?;
                let lower = edge_phash(bounds, 0, params)?;
                let upper = edge_phash(bounds, 1, params)?;
                (Some(exact_hash(bounds)), Some(lower), Some(upper))
            }
            // 2-D cell bounds have no single lower/upper edge
            (Some(bounds), CoordKind::Auxiliary) => (Some(exact_hash(bounds)), None, None),
        };

    Ok(CoordinateFingerprint {
        points_exact_hash,
        points_perceptual_hash,
        bounds_exact_hash,
        bounds_lower_perceptual_hash,
        bounds_upper_perceptual_hash,
    })
}

/// Dimension coordinate bounds must be one (lower, upper) pair per point
fn check_cell_bounds(coordinate: &Coordinate, bounds: &ArrayD<f64>) -> Result<()> {
    let expected = [coordinate.points.len(), 2];
    if bounds.shape() != expected {
        return Err(Error::Extraction(format!(
            "bounds of '{}' have shape {:?}, expected {:?}",
            coordinate.name,
            bounds.shape(),
            expected
        )));
    }
    Ok(())
}

/// Perceptual hash of one column (0 = lower, 1 = upper) of N×2 cell bounds
fn edge_phash(bounds: &ArrayD<f64>, column: usize, params: PHashParams) -> Result<ArrayHash> {
    let edge = bounds
        .index_axis(NdAxis(1), column)
        .into_dimensionality::<Ix1>()
        .map_err(|e| Error::Extraction(format!("cell bounds: {}", e)))?;
    phash_1d(edge, params)
}

/// The set of coordinate fingerprints that identifies a grid, each paired with
/// the coordinate it was computed from.
#[derive(Debug, Clone, Default)]
pub struct GridFingerprint<'a> {
    entries: Vec<(CoordinateFingerprint, &'a Coordinate)>,
}

impl<'a> GridFingerprint<'a> {
    /// Add a coordinate; a fingerprint already present is ignored
    pub fn insert(&mut self, fingerprint: CoordinateFingerprint, coordinate: &'a Coordinate) -> bool {
        if self.contains(&fingerprint) {
            return false;
        }
        self.entries.push((fingerprint, coordinate));
        true
    }

    pub fn contains(&self, fingerprint: &CoordinateFingerprint) -> bool {
        self.entries.iter().any(|(fp, _)| fp == fingerprint)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&CoordinateFingerprint, &'a Coordinate)> + '_ {
        self.entries.iter().map(|(fp, coord)| (fp, *coord))
    }

    pub fn fingerprints(&self) -> impl Iterator<Item = &CoordinateFingerprint> + '_ {
        self.entries.iter().map(|(fp, _)| fp)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// Set equality, independent of insertion order and of coordinate identity
impl PartialEq for GridFingerprint<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len() && self.fingerprints().all(|fp| other.contains(fp))
    }
}

impl Eq for GridFingerprint<'_> {}

/// Fingerprint the grid of a dataset
pub fn fingerprint_grid<S>(source: &S, params: PHashParams) -> Result<GridFingerprint<'_>>
where
    S: GridSource + ?Sized,
{
    let mut coordinates: Vec<(&Coordinate, CoordKind)> = Vec::new();
    let mut auxiliary: Vec<&Coordinate> = Vec::new();

    for axis in Axis::SPATIAL {
        let dim_coords = source.coords(axis, true);
        if dim_coords.len() != 1 {
            return Err(Error::AmbiguousGrid {
                axis,
                found: dim_coords.len(),
            });
        }
        coordinates.push((dim_coords[0], CoordKind::Dimension));

        // A coordinate spanning both axes is listed under each of them
        for coord in source.coords(axis, false) {
            if !auxiliary.iter().any(|seen| std::ptr::eq(*seen, coord)) {
                auxiliary.push(coord);
            }
        }
    }
    coordinates.extend(auxiliary.into_iter().map(|c| (c, CoordKind::Auxiliary)));

    let fingerprints: Vec<Result<CoordinateFingerprint>> = coordinates
        .par_iter()
        .map(|(coord, kind)| fingerprint(coord, *kind, params))
        .collect();

    let mut grid = GridFingerprint::default();
    for ((coord, _), fp) in coordinates.into_iter().zip(fingerprints) {
        grid.insert(fp?, coord);
    }
    Ok(grid)
}
