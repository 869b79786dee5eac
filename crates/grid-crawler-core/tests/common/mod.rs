#![allow(dead_code)]

use std::path::{Path, PathBuf};

use grid_crawler_core::{Axis, Coordinate, Dataset};
use ndarray::{Array1, Array2, ArrayD};
use serde_json::{json, Value};

/// Cell-centred latitudes of a regular global grid
pub fn lat(n: usize) -> Coordinate {
    let step = 180.0 / n as f64;
    Coordinate::from_points(
        "latitude",
        Array1::linspace(-90.0 + step / 2.0, 90.0 - step / 2.0, n).to_vec(),
    )
}

/// Cell-centred longitudes of a regular global grid
pub fn lon(n: usize) -> Coordinate {
    let step = 360.0 / n as f64;
    Coordinate::from_points(
        "longitude",
        Array1::linspace(step / 2.0, 360.0 - step / 2.0, n).to_vec(),
    )
}

/// Attach contiguous cell edges to a regular 1-D coordinate
pub fn with_bounds(coord: Coordinate) -> Coordinate {
    let points: Vec<f64> = coord.points.iter().copied().collect();
    let half = (points[1] - points[0]) / 2.0;
    let bounds = Array2::from_shape_fn((points.len(), 2), |(i, j)| {
        if j == 0 {
            points[i] - half
        } else {
            points[i] + half
        }
    });
    coord.with_bounds(bounds.into_dyn())
}

/// A 2-D auxiliary field over an `ny` by `nx` grid
pub fn cell_area(ny: usize, nx: usize) -> Coordinate {
    let area = Array2::from_shape_fn((ny, nx), |(i, _)| {
        let lat = -90.0 + (i as f64 + 0.5) * 180.0 / ny as f64;
        lat.to_radians().cos()
    });
    Coordinate::new("cell_area", area.into_dyn())
}

/// Regular grid with two dimension coordinates and no bounds
pub fn regular_dataset(tracking_id: &str, ny: usize, nx: usize) -> Dataset {
    Dataset::new()
        .with_tracking_id(tracking_id)
        .with_dim_coord(Axis::Y, lat(ny))
        .with_dim_coord(Axis::X, lon(nx))
}

/// Regular grid plus an auxiliary coordinate spanning both axes
pub fn dataset_with_aux(tracking_id: &str, ny: usize, nx: usize) -> Dataset {
    regular_dataset(tracking_id, ny, nx).with_aux_coord(&[Axis::Y, Axis::X], cell_area(ny, nx))
}

fn array_json(array: &ArrayD<f64>) -> Value {
    json!({
        "shape": array.shape(),
        "data": array.iter().copied().collect::<Vec<f64>>(),
    })
}

/// Write `dataset` as a JSON descriptor named `name` under `dir`
pub fn write_descriptor(dir: &Path, name: &str, dataset: &Dataset) -> PathBuf {
    let coordinates: Vec<Value> = dataset
        .coordinates
        .iter()
        .map(|c| {
            let mut entry = json!({
                "name": c.coordinate.name,
                "axes": c.axes,
                "dimension": c.dimension,
                "points": array_json(&c.coordinate.points),
            });
            if let Some(bounds) = &c.coordinate.bounds {
                entry["bounds"] = array_json(bounds);
            }
            entry
        })
        .collect();
    let descriptor = json!({
        "attributes": dataset.attributes,
        "coordinates": coordinates,
    });

    let path = dir.join(name);
    std::fs::write(&path, serde_json::to_vec_pretty(&descriptor).unwrap()).unwrap();
    path
}
