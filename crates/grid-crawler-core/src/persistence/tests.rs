#[allow(clippy::module_inception)]
#[cfg(test)]
mod tests {
    use std::path::Path;

    use ndarray::{Array1, Array2};
    use tempfile::tempdir;

    use super::super::catalog::{insert_or_recover, resolve_coordinate, resolve_grid, Catalog};
    use super::super::models::CatalogStats;
    use crate::error::Error;
    use crate::processing::{exact_hash, fingerprint, fingerprint_grid, PHashParams};
    use crate::types::{Axis, CoordKind, Coordinate, Dataset};

    fn lat(n: usize) -> Coordinate {
        let step = 180.0 / n as f64;
        Coordinate::from_points(
            "latitude",
            Array1::linspace(-90.0 + step / 2.0, 90.0 - step / 2.0, n).to_vec(),
        )
    }

    fn lon(n: usize) -> Coordinate {
        let step = 360.0 / n as f64;
        Coordinate::from_points(
            "longitude",
            Array1::linspace(step / 2.0, 360.0 - step / 2.0, n).to_vec(),
        )
    }

    fn with_bounds(coord: Coordinate) -> Coordinate {
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

    fn cell_area() -> Coordinate {
        Coordinate::new(
            "cell_area",
            Array2::from_shape_fn((18, 36), |(i, j)| (i * 36 + j) as f64).into_dyn(),
        )
    }

    fn regular(tracking_id: &str) -> Dataset {
        Dataset::new()
            .with_tracking_id(tracking_id)
            .with_dim_coord(Axis::Y, lat(18))
            .with_dim_coord(Axis::X, lon(36))
    }

    #[test]
    fn test_open_creates_database() {
        let temp_dir = tempdir().unwrap();
        let db_path = temp_dir.path().join("nested").join("catalog.db");

        let _catalog = Catalog::open(&db_path).unwrap();
        assert!(db_path.exists());
    }

    #[test]
    fn test_open_existing_rejects_missing_path() {
        let temp_dir = tempdir().unwrap();
        let db_path = temp_dir.path().join("typo.db");

        let result = Catalog::open_existing(&db_path);

        assert!(matches!(result, Err(Error::FileNotFound(ref p)) if p == &db_path));
        assert!(!db_path.exists());
    }

    #[test]
    fn test_open_existing_reads_created_catalog() {
        let temp_dir = tempdir().unwrap();
        let db_path = temp_dir.path().join("catalog.db");
        {
            let mut catalog = Catalog::open(&db_path).unwrap();
            catalog
                .register_file(Path::new("tas.json"), &regular("t-1"))
                .unwrap();
        }

        let catalog = Catalog::open_existing(&db_path).unwrap();
        assert_eq!(catalog.stats().unwrap().files, 1);
    }

    #[test]
    fn test_catalog_persists_across_reopen() {
        let temp_dir = tempdir().unwrap();
        let db_path = temp_dir.path().join("catalog.db");

        {
            let mut catalog = Catalog::open(&db_path).unwrap();
            catalog
                .register_file(Path::new("tas.json"), &regular("t-1"))
                .unwrap();
        }

        let catalog = Catalog::open(&db_path).unwrap();
        assert!(catalog.find_file("tas.json", "t-1").unwrap().is_some());
        assert_eq!(catalog.stats().unwrap().files, 1);
    }

    #[test]
    fn test_resolve_coordinate_reuses_existing_row() {
        let catalog = Catalog::open_in_memory().unwrap();
        let coord = lat(18);
        let fp = fingerprint(&coord, CoordKind::Dimension, PHashParams::default()).unwrap();

        let first = resolve_coordinate(catalog.connection(), &fp, &coord).unwrap();
        let second = resolve_coordinate(catalog.connection(), &fp, &coord).unwrap();

        assert_eq!(first, second);
        assert_eq!(catalog.stats().unwrap().coordinates, 1);
    }

    #[test]
    fn test_insert_after_concurrent_insert_returns_stored_row() {
        let catalog = Catalog::open_in_memory().unwrap();
        let params = PHashParams::default();

        for coord in [lat(18), with_bounds(lat(36))] {
            let fp = fingerprint(&coord, CoordKind::Dimension, params).unwrap();
            // Row stored between this writer's lookup and insert
            let stored = resolve_coordinate(catalog.connection(), &fp, &coord).unwrap();

            let recovered = insert_or_recover(catalog.connection(), &fp, &coord).unwrap();

            assert_eq!(recovered, stored);
        }
        assert_eq!(catalog.stats().unwrap().coordinates, 2);
    }

    #[test]
    fn test_coordinates_differing_in_bounds_only_are_distinct() {
        let catalog = Catalog::open_in_memory().unwrap();
        let params = PHashParams::default();
        let plain = lat(18);
        let bounded = with_bounds(lat(18));

        let plain_fp = fingerprint(&plain, CoordKind::Dimension, params).unwrap();
        let bounded_fp = fingerprint(&bounded, CoordKind::Dimension, params).unwrap();

        let a = resolve_coordinate(catalog.connection(), &plain_fp, &plain).unwrap();
        let b = resolve_coordinate(catalog.connection(), &bounded_fp, &bounded).unwrap();

        assert_ne!(a, b);
        assert_eq!(catalog.stats().unwrap().coordinates, 2);
    }

    #[test]
    fn test_unique_index_treats_missing_bounds_as_equal() {
        let catalog = Catalog::open_in_memory().unwrap();
        let insert = "INSERT INTO coordinate (points, points_shape, points_exact_hash, points_perceptual_hash)
                      VALUES (x'00', '[1]', 42, 0)";

        catalog.connection().execute(insert, []).unwrap();
        let err = catalog.connection().execute(insert, []).unwrap_err();

        assert!(Error::is_unique_violation(&err));
    }

    #[test]
    fn test_load_coordinate_returns_stored_arrays() {
        let catalog = Catalog::open_in_memory().unwrap();
        let coord = with_bounds(lat(18));
        let fp = fingerprint(&coord, CoordKind::Dimension, PHashParams::default()).unwrap();
        let id = resolve_coordinate(catalog.connection(), &fp, &coord).unwrap();

        let stored = catalog.load_coordinate(id).unwrap();

        assert_eq!(stored.id, id);
        assert_eq!(stored.points, coord.points);
        assert_eq!(stored.bounds, coord.bounds);
        assert_eq!(stored.points_exact_hash, exact_hash(&coord.points));
        assert_eq!(stored.points_perceptual_hash, fp.points_perceptual_hash.value());
        assert_eq!(stored.bounds_exact_hash, fp.bounds_exact_hash);
        assert_eq!(
            stored.bounds_lower_perceptual_hash,
            fp.bounds_lower_perceptual_hash.as_ref().map(|h| h.value())
        );
    }

    #[test]
    fn test_load_missing_coordinate_is_corrupt() {
        let catalog = Catalog::open_in_memory().unwrap();

        let result = catalog.load_coordinate(super::super::models::CoordinateRef(99));
        assert!(matches!(result, Err(Error::Corrupt(_))));
    }

    #[test]
    fn test_resolve_grid_reuses_equal_set() {
        let catalog = Catalog::open_in_memory().unwrap();
        let params = PHashParams::default();
        let a = regular("a");
        let b = regular("b");

        let grid_a = resolve_grid(catalog.connection(), &fingerprint_grid(&a, params).unwrap())
            .unwrap();
        let grid_b = resolve_grid(catalog.connection(), &fingerprint_grid(&b, params).unwrap())
            .unwrap();

        assert_eq!(grid_a, grid_b);
        assert_eq!(catalog.stats().unwrap().grids, 1);
        assert_eq!(catalog.grid_coordinates(grid_a).unwrap().len(), 2);
    }

    #[test]
    fn test_subset_and_superset_grids_are_distinct() {
        let catalog = Catalog::open_in_memory().unwrap();
        let params = PHashParams::default();
        let base = regular("base");
        let extended = regular("extended").with_aux_coord(&[Axis::X, Axis::Y], cell_area());

        let superset = resolve_grid(
            catalog.connection(),
            &fingerprint_grid(&extended, params).unwrap(),
        )
        .unwrap();
        let subset =
            resolve_grid(catalog.connection(), &fingerprint_grid(&base, params).unwrap()).unwrap();

        assert_ne!(subset, superset);
        assert_eq!(
            catalog.stats().unwrap(),
            CatalogStats {
                coordinates: 3,
                grids: 2,
                files: 0
            }
        );

        // Matching either again picks the right one
        let again =
            resolve_grid(catalog.connection(), &fingerprint_grid(&base, params).unwrap()).unwrap();
        assert_eq!(again, subset);
    }

    #[test]
    fn test_register_file_twice_is_a_no_op() {
        let mut catalog = Catalog::open_in_memory().unwrap();
        let dataset = regular("t-1");

        let first = catalog
            .register_file(Path::new("/data/tas.json"), &dataset)
            .unwrap();
        let second = catalog
            .register_file(Path::new("/other/tas.json"), &dataset)
            .unwrap();

        assert!(first.is_new());
        assert!(!second.is_new());
        assert_eq!(first.record(), second.record());
        assert_eq!(catalog.stats().unwrap().files, 1);
    }

    #[test]
    fn test_ambiguous_grid_commits_nothing() {
        let mut catalog = Catalog::open_in_memory().unwrap();
        let dataset = regular("t-1").with_dim_coord(Axis::X, lon(72));

        let err = catalog
            .register_file(Path::new("bad.json"), &dataset)
            .unwrap_err();

        match err {
            Error::Ingest { source, .. } => {
                assert!(matches!(
                    *source,
                    Error::AmbiguousGrid {
                        axis: Axis::X,
                        found: 2
                    }
                ))
            }
            other => panic!("unexpected error: {}", other),
        }
        assert_eq!(catalog.stats().unwrap(), CatalogStats::default());
    }

    #[test]
    fn test_failed_registration_keeps_earlier_batch_entries() {
        let mut catalog = Catalog::open_in_memory().unwrap();
        catalog
            .connection()
            .execute_batch(
                "CREATE TRIGGER reject_poison BEFORE INSERT ON file
                 WHEN NEW.filename = 'poison.json'
                 BEGIN SELECT RAISE(ABORT, 'rejected'); END;",
            )
            .unwrap();

        let good = regular("good");
        let poison = Dataset::new()
            .with_tracking_id("poison")
            .with_dim_coord(Axis::Y, lat(36))
            .with_dim_coord(Axis::X, lon(72));

        {
            let mut batch = catalog.batch().unwrap();
            batch
                .register_file(Path::new("good.json"), &good)
                .unwrap();
            let err = batch
                .register_file(Path::new("poison.json"), &poison)
                .unwrap_err();
            assert!(matches!(err, Error::Ingest { .. }));
            assert_eq!(batch.registered(), 1);
            assert_eq!(batch.failed(), 1);
            batch.commit().unwrap();
        }

        // The poison file's coordinates and grid were rolled back with it
        assert_eq!(
            catalog.stats().unwrap(),
            CatalogStats {
                coordinates: 2,
                grids: 1,
                files: 1
            }
        );
        assert!(catalog.find_file("good.json", "good").unwrap().is_some());
    }

    #[test]
    fn test_batch_sees_its_own_registrations() {
        let mut catalog = Catalog::open_in_memory().unwrap();
        let dataset = regular("t-1");

        let mut batch = catalog.batch().unwrap();
        let first = batch.register_file(Path::new("tas.json"), &dataset).unwrap();
        let second = batch.register_file(Path::new("tas.json"), &dataset).unwrap();
        batch.commit().unwrap();

        assert!(first.is_new());
        assert!(!second.is_new());
        assert_eq!(catalog.stats().unwrap().files, 1);
    }

    #[test]
    fn test_grids_and_files_queries() {
        let mut catalog = Catalog::open_in_memory().unwrap();
        let a = catalog
            .register_file(Path::new("a.json"), &regular("a"))
            .unwrap();
        catalog
            .register_file(Path::new("b.json"), &regular("b"))
            .unwrap();

        let grids = catalog.grids().unwrap();
        assert_eq!(grids.len(), 1);
        assert_eq!(grids[0].grid, a.grid());
        assert_eq!(grids[0].files, 2);
        assert_eq!(grids[0].coordinates.len(), 2);

        let files = catalog.files_for_grid(a.grid()).unwrap();
        let names: Vec<&str> = files.iter().map(|f| f.filename.as_str()).collect();
        assert_eq!(names, vec!["a.json", "b.json"]);
    }
}
