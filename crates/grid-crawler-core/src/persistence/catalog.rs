//! The dedup catalog: lookup-or-insert of coordinates, grids and files.
//!
//! The free functions take a `&Connection` so they run unchanged inside a
//! transaction or a savepoint (both deref to `Connection`). `Catalog` owns the
//! connection and wraps every registration in its own transaction, `Batch`
//! shares one transaction across several registrations with a savepoint each.
use log::debug;
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction, TransactionBehavior};
use std::collections::BTreeSet;
use std::path::Path;

use super::db;
use super::models::{
    decode_array, encode_shape, phash_from_i64, phash_to_i64, CatalogStats, CoordinateRef,
    FileRecord, FileRef, GridRef, GridSummary, Registration, StoredCoordinate,
};
use crate::error::{Error, Result};
use crate::ingest::{prepare_file, FileIdentity, PreparedFile};
use crate::logging::log_registration;
use crate::processing::{array_bytes, CoordinateFingerprint, ExactHash, GridFingerprint, PHashParams};
use crate::types::{Coordinate, GridSource};

/// Look up a coordinate by its exact hashes, inserting it when absent
pub fn resolve_coordinate(
    conn: &Connection,
    fingerprint: &CoordinateFingerprint,
    coordinate: &Coordinate,
) -> Result<CoordinateRef> {
    if let Some(existing) = lookup_coordinate(conn, fingerprint)? {
        return Ok(existing);
    }

    insert_or_recover(conn, fingerprint, coordinate)
}

/// Insert a coordinate, returning the stored row when another writer inserted it first
pub(super) fn insert_or_recover(
    conn: &Connection,
    fingerprint: &CoordinateFingerprint,
    coordinate: &Coordinate,
) -> Result<CoordinateRef> {
    match insert_coordinate(conn, fingerprint, coordinate) {
        Ok(id) => {
            debug!(
                "Inserted coordinate {} '{}' (points {})",
                id.0, coordinate.name, fingerprint.points_exact_hash
            );
            Ok(id)
        }
        Err(Error::Storage(ref e)) if Error::is_unique_violation(e) => {
            lookup_coordinate(conn, fingerprint)?.ok_or_else(|| {
                Error::DuplicateKeyRace(format!(
                    "coordinate with points hash {}",
                    fingerprint.points_exact_hash
                ))
            })
        }
        Err(e) => Err(e),
    }
}

fn lookup_coordinate(
    conn: &Connection,
    fingerprint: &CoordinateFingerprint,
) -> Result<Option<CoordinateRef>> {
    let mut stmt = conn.prepare_cached(
        "SELECT id FROM coordinate
         WHERE points_exact_hash = ?1 AND bounds_exact_hash IS ?2",
    )?;
    let id = stmt
        .query_row(
            params![
                fingerprint.points_exact_hash.to_i64(),
                fingerprint.bounds_exact_hash.map(|h| h.to_i64())
            ],
            |row| row.get(0),
        )
        .optional()?;
    Ok(id.map(CoordinateRef))
}

fn insert_coordinate(
    conn: &Connection,
    fingerprint: &CoordinateFingerprint,
    coordinate: &Coordinate,
) -> Result<CoordinateRef> {
    let (bounds, bounds_shape) = match &coordinate.bounds {
        Some(bounds) => (Some(array_bytes(bounds)), Some(encode_shape(bounds)?)),
        None => (None, None),
    };

    let mut stmt = conn.prepare_cached(
        "INSERT INTO coordinate (
             points, points_shape, points_exact_hash, points_perceptual_hash,
             bounds, bounds_shape, bounds_exact_hash,
             bounds_lower_perceptual_hash, bounds_upper_perceptual_hash
         ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
    )?;
    stmt.execute(params![
        array_bytes(&coordinate.points),
        encode_shape(&coordinate.points)?,
        fingerprint.points_exact_hash.to_i64(),
        phash_to_i64(fingerprint.points_perceptual_hash.value()),
        bounds,
        bounds_shape,
        fingerprint.bounds_exact_hash.map(|h| h.to_i64()),
        fingerprint
            .bounds_lower_perceptual_hash
            .as_ref()
            .map(|h| phash_to_i64(h.value())),
        fingerprint
            .bounds_upper_perceptual_hash
            .as_ref()
            .map(|h| phash_to_i64(h.value())),
    ])?;

    Ok(CoordinateRef(conn.last_insert_rowid()))
}

/// Resolve every coordinate of a grid, then reuse the grid whose coordinate
/// set is exactly the resolved set or insert a new one.
pub fn resolve_grid(conn: &Connection, grid: &GridFingerprint<'_>) -> Result<GridRef> {
    let mut coordinates = BTreeSet::new();
    for (fingerprint, coordinate) in grid.iter() {
        coordinates.insert(resolve_coordinate(conn, fingerprint, coordinate)?);
    }

    if let Some(existing) = find_grid(conn, &coordinates)? {
        return Ok(existing);
    }

    conn.execute("INSERT INTO grid DEFAULT VALUES", [])?;
    let grid_ref = GridRef(conn.last_insert_rowid());

    let mut link = conn.prepare_cached(
        "INSERT INTO grid_coordinate (grid_id, coordinate_id) VALUES (?1, ?2)",
    )?;
    for coordinate in &coordinates {
        link.execute(params![grid_ref.0, coordinate.0])?;
    }

    debug!(
        "Inserted grid {} with coordinates {:?}",
        grid_ref.0,
        coordinates.iter().map(|c| c.0).collect::<Vec<_>>()
    );
    Ok(grid_ref)
}

/// Find the grid made of exactly `coordinates`.
///
/// Grids holding the first coordinate are only candidates: sharing some
/// coordinates is not enough, the full sets have to be equal.
fn find_grid(conn: &Connection, coordinates: &BTreeSet<CoordinateRef>) -> Result<Option<GridRef>> {
    let first = match coordinates.iter().next() {
        Some(first) => *first,
        None => return Ok(None),
    };

    let mut stmt =
        conn.prepare_cached("SELECT grid_id FROM grid_coordinate WHERE coordinate_id = ?1")?;
    let candidates = stmt
        .query_map(params![first.0], |row| row.get(0).map(GridRef))?
        .collect::<rusqlite::Result<Vec<GridRef>>>()?;

    for candidate in candidates {
        if grid_coordinate_set(conn, candidate)? == *coordinates {
            return Ok(Some(candidate));
        }
    }
    Ok(None)
}

fn grid_coordinate_set(conn: &Connection, grid: GridRef) -> Result<BTreeSet<CoordinateRef>> {
    let mut stmt =
        conn.prepare_cached("SELECT coordinate_id FROM grid_coordinate WHERE grid_id = ?1")?;
    let set = stmt
        .query_map(params![grid.0], |row| row.get(0).map(CoordinateRef))?
        .collect::<rusqlite::Result<BTreeSet<CoordinateRef>>>()?;
    Ok(set)
}

/// Register a prepared file unless its natural key is already present
pub fn register(conn: &Connection, prepared: &PreparedFile<'_>) -> Result<Registration> {
    let identity = &prepared.identity;
    if let Some(existing) = find_file(conn, &identity.filename, &identity.tracking_id)? {
        return Ok(Registration::Existing(existing));
    }

    let grid = resolve_grid(conn, &prepared.grid)?;
    conn.execute(
        "INSERT INTO file (filename, tracking_id, grid_id) VALUES (?1, ?2, ?3)",
        params![identity.filename, identity.tracking_id, grid.0],
    )?;

    Ok(Registration::Created(FileRecord {
        id: FileRef(conn.last_insert_rowid()),
        filename: identity.filename.clone(),
        tracking_id: identity.tracking_id.clone(),
        grid,
    }))
}

/// Look up a file by its natural key
pub fn find_file(conn: &Connection, filename: &str, tracking_id: &str) -> Result<Option<FileRecord>> {
    let mut stmt = conn.prepare_cached(
        "SELECT id, filename, tracking_id, grid_id FROM file
         WHERE filename = ?1 AND tracking_id = ?2",
    )?;
    let record = stmt
        .query_row(params![filename, tracking_id], file_from_row)
        .optional()?;
    Ok(record)
}

fn file_from_row(row: &Row<'_>) -> rusqlite::Result<FileRecord> {
    Ok(FileRecord {
        id: FileRef(row.get(0)?),
        filename: row.get(1)?,
        tracking_id: row.get(2)?,
        grid: GridRef(row.get(3)?),
    })
}

/// Handle on the catalog database
pub struct Catalog {
    conn: Connection,
    params: PHashParams,
}

impl Catalog {
    /// Open (or create) a catalog stored at `path`
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self {
            conn: db::open_database(path.as_ref())?,
            params: PHashParams::default(),
        })
    }

    /// Open a catalog that must already exist on disk
    pub fn open_existing(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(Error::FileNotFound(path.to_path_buf()));
        }
        Self::open(path)
    }

    /// Open an empty catalog held in memory
    pub fn open_in_memory() -> Result<Self> {
        Ok(Self {
            conn: db::open_in_memory()?,
            params: PHashParams::default(),
        })
    }

    /// Configure the perceptual hash parameters used for new coordinates
    pub fn with_params(mut self, params: PHashParams) -> Self {
        self.params = params;
        self
    }

    pub fn params(&self) -> PHashParams {
        self.params
    }

    /// Underlying connection, for read-only queries
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Register a source file as one atomic transaction.
    ///
    /// An already registered `(filename, tracking_id)` returns the existing
    /// record without fingerprinting the grid.
    pub fn register_file<S>(&mut self, path: &Path, source: &S) -> Result<Registration>
    where
        S: GridSource + ?Sized,
    {
        let identity = FileIdentity::of(path, source).map_err(|e| Error::ingest(path, e))?;
        if let Some(existing) = self.find_file(&identity.filename, &identity.tracking_id)? {
            return Ok(Registration::Existing(existing));
        }

        let prepared = prepare_file(path, source, self.params)?;
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(|e| Error::ingest(path, e.into()))?;
        let registration = register(&tx, &prepared).map_err(|e| Error::ingest(path, e))?;
        tx.commit().map_err(|e| Error::ingest(path, e.into()))?;

        log_registration(path, &registration);
        Ok(registration)
    }

    /// Start a batch of registrations sharing one transaction
    pub fn batch(&mut self) -> Result<Batch<'_>> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        Ok(Batch {
            tx,
            params: self.params,
            registered: 0,
            failed: 0,
        })
    }

    pub fn find_file(&self, filename: &str, tracking_id: &str) -> Result<Option<FileRecord>> {
        find_file(&self.conn, filename, tracking_id)
    }

    /// Row counts of every catalog table
    pub fn stats(&self) -> Result<CatalogStats> {
        let count = |table: &str| -> Result<usize> {
            let n: i64 = self
                .conn
                .query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| {
                    row.get(0)
                })?;
            Ok(n as usize)
        };

        Ok(CatalogStats {
            coordinates: count("coordinate")?,
            grids: count("grid")?,
            files: count("file")?,
        })
    }

    /// Every grid with its coordinates and file count
    pub fn grids(&self) -> Result<Vec<GridSummary>> {
        let mut stmt = self.conn.prepare(
            "SELECT g.id, COUNT(f.id) FROM grid g
             LEFT JOIN file f ON f.grid_id = g.id
             GROUP BY g.id ORDER BY g.id",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok((GridRef(row.get(0)?), row.get::<_, i64>(1)? as usize))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        rows.into_iter()
            .map(|(grid, files)| {
                Ok(GridSummary {
                    grid,
                    coordinates: self.grid_coordinates(grid)?,
                    files,
                })
            })
            .collect()
    }

    /// Coordinates a grid is made of, in id order
    pub fn grid_coordinates(&self, grid: GridRef) -> Result<Vec<CoordinateRef>> {
        Ok(grid_coordinate_set(&self.conn, grid)?.into_iter().collect())
    }

    /// Files registered on a grid
    pub fn files_for_grid(&self, grid: GridRef) -> Result<Vec<FileRecord>> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT id, filename, tracking_id, grid_id FROM file
             WHERE grid_id = ?1 ORDER BY id",
        )?;
        let files = stmt
            .query_map(params![grid.0], file_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(files)
    }

    /// Load a stored coordinate with its arrays
    pub fn load_coordinate(&self, id: CoordinateRef) -> Result<StoredCoordinate> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT points, points_shape, points_exact_hash, points_perceptual_hash,
                    bounds, bounds_shape, bounds_exact_hash,
                    bounds_lower_perceptual_hash, bounds_upper_perceptual_hash
             FROM coordinate WHERE id = ?1",
        )?;
        let row = stmt
            .query_row(params![id.0], |row| {
                Ok((
                    row.get::<_, Vec<u8>>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, i64>(2)?,
                    row.get::<_, i64>(3)?,
                    row.get::<_, Option<Vec<u8>>>(4)?,
                    row.get::<_, Option<String>>(5)?,
                    row.get::<_, Option<i64>>(6)?,
                    row.get::<_, Option<i64>>(7)?,
                    row.get::<_, Option<i64>>(8)?,
                ))
            })
            .optional()?
            .ok_or_else(|| Error::Corrupt(format!("no coordinate with id {}", id.0)))?;

        let (points, points_shape, points_hash, points_phash, bounds, bounds_shape, bounds_hash, lower, upper) =
            row;
        let bounds = match (bounds, bounds_shape) {
            (Some(bytes), Some(shape)) => Some(decode_array(&bytes, &shape)?),
            (None, None) => None,
            _ => {
                return Err(Error::Corrupt(format!(
                    "coordinate {} has bounds without a shape",
                    id.0
                )))
            }
        };

        Ok(StoredCoordinate {
            id,
            points: decode_array(&points, &points_shape)?,
            points_exact_hash: ExactHash::from_i64(points_hash),
            points_perceptual_hash: phash_from_i64(points_phash),
            bounds,
            bounds_exact_hash: bounds_hash.map(ExactHash::from_i64),
            bounds_lower_perceptual_hash: lower.map(phash_from_i64),
            bounds_upper_perceptual_hash: upper.map(phash_from_i64),
        })
    }
}

/// Several registrations committed together.
///
/// Each registration runs in its own savepoint: a failure rolls back that
/// file only, and the files registered before it stay in the batch.
pub struct Batch<'c> {
    tx: Transaction<'c>,
    params: PHashParams,
    registered: usize,
    failed: usize,
}

impl Batch<'_> {
    /// Fingerprint and register a source file
    pub fn register_file<S>(&mut self, path: &Path, source: &S) -> Result<Registration>
    where
        S: GridSource + ?Sized,
    {
        let identity = FileIdentity::of(path, source).map_err(|e| Error::ingest(path, e))?;
        if let Some(existing) = find_file(&self.tx, &identity.filename, &identity.tracking_id)? {
            return Ok(Registration::Existing(existing));
        }
        let prepared = prepare_file(path, source, self.params)?;
        self.register_prepared(path, &prepared)
    }

    /// Register a file fingerprinted ahead of time
    pub fn register_prepared(
        &mut self,
        path: &Path,
        prepared: &PreparedFile<'_>,
    ) -> Result<Registration> {
        let sp = self.tx.savepoint().map_err(|e| Error::ingest(path, e.into()))?;
        match register(&sp, prepared) {
            Ok(registration) => {
                sp.commit().map_err(|e| Error::ingest(path, e.into()))?;
                if registration.is_new() {
                    self.registered += 1;
                }
                log_registration(path, &registration);
                Ok(registration)
            }
            Err(e) => {
                // Dropping the savepoint rolls back this file only
                drop(sp);
                self.failed += 1;
                Err(Error::ingest(path, e))
            }
        }
    }

    /// Files newly registered in this batch
    pub fn registered(&self) -> usize {
        self.registered
    }

    /// Registrations rolled back in this batch
    pub fn failed(&self) -> usize {
        self.failed
    }

    /// Commit every successful registration of the batch
    pub fn commit(self) -> Result<()> {
        let registered = self.registered;
        self.tx.commit()?;
        debug!("Committed batch of {} new files", registered);
        Ok(())
    }
}
