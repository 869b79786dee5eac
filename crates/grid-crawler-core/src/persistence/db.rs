use log::info;
use rusqlite::Connection;
use std::path::Path;

use crate::error::Result;

/// Catalog schema: coordinates, grids, their many-to-many link and files.
///
/// Coordinates are unique on `(points_exact_hash, bounds_exact_hash)`. The
/// index coalesces a missing bounds hash to the empty string, which never
/// equals an INTEGER hash, so coordinates without bounds also collide.
const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS coordinate (
        id INTEGER PRIMARY KEY,
        points BLOB NOT NULL,
        points_shape TEXT NOT NULL,
        points_exact_hash INTEGER NOT NULL,
        points_perceptual_hash INTEGER NOT NULL,
        bounds BLOB,
        bounds_shape TEXT,
        bounds_exact_hash INTEGER,
        bounds_lower_perceptual_hash INTEGER,
        bounds_upper_perceptual_hash INTEGER
    );

    CREATE UNIQUE INDEX IF NOT EXISTS idx_coordinate_exact_hash
        ON coordinate(points_exact_hash, COALESCE(bounds_exact_hash, ''));

    CREATE TABLE IF NOT EXISTS grid (
        id INTEGER PRIMARY KEY
    );

    CREATE TABLE IF NOT EXISTS grid_coordinate (
        grid_id INTEGER NOT NULL REFERENCES grid(id),
        coordinate_id INTEGER NOT NULL REFERENCES coordinate(id),
        PRIMARY KEY (grid_id, coordinate_id)
    );

    CREATE INDEX IF NOT EXISTS idx_grid_coordinate_coordinate
        ON grid_coordinate(coordinate_id);

    CREATE TABLE IF NOT EXISTS file (
        id INTEGER PRIMARY KEY,
        filename TEXT NOT NULL,
        tracking_id TEXT NOT NULL,
        grid_id INTEGER NOT NULL REFERENCES grid(id),
        UNIQUE (filename, tracking_id)
    );

    CREATE INDEX IF NOT EXISTS idx_file_grid ON file(grid_id);
";

/// Open (creating if needed) the catalog database at `path`
pub fn open_database(path: &Path) -> Result<Connection> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let conn = Connection::open(path)?;

    // Set pragmas for performance
    conn.execute_batch(
        "PRAGMA journal_mode = WAL;
         PRAGMA synchronous = NORMAL;
         PRAGMA temp_store = MEMORY;
         PRAGMA cache_size = 10000;
         PRAGMA busy_timeout = 10000;",
    )?;
    init_schema(&conn)?;

    info!("Catalog database initialized at {}", path.display());
    Ok(conn)
}

/// Open a throwaway catalog held in memory
pub fn open_in_memory() -> Result<Connection> {
    let conn = Connection::open_in_memory()?;
    init_schema(&conn)?;
    Ok(conn)
}

/// Create the catalog tables if they do not exist yet
pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.execute_batch(SCHEMA)?;
    Ok(())
}
