mod catalog;
mod db;
mod models;

pub use catalog::{find_file, register, resolve_coordinate, resolve_grid, Batch, Catalog};
pub use db::{init_schema, open_database, open_in_memory};
pub use models::{
    CatalogStats, CoordinateRef, FileRecord, FileRef, GridRef, GridSummary, Registration,
    StoredCoordinate,
};

#[cfg(test)]
mod tests;
