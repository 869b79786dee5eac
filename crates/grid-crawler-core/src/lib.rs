//! Core functionality for deduplicating the grids of gridded datasets.
//!
//! This library provides the foundational components for grid deduplication:
//! - Exact and perceptual hashing of coordinate arrays
//! - Coordinate and grid fingerprints
//! - A SQLite catalog storing every distinct coordinate and grid once
//! - Dataset discovery and extraction, and a crawl driver tying them together

// -- External Dependencies --

use indicatif::{ProgressBar, ProgressStyle};
use log::{info, warn};
use rayon::prelude::*;

// -- Standard Library --
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

// -- Internal Modules --
mod error;

// -- Public Re-exports --
pub use config::{Config, LogLevel};
pub use error::{Error, Result};
pub use extraction::{DatasetReader, JsonDatasetReader};
pub use ingest::{prepare_file, FileIdentity, PreparedFile};
pub use persistence::{Batch, Catalog, CatalogStats, FileRecord, GridRef, Registration};
pub use types::*;

// -- Public Modules --
pub mod config;
pub mod discovery;
pub mod extraction;
pub mod ingest;
pub mod logging;
pub mod persistence;
pub mod processing;
pub mod types;

/// Counts reported at the end of a crawl
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CrawlSummary {
    /// Files found by discovery
    pub discovered: usize,

    /// Files newly added to the catalog
    pub registered: usize,

    /// Files already present in the catalog
    pub existing: usize,

    /// Files skipped because of an error
    pub failed: usize,
}

/// Main entry point for crawling directories into a catalog
pub struct GridCrawler<R: DatasetReader = JsonDatasetReader> {
    config: Config,
    catalog: Catalog,
    reader: R,
    pool: rayon::ThreadPool,
    shutdown_requested: Arc<AtomicBool>,
}

impl GridCrawler<JsonDatasetReader> {
    /// Create a crawler reading JSON dataset descriptors
    pub fn new(config: Config) -> Result<Self> {
        Self::with_reader(config, JsonDatasetReader::new())
    }
}

impl<R: DatasetReader> GridCrawler<R> {
    /// Create a crawler using a custom dataset reader
    pub fn with_reader(config: Config, reader: R) -> Result<Self> {
        config.validate()?;
        let catalog = Catalog::open(&config.database_path)?;
        Self::with_catalog(config, catalog, reader)
    }

    /// Create a crawler writing to an already opened catalog
    pub fn with_catalog(config: Config, catalog: Catalog, reader: R) -> Result<Self> {
        config.validate()?;
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.effective_threads())
            .build()
            .map_err(|e| Error::Configuration(format!("Failed to build thread pool: {}", e)))?;

        Ok(Self {
            catalog: catalog.with_params(config.phash_params()),
            config,
            reader,
            pool,
            shutdown_requested: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Flag that stops the crawl after the current batch when set
    pub fn shutdown_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown_requested)
    }

    /// Stop the crawl on Ctrl-C. Can only be installed once per process.
    pub fn install_interrupt_handler(&self) -> Result<()> {
        let flag = self.shutdown_handle();
        ctrlc::set_handler(move || {
            warn!("Interrupt received, stopping after the current batch");
            flag.store(true, Ordering::SeqCst);
        })
        .map_err(|e| Error::Configuration(format!("Failed to install Ctrl-C handler: {}", e)))
    }

    /// Discover all dataset files in the provided directories
    pub fn discover_files(&self, directories: &[impl AsRef<Path>]) -> Result<Vec<PathBuf>> {
        discovery::discover_files(directories, &self.config)
    }

    /// Discover and register every dataset under `directories`
    pub fn run(&mut self, directories: &[impl AsRef<Path>]) -> Result<CrawlSummary> {
        info!("Discovering datasets...");
        let files = self.discover_files(directories)?;
        info!("Found {} datasets", files.len());

        self.crawl(&files)
    }

    /// Register the given files in batches
    pub fn crawl(&mut self, files: &[PathBuf]) -> Result<CrawlSummary> {
        let start_time = Instant::now();
        let mut summary = CrawlSummary {
            discovered: files.len(),
            ..CrawlSummary::default()
        };

        let progress_bar = ProgressBar::new(files.len() as u64);
        progress_bar.set_style(
            ProgressStyle::default_bar()
                .template("[{eta}] {bar:40.cyan/blue} {pos}/{len} ({percent}%) {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("##-"),
        );
        progress_bar.set_message("Fingerprinting grids...");

        for chunk in files.chunks(self.config.batch_size) {
            let result = self.crawl_chunk(chunk, &mut summary);
            progress_bar.inc(chunk.len() as u64);
            progress_bar.set_message(format!(
                "{} new, {} known, {} failed",
                summary.registered, summary.existing, summary.failed
            ));
            result?;

            if self.shutdown_requested.load(Ordering::SeqCst) {
                progress_bar.abandon_with_message("Interrupted");
                info!("Crawl interrupted: {:?}", summary);
                return Err(Error::Interrupted);
            }
        }

        progress_bar.finish_with_message(format!(
            "{} new, {} known, {} failed",
            summary.registered, summary.existing, summary.failed
        ));
        info!(
            "Crawl complete in {:.2?}: {} discovered, {} registered, {} already known, {} failed",
            start_time.elapsed(),
            summary.discovered,
            summary.registered,
            summary.existing,
            summary.failed
        );
        Ok(summary)
    }

    /// Read, fingerprint and register one chunk of files as one batch.
    ///
    /// Reading and fingerprinting run on the pool before the batch opens;
    /// only the registrations run inside the write transaction.
    fn crawl_chunk(&mut self, chunk: &[PathBuf], summary: &mut CrawlSummary) -> Result<()> {
        let reader = &self.reader;
        let datasets: Vec<(&PathBuf, Result<Dataset>)> = self
            .pool
            .install(|| chunk.par_iter().map(|path| (path, reader.read(path))).collect());

        // Natural key check before any hashing
        let mut pending: Vec<(&PathBuf, &Dataset)> = Vec::new();
        for (path, dataset) in &datasets {
            let dataset = match dataset {
                Ok(dataset) => dataset,
                Err(e) => {
                    logging::log_ingest_error(path, e);
                    summary.failed += 1;
                    continue;
                }
            };
            let identity = match FileIdentity::of(path, dataset) {
                Ok(identity) => identity,
                Err(e) => {
                    logging::log_ingest_error(path, &e);
                    summary.failed += 1;
                    continue;
                }
            };
            if self
                .catalog
                .find_file(&identity.filename, &identity.tracking_id)?
                .is_some()
            {
                logging::log_ingest_skip(path, "already registered");
                summary.existing += 1;
                continue;
            }
            pending.push((*path, dataset));
        }

        let params = self.catalog.params();
        let prepared: Vec<(&PathBuf, Result<PreparedFile<'_>>)> = self.pool.install(|| {
            pending
                .par_iter()
                .map(|(path, dataset)| (*path, prepare_file(path, *dataset, params)))
                .collect()
        });

        let mut ready = Vec::with_capacity(prepared.len());
        for (path, result) in prepared {
            match result {
                Ok(prepared) => ready.push((path, prepared)),
                // Contract violations abort the crawl before anything is written
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    logging::log_ingest_error(path, &e);
                    summary.failed += 1;
                }
            }
        }

        let mut batch = self.catalog.batch()?;
        for (path, prepared) in &ready {
            match batch.register_prepared(path, prepared) {
                Ok(registration) if registration.is_new() => summary.registered += 1,
                Ok(_) => summary.existing += 1,
                Err(e) => {
                    logging::log_ingest_error(path, &e);
                    summary.failed += 1;
                }
            }
        }
        batch.commit()
    }
}
