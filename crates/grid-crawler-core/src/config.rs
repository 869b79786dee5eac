use log::LevelFilter;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::processing::perceptual::{DEFAULT_HASH_SIZE, DEFAULT_HIGHFREQ_FACTOR};
use crate::processing::PHashParams;

/// Log level for the application
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Error => LevelFilter::Error,
            LogLevel::Warn => LevelFilter::Warn,
            LogLevel::Info => LevelFilter::Info,
            LogLevel::Debug => LevelFilter::Debug,
            LogLevel::Trace => LevelFilter::Trace,
        }
    }
}

/// Configuration for a crawl
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Path to the catalog database
    pub database_path: PathBuf,

    /// Files registered per transaction
    pub batch_size: usize,

    /// Number of threads to use for fingerprinting (0 = auto)
    pub threads: usize,

    /// Maximum directory depth for discovery
    pub max_depth: Option<usize>,

    /// Whether discovery follows symbolic links
    pub follow_links: bool,

    /// File extensions considered datasets, without the leading dot
    pub extensions: Vec<String>,

    /// Side length of the perceptual hash bit block
    pub hash_size: usize,

    /// Oversampling applied before the DCT
    pub highfreq_factor: usize,

    /// Directory for rotating log files, console logging when unset
    pub log_dir: Option<PathBuf>,

    /// Log level
    pub log_level: LogLevel,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("grid-crawler.db"),
            batch_size: 64,
            threads: 0, // Auto
            max_depth: None,
            follow_links: false,
            extensions: vec!["json".to_string()],
            hash_size: DEFAULT_HASH_SIZE,
            highfreq_factor: DEFAULT_HIGHFREQ_FACTOR,
            log_dir: None,
            log_level: LogLevel::Info,
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub fn from_file(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path)
            .map_err(|e| Error::Configuration(format!("Failed to open config file: {}", e)))?;

        let config: Config = serde_json::from_reader(file)
            .map_err(|e| Error::Configuration(format!("Failed to parse config file: {}", e)))?;

        Ok(config)
    }

    /// Save configuration to a file
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let file = std::fs::File::create(path)
            .map_err(|e| Error::Configuration(format!("Failed to create config file: {}", e)))?;

        serde_json::to_writer_pretty(file, self)
            .map_err(|e| Error::Configuration(format!("Failed to write config file: {}", e)))?;

        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(Error::Configuration(
                "Batch size must be at least 1".to_string(),
            ));
        }

        if self.extensions.is_empty() {
            return Err(Error::Configuration(
                "At least one dataset extension must be given".to_string(),
            ));
        }

        // Grids hash 2-D auxiliary coordinates, so the square must fit
        self.phash_params().check(2)
    }

    pub fn phash_params(&self) -> PHashParams {
        PHashParams::new(self.hash_size, self.highfreq_factor)
    }

    /// Thread count with 0 resolved to the number of CPUs
    pub fn effective_threads(&self) -> usize {
        if self.threads == 0 {
            num_cpus::get()
        } else {
            self.threads
        }
    }

    /// Whether `path` carries one of the configured extensions
    pub fn accepts(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| {
                self.extensions
                    .iter()
                    .any(|wanted| wanted.trim_start_matches('.').eq_ignore_ascii_case(ext))
            })
            .unwrap_or(false)
    }
}
