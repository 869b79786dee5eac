use log::{debug, error, info, LevelFilter};
use std::path::Path;

// For file-based logging with rotation
use log4rs::append::rolling_file::policy::compound::roll::fixed_window::FixedWindowRoller;
use log4rs::append::rolling_file::policy::compound::trigger::size::SizeTrigger;
use log4rs::append::rolling_file::policy::compound::CompoundPolicy;
use log4rs::append::rolling_file::RollingFileAppender;
use log4rs::config::{Appender, Config, Root};
use log4rs::encode::pattern::PatternEncoder;

use crate::persistence::Registration;

/// Environment variable overriding the configured log level
pub const LOG_ENV: &str = "GRID_CRAWLER_LOG";

/// Initialize the logger with timestamp, log level, and module path.
/// Logs are written to file only to avoid interfering with progress bars.
pub fn init_logger(log_dir: &Path, level: LevelFilter) -> Result<(), Box<dyn std::error::Error>> {
    std::fs::create_dir_all(log_dir)?;

    let log_file_path = log_dir.join("grid-crawler.log");
    let archived_logs_pattern = format!("{}/grid-crawler.{{}}.log", log_dir.display());

    // Rotate at 10MB, keep 5 archived log files
    let file_trigger = SizeTrigger::new(10 * 1024 * 1024);
    let file_roller = FixedWindowRoller::builder()
        .build(&archived_logs_pattern, 5)
        .map_err(|e| format!("Failed to create log roller: {}", e))?;
    let compound_policy = CompoundPolicy::new(Box::new(file_trigger), Box::new(file_roller));

    let rolling_file = RollingFileAppender::builder()
        .encoder(Box::new(PatternEncoder::new(
            "{d(%Y-%m-%d %H:%M:%S)} [{l}] [{M}:{L}] - {m}{n}",
        )))
        .build(&log_file_path, Box::new(compound_policy))
        .map_err(|e| format!("Failed to create log appender: {}", e))?;

    let level = std::env::var(LOG_ENV)
        .ok()
        .and_then(|value| value.parse::<LevelFilter>().ok())
        .unwrap_or(level);

    let config = Config::builder()
        .appender(Appender::builder().build("file", Box::new(rolling_file)))
        .build(Root::builder().appender("file").build(level))
        .map_err(|e| format!("Failed to build log config: {}", e))?;

    log4rs::init_config(config).map_err(|e| format!("Failed to initialize log4rs: {}", e))?;

    info!("Grid crawler started");
    info!("Logging to file: {}", log_file_path.display());
    Ok(())
}

/// Log a file that could not be registered
pub fn log_ingest_error(path: &Path, error: &dyn std::error::Error) {
    error!(
        "Registration failed - Path: {}, Error: {}",
        path.display(),
        error
    );
}

/// Log a file left out of a crawl before any hashing
pub fn log_ingest_skip(path: &Path, reason: &str) {
    debug!("Skipped - Path: {}, Reason: {}", path.display(), reason);
}

/// Log the outcome of a registration
pub fn log_registration(path: &Path, registration: &Registration) {
    let record = registration.record();
    if registration.is_new() {
        info!(
            "REGISTERED - Path: {}, File: {}, Grid: {}",
            path.display(),
            record.id.0,
            record.grid.0
        );
    } else {
        debug!(
            "ALREADY KNOWN - Path: {}, File: {}, Grid: {}",
            path.display(),
            record.id.0,
            record.grid.0
        );
    }
}
