use clap::{Parser, Subcommand};
use grid_crawler_core::{logging, Catalog, Config, GridCrawler, LogLevel};
use log::{info, LevelFilter};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "grid-crawler")]
#[command(about = "Deduplicate the coordinate grids of gridded datasets")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Crawl directories and register every dataset's grid
    Crawl {
        /// Directories to crawl for datasets
        #[arg(required = true)]
        directories: Vec<PathBuf>,

        /// Path to the catalog database
        #[arg(long)]
        database: Option<PathBuf>,

        /// Files registered per transaction
        #[arg(long)]
        batch_size: Option<usize>,

        /// Verbosity level
        #[arg(short, long, action = clap::ArgAction::Count)]
        verbose: u8,

        /// Path to configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Show row counts of the catalog
    Stats {
        /// Path to the catalog database
        #[arg(long, default_value = "grid-crawler.db")]
        database: PathBuf,
    },

    /// List the grids of the catalog with their files
    Grids {
        /// Path to the catalog database
        #[arg(long, default_value = "grid-crawler.db")]
        database: PathBuf,

        /// Also list the files registered on each grid
        #[arg(long)]
        files: bool,
    },

    /// Generate default configuration file
    GenerateConfig {
        /// Path to save configuration file
        #[arg(default_value = "grid-crawler.json")]
        path: PathBuf,
    },
}

fn main() -> Result<(), anyhow::Error> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Crawl {
            directories,
            database,
            batch_size,
            verbose,
            config,
        } => {
            // Set up configuration
            let mut config = if let Some(config_path) = config {
                Config::from_file(&config_path)?
            } else {
                Config::default()
            };

            // Override config with command line arguments
            if let Some(database) = database {
                config.database_path = database;
            }
            if let Some(batch_size) = batch_size {
                config.batch_size = batch_size;
            }
            match verbose {
                0 => {}
                1 => config.log_level = LogLevel::Debug,
                _ => config.log_level = LogLevel::Trace,
            }

            config.validate()?;
            init_logging(&config)?;

            let mut crawler = GridCrawler::new(config)?;
            crawler.install_interrupt_handler()?;

            info!("Starting crawl...");
            let summary = crawler.run(&directories)?;
            info!("Crawl complete");

            println!(
                "{} datasets: {} registered, {} already known, {} failed",
                summary.discovered, summary.registered, summary.existing, summary.failed
            );
            Ok(())
        }

        Commands::Stats { database } => {
            env_logger::init();
            let catalog = Catalog::open_existing(&database)?;
            let stats = catalog.stats()?;

            println!("Catalog: {}", database.display());
            println!("  coordinates: {}", stats.coordinates);
            println!("  grids:       {}", stats.grids);
            println!("  files:       {}", stats.files);
            Ok(())
        }

        Commands::Grids { database, files } => {
            env_logger::init();
            let catalog = Catalog::open_existing(&database)?;

            for summary in catalog.grids()? {
                let coordinates: Vec<String> = summary
                    .coordinates
                    .iter()
                    .map(|c| c.0.to_string())
                    .collect();
                println!(
                    "grid {}: {} files, coordinates [{}]",
                    summary.grid.0,
                    summary.files,
                    coordinates.join(", ")
                );

                if files {
                    for file in catalog.files_for_grid(summary.grid)? {
                        println!("    {} ({})", file.filename, file.tracking_id);
                    }
                }
            }
            Ok(())
        }

        Commands::GenerateConfig { path } => {
            let config = Config::default();
            config.save_to_file(&path)?;
            println!("Configuration file generated at: {}", path.display());
            Ok(())
        }
    }
}

/// Rotating file logs when a log directory is configured, console otherwise
fn init_logging(config: &Config) -> anyhow::Result<()> {
    let level = LevelFilter::from(config.log_level);
    match &config.log_dir {
        Some(log_dir) => logging::init_logger(log_dir, level)
            .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e)),
        None => {
            env_logger::Builder::from_env(
                env_logger::Env::default().filter_or(logging::LOG_ENV, level.to_string()),
            )
            .init();
            Ok(())
        }
    }
}
