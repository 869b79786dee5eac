use log::warn;
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::config::Config;
use crate::error::{Error, Result};

/// Discover dataset files in the provided directories
pub fn discover_files<P: AsRef<Path>>(directories: &[P], config: &Config) -> Result<Vec<PathBuf>> {
    // Convert to a collection of PathBufs first
    let paths: Vec<PathBuf> = directories
        .iter()
        .map(|dir| dir.as_ref().to_path_buf())
        .collect();

    let mut files = paths
        .par_iter()
        .map(|dir| discover_files_in_directory(dir, config))
        .collect::<Vec<Result<Vec<PathBuf>>>>()
        .into_iter()
        .try_fold(Vec::new(), |mut acc, result| {
            acc.extend(result?);
            Ok::<_, Error>(acc)
        })?;

    // Overlapping roots would otherwise register a file twice in one batch
    files.sort();
    files.dedup();
    Ok(files)
}

/// Discover dataset files in a single directory
fn discover_files_in_directory(directory: &Path, config: &Config) -> Result<Vec<PathBuf>> {
    if !directory.exists() {
        return Err(Error::FileNotFound(directory.to_path_buf()));
    }

    let max_depth = config.max_depth.unwrap_or(usize::MAX);

    let mut files = Vec::new();
    for entry in WalkDir::new(directory)
        .max_depth(max_depth)
        .follow_links(config.follow_links)
        .into_iter()
    {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Skipping unreadable entry under {}: {}", directory.display(), e);
                continue;
            }
        };

        if entry.file_type().is_file() && config.accepts(entry.path()) {
            files.push(entry.into_path());
        }
    }

    Ok(files)
}
