//! `termspec clean-cache` (spec.md section 6).

use std::path::{Path, PathBuf};

use anyhow::Result;
use colored::Colorize;
use termspec_core::Manifest;

/// Deletes the `.cache` directory (the persisted reference store, its
/// history snapshots, and `console-messages.json`) for the project rooted at
/// `base_dir`.
///
/// Returns `0` on success, `2` if the manifest could not be loaded.
pub fn run(manifest: Option<PathBuf>, base_dir: &Path) -> Result<i32> {
    let manifest = match manifest {
        Some(path) => termspec_core::Manifest::load_from_file(&path, base_dir.to_path_buf()),
        None => Manifest::load(base_dir),
    };

    let manifest = match manifest {
        Ok(manifest) => manifest,
        Err(err) => {
            eprintln!("{} {err}", "error:".red().bold());
            return Ok(2);
        }
    };

    let cache_dir = manifest.cache_directory();
    if cache_dir.is_dir() {
        std::fs::remove_dir_all(&cache_dir)?;
        println!("{} removed {}", "clean-cache:".green().bold(), cache_dir.display());
    } else {
        println!("{} nothing to remove", "clean-cache:".green().bold());
    }

    Ok(0)
}
