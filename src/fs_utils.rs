//! Filesystem utility functions
//!
//! This module provides common filesystem operations used across the codebase.

use std::fs;
use std::path::Path;

/// Recursively calculate the total size of a directory in bytes
///
/// This function walks through all files in a directory tree and sums their sizes.
/// Symbolic links are not followed, so a linked profile is not double-counted.
///
/// # Arguments
/// * `path` - The directory path to calculate size for
///
/// # Returns
/// Total size in bytes, or an IO error if directory traversal fails
pub fn dir_size(path: &Path) -> std::io::Result<u64> {
    let mut total = 0;
    for entry in fs::read_dir(path)? {
        let entry = entry?;
        let metadata = entry.metadata()?;
        if metadata.is_file() {
            total += metadata.len();
        } else if metadata.is_dir() {
            total += dir_size(&entry.path())?;
        }
    }
    Ok(total)
}
