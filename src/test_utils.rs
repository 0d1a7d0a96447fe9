//! Test utilities shared across test modules
//!
//! This module provides common helper functions for testing, avoiding
//! duplication across multiple test suites.

use crate::paths::Paths;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Create a Paths struct for testing using a temporary directory,
/// mimicking the real ~/.modswap layout.
pub fn setup_test_paths(temp_dir: &TempDir) -> Paths {
    Paths {
        config_dir: temp_dir.path().join(".modswap"),
        settings_file: temp_dir.path().join(".modswap/settings.json"),
        profiles_dir: temp_dir.path().join(".modswap/profiles"),
    }
}

/// Create a profile directory under `root` with populated `mods` and
/// `saves` subfolders. The marker file lets tests verify content survived
/// a move or is reachable through a link.
pub fn seed_profile(root: &Path, name: &str) -> PathBuf {
    let profile = root.join(name);
    fs::create_dir_all(profile.join("mods")).unwrap();
    fs::create_dir_all(profile.join("saves")).unwrap();
    fs::write(profile.join("mods").join("marker.txt"), name).unwrap();
    profile
}
