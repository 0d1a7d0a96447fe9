use anyhow::{Context, Result};
use directories::BaseDirs;
use std::path::{Path, PathBuf};

/// Well-known subfolders every profile carries.
pub const FOLDER_NAME_MODS: &str = "mods";
pub const FOLDER_NAME_SAVES: &str = "saves";

/// Name given to the profile created by initial setup.
pub const DEFAULT_PROFILE_NAME: &str = "default_profile";

/// All computed paths used by modswap
#[derive(Debug, Clone)]
pub struct Paths {
    /// ~/.modswap
    pub config_dir: PathBuf,
    /// ~/.modswap/settings.json
    pub settings_file: PathBuf,
    /// ~/.modswap/profiles (default profiles root; settings may override it)
    pub profiles_dir: PathBuf,
}

impl Paths {
    pub fn new() -> Result<Self> {
        let base_dirs = BaseDirs::new().context("Failed to determine home directory")?;
        let home = base_dirs.home_dir();

        let config_dir = home.join(".modswap");
        let settings_file = config_dir.join("settings.json");
        let profiles_dir = config_dir.join("profiles");

        Ok(Self {
            config_dir,
            settings_file,
            profiles_dir,
        })
    }

    /// Get the path to a specific profile directory under the default root
    pub fn profile_dir(&self, name: &str) -> PathBuf {
        self.profiles_dir.join(name)
    }

    /// Check if a path is within the profiles directory
    pub fn is_in_profiles_dir(&self, path: &Path) -> bool {
        path.starts_with(&self.profiles_dir)
    }

    /// Ensure the configuration directories exist
    pub fn ensure_dirs(&self) -> Result<()> {
        std::fs::create_dir_all(&self.profiles_dir).with_context(|| {
            format!(
                "Failed to create profiles directory: {:?}",
                self.profiles_dir
            )
        })?;
        Ok(())
    }
}

/// `profile/mods` and `profile/saves` for a profile directory.
pub fn profile_subfolders(profile_dir: &Path) -> (PathBuf, PathBuf) {
    (
        profile_dir.join(FOLDER_NAME_MODS),
        profile_dir.join(FOLDER_NAME_SAVES),
    )
}
