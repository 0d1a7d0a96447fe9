//! Persistent settings, stored as JSON in ~/.modswap/settings.json.
//!
//! The engine and synchronizer treat persistence as an external concern:
//! they only require a save hook ([`SettingsStore`]) invoked after every
//! state-changing operation. This module provides the JSON implementation,
//! with atomic writes and an fs2-locked handle for concurrent safety.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::paths::Paths;
use crate::registry::{Installation, Registry};
use crate::strategy::LinkStrategy;

/// On-disk settings shape.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Settings {
    /// Default user-data path the game reads `mods`/`saves` from
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_data_path: Option<PathBuf>,

    /// Root directory containing one subdirectory per profile
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profiles_root_path: Option<PathBuf>,

    /// Chosen link strategy; absent until the user picks one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strategy: Option<LinkStrategy>,

    /// Directory of the currently active profile, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active_profile_path: Option<PathBuf>,

    /// Whether initial setup has completed
    #[serde(default)]
    pub has_initialized: bool,

    /// Known game installations
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub installations: Vec<Installation>,

    /// Profile name → installation name
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub profile_installations: BTreeMap<String, String>,

    /// When the settings were last updated
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Settings {
    /// Read settings from file, returning defaults if the file doesn't exist
    pub fn read(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings file: {:?}", path))?;

        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse settings file: {:?}", path))
    }

    /// Write settings to file atomically (write to temp file, then rename),
    /// so the file is never left corrupted mid-write.
    pub fn write(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create settings directory: {:?}", parent))?;
        }

        let content = serde_json::to_string_pretty(self).context("Failed to serialize settings")?;

        let temp_path = path.with_extension("json.tmp");
        std::fs::write(&temp_path, &content)
            .with_context(|| format!("Failed to write temp settings file: {:?}", temp_path))?;

        std::fs::rename(&temp_path, path).with_context(|| {
            format!("Failed to rename settings file: {:?} -> {:?}", temp_path, path)
        })
    }

    /// Build a registry from persisted settings.
    ///
    /// Fails when initial setup never recorded a user-data path; the
    /// profiles root falls back to the default location.
    pub fn to_registry(&self, paths: &Paths) -> Result<Registry> {
        let user_data = self
            .user_data_path
            .clone()
            .context("No user-data path configured. Run `modswap init` first")?;
        let profiles_root = self
            .profiles_root_path
            .clone()
            .unwrap_or_else(|| paths.profiles_dir.clone());

        let mut registry = Registry::new(user_data, profiles_root);
        registry.strategy = self.strategy;
        registry.has_initialized = self.has_initialized;
        registry.installations = self.installations.clone();
        registry.profile_installations = self.profile_installations.clone();
        registry.set_active(self.active_profile_path.as_deref());
        Ok(registry)
    }

    /// Snapshot the persistable parts of a registry.
    pub fn from_registry(registry: &Registry) -> Self {
        Self {
            user_data_path: Some(registry.user_data_path.clone()),
            profiles_root_path: Some(registry.profiles_root.clone()),
            strategy: registry.strategy,
            active_profile_path: registry.active_profile_path().map(Path::to_path_buf),
            has_initialized: registry.has_initialized,
            installations: registry.installations.clone(),
            profile_installations: registry.profile_installations.clone(),
            updated_at: Some(Utc::now()),
        }
    }
}

/// Save hook the synchronizer calls after every state-changing operation.
pub trait SettingsStore {
    fn save(&mut self, registry: &Registry) -> Result<()>;
}

/// The JSON-backed store used by the CLI.
pub struct JsonSettingsStore {
    path: PathBuf,
}

impl JsonSettingsStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

impl SettingsStore for JsonSettingsStore {
    fn save(&mut self, registry: &Registry) -> Result<()> {
        let mut locked = LockedSettings::lock(&self.path)?;
        locked.replace(Settings::from_registry(registry))
    }
}

/// A store that remembers nothing; for tests and dry runs.
#[derive(Default)]
pub struct NullSettingsStore {
    pub saves: usize,
}

impl SettingsStore for NullSettingsStore {
    fn save(&mut self, _registry: &Registry) -> Result<()> {
        self.saves += 1;
        Ok(())
    }
}

/// A locked settings file handle for safe concurrent access
pub struct LockedSettings {
    file: File,
    settings: Settings,
    path: PathBuf,
}

impl LockedSettings {
    /// Open and lock the settings file for exclusive access
    pub fn lock(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create settings directory: {:?}", parent))?;
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .with_context(|| format!("Failed to open settings file: {:?}", path))?;

        file.lock_exclusive()
            .with_context(|| format!("Failed to lock settings file: {:?}", path))?;

        let settings = Self::read_from_file(&file, path)?;

        Ok(Self {
            file,
            settings,
            path: path.to_path_buf(),
        })
    }

    fn read_from_file(mut file: &File, path: &Path) -> Result<Settings> {
        let mut content = String::new();
        file.read_to_string(&mut content)
            .with_context(|| format!("Failed to read settings file: {:?}", path))?;

        if content.trim().is_empty() {
            return Ok(Settings::default());
        }

        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse settings file: {:?}", path))
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Update and save the settings
    pub fn update<F>(&mut self, f: F) -> Result<()>
    where
        F: FnOnce(&mut Settings),
    {
        f(&mut self.settings);
        self.settings.updated_at = Some(Utc::now());
        self.save()
    }

    /// Replace the settings wholesale and save
    pub fn replace(&mut self, settings: Settings) -> Result<()> {
        self.settings = settings;
        self.save()
    }

    fn save(&mut self) -> Result<()> {
        let content =
            serde_json::to_string_pretty(&self.settings).context("Failed to serialize settings")?;

        self.file
            .set_len(0)
            .with_context(|| format!("Failed to truncate settings file: {:?}", self.path))?;
        self.file
            .seek(SeekFrom::Start(0))
            .with_context(|| format!("Failed to seek settings file: {:?}", self.path))?;
        self.file
            .write_all(content.as_bytes())
            .with_context(|| format!("Failed to write settings file: {:?}", self.path))?;
        self.file
            .sync_all()
            .with_context(|| format!("Failed to sync settings file: {:?}", self.path))?;

        Ok(())
    }
}

impl Drop for LockedSettings {
    fn drop(&mut self) {
        // Release the lock (ignore errors during drop)
        let _ = fs2::FileExt::unlock(&self.file);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_settings_default() {
        let settings = Settings::default();
        assert!(settings.strategy.is_none());
        assert!(settings.active_profile_path.is_none());
        assert!(!settings.has_initialized);
    }

    #[test]
    fn test_settings_read_nonexistent() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nonexistent.json");
        let settings = Settings::read(&path).unwrap();
        assert!(settings.user_data_path.is_none());
    }

    #[test]
    fn test_settings_write_and_read() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("settings.json");

        let settings = Settings {
            user_data_path: Some(PathBuf::from("/data")),
            profiles_root_path: Some(PathBuf::from("/profiles")),
            strategy: Some(LinkStrategy::Symlink),
            active_profile_path: Some(PathBuf::from("/profiles/foo")),
            has_initialized: true,
            updated_at: Some(Utc::now()),
            ..Default::default()
        };
        settings.write(&path).unwrap();

        let read_back = Settings::read(&path).unwrap();
        assert_eq!(read_back.strategy, Some(LinkStrategy::Symlink));
        assert_eq!(
            read_back.active_profile_path,
            Some(PathBuf::from("/profiles/foo"))
        );
        assert!(read_back.has_initialized);
    }

    #[test]
    fn test_strategy_serializes_lowercase() {
        let settings = Settings {
            strategy: Some(LinkStrategy::Junction),
            ..Default::default()
        };
        let json = serde_json::to_string(&settings).unwrap();
        assert!(json.contains("\"junction\""));
    }

    #[test]
    fn test_locked_settings_update() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("settings.json");

        {
            let mut locked = LockedSettings::lock(&path).unwrap();
            locked
                .update(|s| {
                    s.strategy = Some(LinkStrategy::Move);
                    s.has_initialized = true;
                })
                .unwrap();
        }

        let settings = Settings::read(&path).unwrap();
        assert_eq!(settings.strategy, Some(LinkStrategy::Move));
        assert!(settings.has_initialized);
        assert!(settings.updated_at.is_some());
    }

    #[test]
    fn test_to_registry_needs_user_data_path() {
        let temp = TempDir::new().unwrap();
        let paths = crate::test_utils::setup_test_paths(&temp);

        // Fresh settings never saw `init`
        let err = Settings::default().to_registry(&paths).unwrap_err();
        assert!(err.to_string().contains("modswap init"));

        // Configured settings map over; profiles root falls back to the
        // default location when never overridden
        let settings = Settings {
            user_data_path: Some(temp.path().join("user_data")),
            strategy: Some(LinkStrategy::Move),
            has_initialized: true,
            ..Default::default()
        };
        let registry = settings.to_registry(&paths).unwrap();
        assert_eq!(registry.profiles_root, paths.profiles_dir);
        assert_eq!(registry.strategy, Some(LinkStrategy::Move));
        assert!(registry.has_initialized);
    }

    #[test]
    fn test_store_roundtrips_registry() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("settings.json");

        let mut registry = Registry::new(
            temp.path().join("user_data"),
            temp.path().join("profiles"),
        );
        registry.strategy = Some(LinkStrategy::Symlink);
        registry.has_initialized = true;
        registry
            .profile_installations
            .insert("foo".into(), "stable".into());

        let mut store = JsonSettingsStore::new(path.clone());
        store.save(&registry).unwrap();

        let settings = Settings::read(&path).unwrap();
        assert_eq!(settings.strategy, Some(LinkStrategy::Symlink));
        assert_eq!(
            settings.profile_installations.get("foo").map(String::as_str),
            Some("stable")
        );
    }
}
