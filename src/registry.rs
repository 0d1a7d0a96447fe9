//! The canonical in-memory profile list and activation state.
//!
//! The registry exclusively owns the profile list and the active pointer.
//! The activation engine only ever sees directory paths; all state updates
//! happen here, after an engine operation has succeeded.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::strategy::LinkStrategy;

/// A known game installation that profiles can be associated with.
///
/// Installations are keyed by name; uniqueness is enforced
/// case-insensitively when one is added.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Installation {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub executable_path: Option<PathBuf>,
    #[serde(default)]
    pub use_custom_user_data: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_user_data_path: Option<PathBuf>,
}

impl Installation {
    /// The user-data override, if the flag is set and a path was actually
    /// configured. A set flag with no path falls back to the default.
    pub fn user_data_override(&self) -> Option<&Path> {
        if self.use_custom_user_data {
            self.custom_user_data_path.as_deref()
        } else {
            None
        }
    }
}

/// One subfolder of the profiles root, holding `mods` and `saves`.
#[derive(Debug, Clone)]
pub struct Profile {
    directory: PathBuf,
    name: String,
    is_directory: bool,
    /// Name of the associated installation, if any.
    pub installation_name: Option<String>,
    pub active: bool,
}

impl Profile {
    pub fn new(directory: PathBuf, active: bool) -> Self {
        let name = display_name(&directory);
        let is_directory = directory.is_dir();
        Self {
            directory,
            name,
            is_directory,
            installation_name: None,
            active,
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Display name, derived from the directory's current basename.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_directory(&self) -> bool {
        self.is_directory
    }

    /// Point this profile at a new directory (after a rename on disk).
    /// The display name follows the basename.
    pub fn set_directory(&mut self, directory: PathBuf) {
        self.name = display_name(&directory);
        self.directory = directory;
    }
}

fn display_name(directory: &Path) -> String {
    directory
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Holds data commonly loaded and saved: paths, strategy, installations,
/// the profile list and the active pointer.
#[derive(Debug, Clone)]
pub struct Registry {
    pub user_data_path: PathBuf,
    pub profiles_root: PathBuf,
    pub strategy: Option<LinkStrategy>,
    pub has_initialized: bool,
    pub installations: Vec<Installation>,
    /// Persisted profile-name → installation-name map. Re-associates
    /// profiles with installations across restarts.
    pub profile_installations: BTreeMap<String, String>,
    profiles: Vec<Profile>,
    active_profile_path: Option<PathBuf>,
}

impl Registry {
    pub fn new(user_data_path: PathBuf, profiles_root: PathBuf) -> Self {
        Self {
            user_data_path,
            profiles_root,
            strategy: None,
            has_initialized: false,
            installations: Vec::new(),
            profile_installations: BTreeMap::new(),
            profiles: Vec::new(),
            active_profile_path: None,
        }
    }

    pub fn profiles(&self) -> &[Profile] {
        &self.profiles
    }

    pub fn active_profile_path(&self) -> Option<&Path> {
        self.active_profile_path.as_deref()
    }

    pub fn active_profile(&self) -> Option<&Profile> {
        let active = self.active_profile_path.as_deref()?;
        self.profiles.iter().find(|p| p.directory() == active)
    }

    /// Mark the profile at `path` active, clearing any previous one.
    /// At most one profile is ever active.
    pub fn set_active(&mut self, path: Option<&Path>) {
        for profile in &mut self.profiles {
            profile.active = Some(profile.directory.as_path()) == path;
        }
        self.active_profile_path = path.map(Path::to_path_buf);
    }

    pub fn find_profile(&self, path: &Path) -> Option<&Profile> {
        self.profiles.iter().find(|p| p.directory() == path)
    }

    /// Case-insensitive installation lookup.
    pub fn find_installation(&self, name: &str) -> Option<&Installation> {
        self.installations
            .iter()
            .find(|i| i.name.eq_ignore_ascii_case(name))
    }

    /// Persisted installation name for a profile name, if one was recorded.
    pub fn find_installation_name_for_profile(&self, profile_name: &str) -> Option<&str> {
        self.profile_installations
            .get(profile_name)
            .map(String::as_str)
    }

    /// Add an installation; names must be unique ignoring case.
    pub fn add_installation(&mut self, installation: Installation) -> Result<(), String> {
        if self.find_installation(&installation.name).is_some() {
            return Err(format!(
                "installation name already in use: {}",
                installation.name
            ));
        }
        self.installations.push(installation);
        Ok(())
    }

    /// Fix up the name-keyed association map after an installation rename.
    /// Without this, every profile pointing at the old name silently loses
    /// its association.
    pub fn repair_installation_rename(&mut self, old_name: &str, new_name: &str) {
        for value in self.profile_installations.values_mut() {
            if value.eq_ignore_ascii_case(old_name) {
                *value = new_name.to_string();
            }
        }
        for profile in &mut self.profiles {
            if let Some(tag) = &profile.installation_name {
                if tag.eq_ignore_ascii_case(old_name) {
                    profile.installation_name = Some(new_name.to_string());
                }
            }
        }
    }

    /// The user-data path activation should use for this profile: the
    /// associated installation's override when configured, the default
    /// otherwise.
    pub fn user_data_for(&self, profile: &Profile) -> &Path {
        profile
            .installation_name
            .as_deref()
            .and_then(|name| self.find_installation(name))
            .and_then(|i| i.user_data_override())
            .unwrap_or(&self.user_data_path)
    }

    /// Case-insensitive check against the current profile names.
    pub fn name_in_use(&self, name: &str) -> bool {
        self.profiles
            .iter()
            .any(|p| p.name().eq_ignore_ascii_case(name))
    }

    /// Rebuild the profile list from the profiles root.
    ///
    /// Plain files are skipped. The profile matching the persisted active
    /// path is marked active; profiles without a recorded installation get
    /// the first known one.
    pub fn scan_profiles(&mut self) -> std::io::Result<()> {
        let mut profiles = Vec::new();

        if self.profiles_root.exists() {
            for entry in fs::read_dir(&self.profiles_root)? {
                let entry = entry?;
                let path = entry.path();
                if path.is_file() {
                    continue;
                }

                let is_active = Some(path.as_path()) == self.active_profile_path.as_deref();
                let mut profile = Profile::new(path, is_active);
                profile.installation_name = self
                    .find_installation_name_for_profile(profile.name())
                    .map(str::to_string)
                    .or_else(|| self.installations.first().map(|i| i.name.clone()));
                profiles.push(profile);
            }
        }

        self.profiles = profiles;
        self.sort_profiles();
        Ok(())
    }

    /// Insert a freshly discovered profile and re-sort.
    pub fn insert_profile(&mut self, mut profile: Profile) {
        if profile.installation_name.is_none() {
            profile.installation_name = self.installations.first().map(|i| i.name.clone());
        }
        self.profiles.push(profile);
        self.sort_profiles();
    }

    /// Remove the profile whose directory is `path`, returning it.
    pub fn remove_profile(&mut self, path: &Path) -> Option<Profile> {
        let idx = self.profiles.iter().position(|p| p.directory() == path)?;
        let removed = self.profiles.remove(idx);
        if self.active_profile_path.as_deref() == Some(path) {
            self.active_profile_path = None;
        }
        Some(removed)
    }

    /// Sort: directories before non-directories, then case-insensitive
    /// name. Keeps the presented order stable regardless of filesystem
    /// enumeration order.
    pub fn sort_profiles(&mut self) {
        self.profiles.sort_by(|a, b| {
            b.is_directory()
                .cmp(&a.is_directory())
                .then_with(|| a.name().to_lowercase().cmp(&b.name().to_lowercase()))
        });
    }
}
