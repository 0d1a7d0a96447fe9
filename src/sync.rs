//! Keeps the registry, the filesystem, and the settings file in agreement.
//!
//! All mutations funnel through the [`Synchronizer`], which owns the
//! registry and a settings-store save hook. Watcher events are applied
//! serially; events caused by our own operations are filtered out through
//! a one-shot suppression set registered before each mutation.

use anyhow::{Context, Result, anyhow};
use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::engine::{self, PreviousActive};
use crate::error::ActivationError;
use crate::registry::{Profile, Registry};
use crate::settings::SettingsStore;
use crate::strategy::LinkStrategy;
use crate::watcher::WatchEvent;

/// A condition the synchronizer noticed but cannot resolve on its own.
/// The presentation layer decides how loudly to surface it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncWarning {
    /// The active profile's directory vanished out-of-band; its links at
    /// the user-data path were removed.
    ActiveProfileDeleted { profile: PathBuf },
    /// Move strategy only: the active profile's directory vanished, but
    /// its content still sits at the user-data path with nowhere to go
    /// back to. Not auto-repaired.
    OrphanedUserData { user_data: PathBuf },
    /// Cleanup after an out-of-band deletion itself failed.
    CleanupFailed { profile: PathBuf, message: String },
}

impl fmt::Display for SyncWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncWarning::ActiveProfileDeleted { profile } => write!(
                f,
                "active profile {} was deleted externally; its links were removed",
                profile.display()
            ),
            SyncWarning::OrphanedUserData { user_data } => write!(
                f,
                "active profile was deleted externally; its content remains at {} and must be moved manually",
                user_data.display()
            ),
            SyncWarning::CleanupFailed { profile, message } => write!(
                f,
                "cleanup after external deletion of {} failed: {}",
                profile.display(),
                message
            ),
        }
    }
}

/// Serial consumer of watcher events and entry point for all profile
/// operations. Owns the registry; saves through the store after every
/// state change.
pub struct Synchronizer<S: SettingsStore> {
    registry: Registry,
    store: S,
    suppressed: HashSet<PathBuf>,
}

impl<S: SettingsStore> Synchronizer<S> {
    pub fn new(registry: Registry, store: S) -> Self {
        Self {
            registry,
            store,
            suppressed: HashSet::new(),
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut Registry {
        &mut self.registry
    }

    pub fn into_registry(self) -> Registry {
        self.registry
    }

    /// Register paths whose next watcher event is ours and must be
    /// dropped. Consumed one event per registration.
    pub fn ignore<I>(&mut self, paths: I)
    where
        I: IntoIterator<Item = PathBuf>,
    {
        self.suppressed.extend(paths);
    }

    /// Un-register paths, e.g. after the operation that registered them
    /// failed before touching the filesystem.
    pub fn stop_ignoring<'a, I>(&mut self, paths: I)
    where
        I: IntoIterator<Item = &'a Path>,
    {
        for path in paths {
            self.suppressed.remove(path);
        }
    }

    /// Apply one watcher event to the registry. Suppressed events are
    /// consumed silently; everything the caller should relay to the user
    /// comes back as warnings.
    pub fn apply_event(&mut self, event: WatchEvent) -> Result<Vec<SyncWarning>> {
        if self.suppressed.remove(event.path()) {
            return Ok(Vec::new());
        }

        match event {
            WatchEvent::Created(path) => self.on_created(path),
            WatchEvent::Deleted(path) => self.on_deleted(path),
            // Content changes inside a profile are none of our business.
            WatchEvent::Modified(_) => Ok(Vec::new()),
        }
    }

    fn on_created(&mut self, path: PathBuf) -> Result<Vec<SyncWarning>> {
        if !path.is_dir() || self.registry.find_profile(&path).is_some() {
            return Ok(Vec::new());
        }

        self.registry.insert_profile(Profile::new(path, false));
        self.store.save(&self.registry)?;
        Ok(Vec::new())
    }

    fn on_deleted(&mut self, path: PathBuf) -> Result<Vec<SyncWarning>> {
        let Some(removed) = self.registry.remove_profile(&path) else {
            return Ok(Vec::new());
        };

        let mut warnings = Vec::new();
        if removed.active {
            let user_data = self.registry.user_data_for(&removed).to_path_buf();
            match self.registry.strategy {
                // Content is stranded at the user-data path; repairing
                // would mean guessing where the user wanted it.
                Some(LinkStrategy::Move) => {
                    warnings.push(SyncWarning::OrphanedUserData { user_data });
                }
                Some(strategy) => match strategy.revert(&user_data, &path) {
                    Ok(()) => warnings.push(SyncWarning::ActiveProfileDeleted {
                        profile: path.clone(),
                    }),
                    Err(e) => warnings.push(SyncWarning::CleanupFailed {
                        profile: path.clone(),
                        message: e.to_string(),
                    }),
                },
                None => {}
            }
        }

        self.store.save(&self.registry)?;
        Ok(warnings)
    }

    /// Activate the profile at `path`, deactivating the currently active
    /// one first. Each side uses its own installation's user-data path.
    pub fn activate(&mut self, path: &Path) -> Result<()> {
        let strategy = self.registry.strategy;
        let new_profile = self
            .registry
            .find_profile(path)
            .ok_or_else(|| anyhow!("No such profile: {}", path.display()))?;
        let new_user_data = self.registry.user_data_for(new_profile).to_path_buf();

        let previous = self.registry.active_profile().map(|p| {
            (
                p.directory().to_path_buf(),
                self.registry.user_data_for(p).to_path_buf(),
            )
        });

        let result = engine::switch_active_to(
            strategy,
            previous.as_ref().map(|(dir, user_data)| PreviousActive {
                profile_dir: dir,
                user_data_dir: user_data,
            }),
            path,
            &new_user_data,
        );

        match result {
            Ok(()) => {
                self.registry.set_active(Some(path));
                self.store.save(&self.registry)?;
                Ok(())
            }
            // The old profile is deactivated, the new one never came up.
            Err(e @ ActivationError::PartialFailure { .. }) => {
                self.registry.set_active(None);
                self.store.save(&self.registry)?;
                Err(e.into())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Deactivate whatever is active. Nothing active is a no-op success.
    pub fn deactivate(&mut self) -> Result<()> {
        let Some(active) = self.registry.active_profile() else {
            return Ok(());
        };
        let profile_dir = active.directory().to_path_buf();
        let user_data = self.registry.user_data_for(active).to_path_buf();

        engine::deactivate(self.registry.strategy, &profile_dir, &user_data)?;
        self.registry.set_active(None);
        self.store.save(&self.registry)?;
        Ok(())
    }

    /// Rename the profile at `path` to `new_name`, re-linking when it is
    /// active and carrying its installation association over.
    pub fn rename(&mut self, path: &Path, new_name: &str) -> Result<PathBuf> {
        let profile = self
            .registry
            .find_profile(path)
            .ok_or_else(|| anyhow!("No such profile: {}", path.display()))?;
        if self.registry.name_in_use(new_name) {
            anyhow::bail!("Profile name already in use: {}", new_name);
        }

        let old_name = profile.name().to_string();
        let is_active = profile.active;
        let user_data = self.registry.user_data_for(profile).to_path_buf();
        let new_dir = path
            .parent()
            .map(|p| p.join(new_name))
            .context("Profile directory has no parent")?;

        // The rename shows up as Deleted(old) + Created(new)
        self.ignore([path.to_path_buf(), new_dir.clone()]);

        let renamed =
            match engine::rename_profile(self.registry.strategy, path, new_name, &user_data, is_active) {
                Ok(dir) => dir,
                Err(e) => {
                    self.stop_ignoring([path, new_dir.as_path()]);
                    return Err(e.into());
                }
            };

        if let Some(installation) = self.registry.profile_installations.remove(&old_name) {
            self.registry
                .profile_installations
                .insert(new_name.to_string(), installation);
        }

        let mut removed = self
            .registry
            .remove_profile(path)
            .context("Profile disappeared from registry during rename")?;
        removed.set_directory(renamed.clone());
        self.registry.insert_profile(removed);
        if is_active {
            self.registry.set_active(Some(&renamed));
        }

        self.store.save(&self.registry)?;
        Ok(renamed)
    }

    /// Create a new empty profile directory and register it.
    pub fn create(&mut self, name: &str) -> Result<PathBuf> {
        if self.registry.name_in_use(name) {
            anyhow::bail!("Profile name already in use: {}", name);
        }

        let new_dir = self.registry.profiles_root.join(name);
        self.ignore([new_dir.clone()]);

        let created = match engine::create_profile(&self.registry.profiles_root, name) {
            Ok(dir) => dir,
            Err(e) => {
                self.stop_ignoring([new_dir.as_path()]);
                return Err(e.into());
            }
        };

        self.registry.insert_profile(Profile::new(created.clone(), false));
        self.store.save(&self.registry)?;
        Ok(created)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::NullSettingsStore;
    use crate::test_utils::seed_profile;
    use std::fs;
    use tempfile::TempDir;

    fn synchronizer_at(temp: &TempDir, strategy: Option<LinkStrategy>) -> Synchronizer<NullSettingsStore> {
        let user_data = temp.path().join("user_data");
        let root = temp.path().join("profiles");
        fs::create_dir_all(&user_data).unwrap();
        fs::create_dir_all(&root).unwrap();

        let mut registry = Registry::new(user_data, root);
        registry.strategy = strategy;
        registry.scan_profiles().unwrap();
        Synchronizer::new(registry, NullSettingsStore::default())
    }

    #[test]
    fn test_suppression_is_one_shot() {
        let temp = TempDir::new().unwrap();
        let mut sync = synchronizer_at(&temp, Some(LinkStrategy::Move));
        let path = seed_profile(&temp.path().join("profiles"), "foo");

        sync.ignore([path.clone()]);

        // First event consumed silently, registry untouched
        sync.apply_event(WatchEvent::Created(path.clone())).unwrap();
        assert!(sync.registry().find_profile(&path).is_none());

        // Second event for the same path goes through
        sync.apply_event(WatchEvent::Created(path.clone())).unwrap();
        assert!(sync.registry().find_profile(&path).is_some());
    }

    #[test]
    fn test_stop_ignoring_unregisters() {
        let temp = TempDir::new().unwrap();
        let mut sync = synchronizer_at(&temp, Some(LinkStrategy::Move));
        let path = seed_profile(&temp.path().join("profiles"), "foo");

        sync.ignore([path.clone()]);
        sync.stop_ignoring([path.as_path()]);

        sync.apply_event(WatchEvent::Created(path.clone())).unwrap();
        assert!(sync.registry().find_profile(&path).is_some());
    }

    #[test]
    fn test_created_event_registers_inactive_profile() {
        let temp = TempDir::new().unwrap();
        let mut sync = synchronizer_at(&temp, Some(LinkStrategy::Move));
        let path = seed_profile(&temp.path().join("profiles"), "dropped_in");

        let warnings = sync.apply_event(WatchEvent::Created(path.clone())).unwrap();
        assert!(warnings.is_empty());

        let profile = sync.registry().find_profile(&path).expect("registered");
        assert!(!profile.active);
        assert_eq!(sync.store.saves, 1);
    }

    #[test]
    fn test_created_event_ignores_plain_files() {
        let temp = TempDir::new().unwrap();
        let mut sync = synchronizer_at(&temp, Some(LinkStrategy::Move));
        let file = temp.path().join("profiles").join("notes.txt");
        fs::write(&file, "x").unwrap();

        sync.apply_event(WatchEvent::Created(file.clone())).unwrap();
        assert!(sync.registry().find_profile(&file).is_none());
        assert_eq!(sync.store.saves, 0);
    }

    #[test]
    fn test_modified_events_are_ignored() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("profiles");
        let foo = seed_profile(&root, "foo");
        let mut sync = synchronizer_at(&temp, Some(LinkStrategy::Move));

        let warnings = sync.apply_event(WatchEvent::Modified(foo.clone())).unwrap();
        assert!(warnings.is_empty());
        assert!(sync.registry().find_profile(&foo).is_some());
        assert_eq!(sync.store.saves, 0);
    }

    #[test]
    fn test_deleted_inactive_profile_just_unregisters() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("profiles");
        let foo = seed_profile(&root, "foo");
        let mut sync = synchronizer_at(&temp, Some(LinkStrategy::Symlink));

        fs::remove_dir_all(&foo).unwrap();
        let warnings = sync.apply_event(WatchEvent::Deleted(foo.clone())).unwrap();
        assert!(warnings.is_empty());
        assert!(sync.registry().find_profile(&foo).is_none());
    }

    #[cfg(unix)]
    #[test]
    fn test_deleted_active_profile_cleans_dangling_links() {
        // Active profile removed out-of-band: the links at the user-data
        // path dangle and must be cleaned up, active pointer cleared.
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("profiles");
        let foo = seed_profile(&root, "foo");
        let mut sync = synchronizer_at(&temp, Some(LinkStrategy::Symlink));

        sync.activate(&foo).unwrap();
        let user_data = sync.registry().user_data_path.clone();
        assert!(fs::symlink_metadata(user_data.join("mods")).is_ok());

        fs::remove_dir_all(&foo).unwrap();
        let warnings = sync.apply_event(WatchEvent::Deleted(foo.clone())).unwrap();

        assert_eq!(
            warnings,
            vec![SyncWarning::ActiveProfileDeleted {
                profile: foo.clone()
            }]
        );
        assert!(sync.registry().active_profile().is_none());
        assert!(fs::symlink_metadata(user_data.join("mods")).is_err());
        assert!(fs::symlink_metadata(user_data.join("saves")).is_err());
    }

    #[test]
    fn test_deleted_active_profile_move_strategy_warns_orphaned() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("profiles");
        let foo = seed_profile(&root, "foo");
        let mut sync = synchronizer_at(&temp, Some(LinkStrategy::Move));

        sync.activate(&foo).unwrap();
        // Under Move the profile dir still exists (emptied); simulate the
        // user deleting it entirely.
        fs::remove_dir_all(&foo).unwrap();

        let warnings = sync.apply_event(WatchEvent::Deleted(foo.clone())).unwrap();
        let user_data = sync.registry().user_data_path.clone();
        assert_eq!(warnings, vec![SyncWarning::OrphanedUserData { user_data }]);
        assert!(sync.registry().active_profile().is_none());
        // Content stays put, no auto-repair
        assert!(
            sync.registry()
                .user_data_path
                .join("mods")
                .join("marker.txt")
                .exists()
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_activate_switches_and_saves() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("profiles");
        let foo = seed_profile(&root, "foo");
        let bar = seed_profile(&root, "bar");
        let mut sync = synchronizer_at(&temp, Some(LinkStrategy::Symlink));

        sync.activate(&foo).unwrap();
        assert_eq!(sync.registry().active_profile().unwrap().name(), "foo");

        sync.activate(&bar).unwrap();
        assert_eq!(sync.registry().active_profile().unwrap().name(), "bar");
        assert_eq!(sync.store.saves, 2);

        let user_data = sync.registry().user_data_path.clone();
        assert_eq!(
            fs::read_link(user_data.join("mods")).unwrap(),
            bar.join("mods")
        );
    }

    #[test]
    fn test_activate_unknown_profile_fails() {
        let temp = TempDir::new().unwrap();
        let mut sync = synchronizer_at(&temp, Some(LinkStrategy::Move));
        let err = sync.activate(&temp.path().join("profiles/ghost")).unwrap_err();
        assert!(err.to_string().contains("No such profile"));
    }

    #[test]
    fn test_deactivate_nothing_active_is_noop() {
        let temp = TempDir::new().unwrap();
        let mut sync = synchronizer_at(&temp, Some(LinkStrategy::Symlink));
        sync.deactivate().unwrap();
        assert_eq!(sync.store.saves, 0);
    }

    #[cfg(unix)]
    #[test]
    fn test_activate_partial_failure_clears_active() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("profiles");
        let foo = seed_profile(&root, "foo");
        // Profile dir without mods/saves makes activation fail after the
        // previous one was reverted.
        let broken = root.join("broken");
        fs::create_dir_all(&broken).unwrap();
        let mut sync = synchronizer_at(&temp, Some(LinkStrategy::Symlink));

        sync.activate(&foo).unwrap();
        let err = sync.activate(&broken).unwrap_err();
        assert!(err.downcast_ref::<ActivationError>().is_some());
        assert!(sync.registry().active_profile().is_none());
    }

    #[test]
    fn test_rename_updates_registry_and_associations() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("profiles");
        let foo = seed_profile(&root, "foo");
        let mut sync = synchronizer_at(&temp, Some(LinkStrategy::Move));
        sync.registry_mut()
            .profile_installations
            .insert("foo".into(), "stable".into());

        let renamed = sync.rename(&foo, "baz").unwrap();
        assert_eq!(renamed, root.join("baz"));
        assert!(sync.registry().find_profile(&renamed).is_some());
        assert!(sync.registry().find_profile(&foo).is_none());
        assert_eq!(
            sync.registry()
                .find_installation_name_for_profile("baz"),
            Some("stable")
        );

        // Our own rename events are suppressed
        assert!(sync
            .apply_event(WatchEvent::Deleted(foo.clone()))
            .unwrap()
            .is_empty());
        assert!(sync.registry().find_profile(&renamed).is_some());
        sync.apply_event(WatchEvent::Created(renamed.clone())).unwrap();
        // Still exactly one registered profile for that directory
        assert_eq!(
            sync.registry()
                .profiles()
                .iter()
                .filter(|p| p.directory() == renamed)
                .count(),
            1
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_rename_active_keeps_links_and_pointer() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("profiles");
        let foo = seed_profile(&root, "foo");
        let mut sync = synchronizer_at(&temp, Some(LinkStrategy::Symlink));

        sync.activate(&foo).unwrap();
        let renamed = sync.rename(&foo, "baz").unwrap();

        assert_eq!(sync.registry().active_profile().unwrap().name(), "baz");
        let user_data = sync.registry().user_data_path.clone();
        assert_eq!(
            fs::read_link(user_data.join("mods")).unwrap(),
            renamed.join("mods")
        );
    }

    #[test]
    fn test_rename_conflict_unregisters_suppressions() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("profiles");
        let foo = seed_profile(&root, "foo");
        seed_profile(&root, "bar");
        let mut sync = synchronizer_at(&temp, Some(LinkStrategy::Move));

        assert!(sync.rename(&foo, "BAR").is_err());
        // Nothing left suppressed after the failed attempt
        assert!(sync.suppressed.is_empty());
    }

    #[test]
    fn test_create_registers_and_suppresses_own_event() {
        let temp = TempDir::new().unwrap();
        let mut sync = synchronizer_at(&temp, Some(LinkStrategy::Move));

        let created = sync.create("fresh").unwrap();
        assert!(created.join("mods").is_dir());
        assert!(sync.registry().find_profile(&created).is_some());

        sync.apply_event(WatchEvent::Created(created.clone())).unwrap();
        assert_eq!(
            sync.registry()
                .profiles()
                .iter()
                .filter(|p| p.directory() == created)
                .count(),
            1
        );
    }

    #[test]
    fn test_create_name_conflict_case_insensitive() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("profiles");
        seed_profile(&root, "Fresh");
        let mut sync = synchronizer_at(&temp, Some(LinkStrategy::Move));

        assert!(sync.create("fresh").is_err());
        assert!(sync.suppressed.is_empty());
    }
}
