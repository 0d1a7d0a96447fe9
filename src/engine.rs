//! Profile activation engine.
//!
//! Stateless orchestration over [`LinkStrategy`]: activate, deactivate,
//! switch, rename, and the two-phase initial setup. Functions here take
//! directory paths and a strategy, mutate the filesystem, and report typed
//! errors; the caller (synchronizer/CLI) commits registry and settings
//! changes only after success.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{ActivationError, Result};
use crate::paths::{DEFAULT_PROFILE_NAME, FOLDER_NAME_MODS, FOLDER_NAME_SAVES, profile_subfolders};
use crate::strategy::{LinkStrategy, is_link, perform_move_general, revert_move_general};

/// Make `profile_dir`'s content visible at `user_data_dir`.
///
/// Preconditions: the profile directory exists and a strategy is set. The
/// caller is responsible for deactivating any previously active profile
/// first; see [`switch_active_to`].
pub fn activate(
    strategy: Option<LinkStrategy>,
    profile_dir: &Path,
    user_data_dir: &Path,
) -> Result<()> {
    if !profile_dir.is_dir() {
        return Err(ActivationError::MissingPath(profile_dir.to_path_buf()));
    }
    perform_move_general(strategy, user_data_dir, profile_dir)
}

/// Undo an activation. Calling this when nothing is active is a no-op
/// success: link-based strategies find nothing to delete, and the caller
/// guards the Move strategy with its active pointer.
pub fn deactivate(
    strategy: Option<LinkStrategy>,
    profile_dir: &Path,
    user_data_dir: &Path,
) -> Result<()> {
    revert_move_general(strategy, user_data_dir, profile_dir)
}

/// The previously active profile, as seen by [`switch_active_to`].
pub struct PreviousActive<'a> {
    pub profile_dir: &'a Path,
    /// User-data path the previous activation used (its installation's
    /// override may differ from the new profile's).
    pub user_data_dir: &'a Path,
}

/// Deactivate `previous` (when given), then activate `new_profile_dir`.
///
/// If activation fails after deactivation succeeded, the old profile's
/// content sits in its profile directory and nothing is linked; this is
/// reported as [`ActivationError::PartialFailure`] and deliberately not
/// auto-recovered. The caller surfaces it and lets the user retry.
pub fn switch_active_to(
    strategy: Option<LinkStrategy>,
    previous: Option<PreviousActive<'_>>,
    new_profile_dir: &Path,
    new_user_data_dir: &Path,
) -> Result<()> {
    let had_previous = previous.is_some();
    if let Some(prev) = previous {
        deactivate(strategy, prev.profile_dir, prev.user_data_dir)?;
    }

    match activate(strategy, new_profile_dir, new_user_data_dir) {
        Ok(()) => Ok(()),
        Err(e) if had_previous => Err(ActivationError::partial(
            format!(
                "previous profile deactivated, but activating {} failed",
                new_profile_dir.display()
            ),
            e,
        )),
        Err(e) => Err(e),
    }
}

/// Rename a profile directory, re-linking around the rename when the
/// profile is active: revert under the old name, rename, perform under the
/// new name. Returns the new directory path.
pub fn rename_profile(
    strategy: Option<LinkStrategy>,
    profile_dir: &Path,
    new_name: &str,
    user_data_dir: &Path,
    is_active: bool,
) -> Result<PathBuf> {
    let parent = profile_dir
        .parent()
        .ok_or_else(|| ActivationError::MissingPath(profile_dir.to_path_buf()))?;
    let new_dir = parent.join(new_name);

    if fs::symlink_metadata(&new_dir).is_ok() {
        return Err(ActivationError::NameConflict(new_dir));
    }

    if is_active {
        deactivate(strategy, profile_dir, user_data_dir)?;
    }

    if let Err(e) = fs::rename(profile_dir, &new_dir) {
        if is_active {
            // Links are already gone; the profile is left degraded.
            return Err(ActivationError::partial(
                format!(
                    "deactivated {} but directory rename failed",
                    profile_dir.display()
                ),
                e.into(),
            ));
        }
        return Err(e.into());
    }

    if is_active {
        if let Err(e) = activate(strategy, &new_dir, user_data_dir) {
            return Err(ActivationError::partial(
                format!(
                    "renamed to {} but re-linking under the new name failed",
                    new_dir.display()
                ),
                e,
            ));
        }
    }

    Ok(new_dir)
}

/// A human-readable list of the file operations initial setup would
/// perform. Produced without touching the filesystem.
#[derive(Debug)]
pub struct SetupPlan {
    pub steps: Vec<String>,
    /// Where the default profile will live.
    pub profile_dir: PathBuf,
}

impl fmt::Display for SetupPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for step in &self.steps {
            writeln!(f, "{}", step)?;
        }
        Ok(())
    }
}

/// Read-only counterpart of [`perform_initial_setup`]: validates the same
/// preconditions and describes what the mutating call would do, so the
/// caller can show a confirmation first.
pub fn plan_initial_setup(
    user_data_dir: &Path,
    profiles_root: &Path,
    strategy: Option<LinkStrategy>,
) -> Result<SetupPlan> {
    initial_setup_operations(user_data_dir, profiles_root, strategy, false)
}

/// Create the default profile, move `mods`/`saves` into it, and perform
/// the configured strategy to put them back into place. The Move strategy
/// skips the back-and-forth: content simply stays at the user-data path.
pub fn perform_initial_setup(
    user_data_dir: &Path,
    profiles_root: &Path,
    strategy: Option<LinkStrategy>,
) -> Result<SetupPlan> {
    initial_setup_operations(user_data_dir, profiles_root, strategy, true)
}

fn initial_setup_operations(
    user_data_dir: &Path,
    profiles_root: &Path,
    strategy: Option<LinkStrategy>,
    perform_file_operations: bool,
) -> Result<SetupPlan> {
    let strategy = strategy.ok_or(ActivationError::InvalidArgument("strategy is not set"))?;

    if !user_data_dir.is_dir() {
        return Err(ActivationError::MissingPath(user_data_dir.to_path_buf()));
    }
    if !profiles_root.is_dir() {
        return Err(ActivationError::MissingPath(profiles_root.to_path_buf()));
    }

    let (data_mods, data_saves) = profile_subfolders(user_data_dir);

    // Refuse to nest a link inside a link
    for source in [&data_mods, &data_saves] {
        if fs::symlink_metadata(source).is_err() {
            return Err(ActivationError::MissingPath(source.clone()));
        }
        if is_link(source)? {
            return Err(ActivationError::AlreadySymlink(source.clone()));
        }
    }

    let profile_dir = profiles_root.join(DEFAULT_PROFILE_NAME);
    let (profile_mods, profile_saves) = profile_subfolders(&profile_dir);

    let mut steps = Vec::new();
    if !profile_dir.exists() {
        steps.push(format!("Create folder: {}", profile_dir.display()));
    }

    // Move strategy keeps content at the user-data path; nothing to shuffle
    if strategy != LinkStrategy::Move {
        steps.push(format!(
            "Move: {} -> {}",
            data_mods.display(),
            profile_mods.display()
        ));
        steps.push(format!(
            "Move: {} -> {}",
            data_saves.display(),
            profile_saves.display()
        ));

        let op_name = match strategy {
            LinkStrategy::Symlink => "Create symlink",
            LinkStrategy::Junction => "Create junction",
            LinkStrategy::Move => unreachable!(),
        };
        steps.push(format!(
            "{}: {} -> {}",
            op_name,
            data_mods.display(),
            profile_mods.display()
        ));
        steps.push(format!(
            "{}: {} -> {}",
            op_name,
            data_saves.display(),
            profile_saves.display()
        ));
    }

    if perform_file_operations {
        fs::create_dir_all(&profile_dir)?;

        if strategy != LinkStrategy::Move {
            fs::rename(&data_mods, &profile_mods)?;
            fs::rename(&data_saves, &profile_saves)?;
            strategy.perform(&profile_dir, user_data_dir)?;
        }
    }

    Ok(SetupPlan { steps, profile_dir })
}

/// Create a new, empty profile: a directory with bare `mods` and `saves`
/// subfolders. Fails with [`ActivationError::NameConflict`] when the
/// target already exists.
pub fn create_profile(profiles_root: &Path, name: &str) -> Result<PathBuf> {
    let profile_dir = profiles_root.join(name);
    if fs::symlink_metadata(&profile_dir).is_ok() {
        return Err(ActivationError::NameConflict(profile_dir));
    }

    fs::create_dir_all(profile_dir.join(FOLDER_NAME_MODS))?;
    fs::create_dir_all(profile_dir.join(FOLDER_NAME_SAVES))?;
    Ok(profile_dir)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::seed_profile;
    use tempfile::TempDir;

    fn user_data_with_content(root: &Path) -> PathBuf {
        let user_data = root.join("user_data");
        fs::create_dir_all(user_data.join("mods")).unwrap();
        fs::create_dir_all(user_data.join("saves")).unwrap();
        fs::write(user_data.join("mods").join("base.zip"), "mod").unwrap();
        fs::write(user_data.join("saves").join("world.dat"), "save").unwrap();
        user_data
    }

    #[test]
    fn test_activate_requires_existing_profile() {
        let temp = TempDir::new().unwrap();
        let err = activate(
            Some(LinkStrategy::Move),
            &temp.path().join("ghost"),
            temp.path(),
        )
        .unwrap_err();
        assert!(matches!(err, ActivationError::MissingPath(_)));
    }

    #[test]
    fn test_activate_requires_strategy() {
        let temp = TempDir::new().unwrap();
        let profile = seed_profile(temp.path(), "foo");
        let err = activate(None, &profile, temp.path()).unwrap_err();
        assert!(matches!(err, ActivationError::InvalidArgument(_)));
    }

    #[test]
    fn test_move_activation_relocates_content() {
        // Activate(foo) under Move: content physically at user data,
        // foo/mods and foo/saves absent until deactivation.
        let temp = TempDir::new().unwrap();
        let profile = seed_profile(temp.path(), "foo");
        let user_data = temp.path().join("user_data");
        fs::create_dir_all(&user_data).unwrap();

        activate(Some(LinkStrategy::Move), &profile, &user_data).unwrap();
        assert!(user_data.join("mods").is_dir());
        assert!(user_data.join("saves").is_dir());
        assert!(!profile.join("mods").exists());
        assert!(!profile.join("saves").exists());

        deactivate(Some(LinkStrategy::Move), &profile, &user_data).unwrap();
        assert!(profile.join("mods").is_dir());
        assert!(!user_data.join("mods").exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_switch_between_profiles() {
        // Activate(foo) then switch to bar: links end up pointing at bar,
        // none at foo.
        let temp = TempDir::new().unwrap();
        let foo = seed_profile(temp.path(), "foo");
        let bar = seed_profile(temp.path(), "bar");
        let user_data = temp.path().join("user_data");
        fs::create_dir_all(&user_data).unwrap();

        let strategy = Some(LinkStrategy::Symlink);
        activate(strategy, &foo, &user_data).unwrap();
        assert_eq!(
            fs::read_link(user_data.join("mods")).unwrap(),
            foo.join("mods")
        );

        switch_active_to(
            strategy,
            Some(PreviousActive {
                profile_dir: &foo,
                user_data_dir: &user_data,
            }),
            &bar,
            &user_data,
        )
        .unwrap();

        assert_eq!(
            fs::read_link(user_data.join("mods")).unwrap(),
            bar.join("mods")
        );
        assert_eq!(
            fs::read_link(user_data.join("saves")).unwrap(),
            bar.join("saves")
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_switch_reports_partial_failure() {
        let temp = TempDir::new().unwrap();
        let foo = seed_profile(temp.path(), "foo");
        let user_data = temp.path().join("user_data");
        fs::create_dir_all(&user_data).unwrap();

        let strategy = Some(LinkStrategy::Symlink);
        activate(strategy, &foo, &user_data).unwrap();

        // The target profile is missing its subfolders, so activation of
        // it fails after foo was deactivated.
        let broken = temp.path().join("broken");
        fs::create_dir_all(&broken).unwrap();

        let err = switch_active_to(
            strategy,
            Some(PreviousActive {
                profile_dir: &foo,
                user_data_dir: &user_data,
            }),
            &broken,
            &user_data,
        )
        .unwrap_err();

        assert!(matches!(err, ActivationError::PartialFailure { .. }));
        // foo's content is back in its profile directory, nothing linked
        assert!(foo.join("mods").is_dir());
        assert!(fs::symlink_metadata(user_data.join("mods")).is_err());
    }

    #[test]
    fn test_deactivate_nothing_active_is_noop() {
        let temp = TempDir::new().unwrap();
        let user_data = temp.path().join("user_data");
        fs::create_dir_all(&user_data).unwrap();

        deactivate(
            Some(LinkStrategy::Symlink),
            &temp.path().join("foo"),
            &user_data,
        )
        .unwrap();
    }

    #[cfg(unix)]
    #[test]
    fn test_rename_active_profile_relinks() {
        let temp = TempDir::new().unwrap();
        let foo = seed_profile(temp.path(), "foo");
        let user_data = temp.path().join("user_data");
        fs::create_dir_all(&user_data).unwrap();

        let strategy = Some(LinkStrategy::Symlink);
        activate(strategy, &foo, &user_data).unwrap();

        let baz = rename_profile(strategy, &foo, "baz", &user_data, true).unwrap();
        assert_eq!(baz, temp.path().join("baz"));
        assert!(!foo.exists());
        assert_eq!(
            fs::read_link(user_data.join("mods")).unwrap(),
            baz.join("mods")
        );
    }

    #[test]
    fn test_rename_conflict() {
        let temp = TempDir::new().unwrap();
        let foo = seed_profile(temp.path(), "foo");
        seed_profile(temp.path(), "bar");
        let user_data = temp.path().join("user_data");
        fs::create_dir_all(&user_data).unwrap();

        let err =
            rename_profile(Some(LinkStrategy::Move), &foo, "bar", &user_data, false).unwrap_err();
        assert!(matches!(err, ActivationError::NameConflict(_)));
        assert!(foo.exists());
    }

    #[test]
    fn test_rename_inactive_profile_is_plain_rename() {
        let temp = TempDir::new().unwrap();
        let foo = seed_profile(temp.path(), "foo");
        let user_data = temp.path().join("user_data");
        fs::create_dir_all(&user_data).unwrap();

        let renamed =
            rename_profile(Some(LinkStrategy::Symlink), &foo, "quux", &user_data, false).unwrap();
        assert!(renamed.join("mods").is_dir());
        assert!(!foo.exists());
    }

    #[test]
    fn test_plan_is_read_only() {
        let temp = TempDir::new().unwrap();
        let user_data = user_data_with_content(temp.path());
        let profiles_root = temp.path().join("profiles");
        fs::create_dir_all(&profiles_root).unwrap();

        let plan =
            plan_initial_setup(&user_data, &profiles_root, Some(LinkStrategy::Symlink)).unwrap();

        assert!(!plan.steps.is_empty());
        assert!(plan.to_string().contains("Create symlink"));
        // Nothing moved, nothing created
        assert!(user_data.join("mods").join("base.zip").exists());
        assert!(!plan.profile_dir.exists());
    }

    #[test]
    fn test_plan_for_move_strategy_skips_shuffle() {
        let temp = TempDir::new().unwrap();
        let user_data = user_data_with_content(temp.path());
        let profiles_root = temp.path().join("profiles");
        fs::create_dir_all(&profiles_root).unwrap();

        let plan =
            plan_initial_setup(&user_data, &profiles_root, Some(LinkStrategy::Move)).unwrap();
        assert_eq!(plan.steps.len(), 1, "only the folder creation step");
    }

    #[cfg(unix)]
    #[test]
    fn test_perform_initial_setup_symlink() {
        let temp = TempDir::new().unwrap();
        let user_data = user_data_with_content(temp.path());
        let profiles_root = temp.path().join("profiles");
        fs::create_dir_all(&profiles_root).unwrap();

        let plan =
            perform_initial_setup(&user_data, &profiles_root, Some(LinkStrategy::Symlink)).unwrap();

        let profile_dir = plan.profile_dir;
        assert!(profile_dir.join("mods").join("base.zip").exists());
        assert!(profile_dir.join("saves").join("world.dat").exists());
        // Re-linked into place
        assert_eq!(
            fs::read_link(user_data.join("mods")).unwrap(),
            profile_dir.join("mods")
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_initial_setup_refuses_existing_symlink() {
        // Scenario: userData/mods is already a symlink; setup must fail
        // with AlreadySymlink and move nothing.
        let temp = TempDir::new().unwrap();
        let user_data = temp.path().join("user_data");
        fs::create_dir_all(user_data.join("saves")).unwrap();
        let elsewhere = temp.path().join("elsewhere");
        fs::create_dir_all(&elsewhere).unwrap();
        std::os::unix::fs::symlink(&elsewhere, user_data.join("mods")).unwrap();

        let profiles_root = temp.path().join("profiles");
        fs::create_dir_all(&profiles_root).unwrap();

        let err = perform_initial_setup(&user_data, &profiles_root, Some(LinkStrategy::Symlink))
            .unwrap_err();
        assert!(matches!(err, ActivationError::AlreadySymlink(_)));
        assert!(user_data.join("saves").is_dir());
        assert!(!profiles_root.join(DEFAULT_PROFILE_NAME).exists());
    }

    #[test]
    fn test_initial_setup_missing_paths() {
        let temp = TempDir::new().unwrap();
        let err = plan_initial_setup(
            &temp.path().join("no_user_data"),
            temp.path(),
            Some(LinkStrategy::Move),
        )
        .unwrap_err();
        assert!(matches!(err, ActivationError::MissingPath(_)));
    }

    #[test]
    fn test_create_profile() {
        let temp = TempDir::new().unwrap();
        let dir = create_profile(temp.path(), "fresh").unwrap();
        assert!(dir.join("mods").is_dir());
        assert!(dir.join("saves").is_dir());

        let err = create_profile(temp.path(), "fresh").unwrap_err();
        assert!(matches!(err, ActivationError::NameConflict(_)));
    }
}
