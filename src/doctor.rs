//! Diagnostic tool for modswap.
//!
//! This module implements the `modswap doctor` command, which checks the
//! setup for common issues:
//! - Existence of the configuration, profiles, and user-data directories.
//! - Settings file readability and completeness.
//! - Consistency of the active-profile pointer with what is on disk.
//! - Which link strategies actually work here (permission probes).
//!
//! It reports issues to the user with a pass/fail/warn status.

use anstyle::AnsiColor;

use crate::paths::{Paths, profile_subfolders};
use crate::registry::Registry;
use crate::settings::Settings;
use crate::strategy::{self, LinkStrategy};
use crate::ui::Ui;

/// Run the doctor diagnostics
pub fn run_doctor(paths: &Paths, ui: &Ui) {
    ui.section("modswap Doctor");
    ui.newline();

    let settings = match Settings::read(&paths.settings_file) {
        Ok(s) => Some(s),
        Err(_) => None,
    };

    // 1. Settings file
    check_step(ui, "Settings", || {
        let Some(settings) = &settings else {
            ui.println(format!(
                "  {} Settings file corrupt: {}",
                ui.icon_err(),
                paths.settings_file.display()
            ));
            return false;
        };

        if !paths.settings_file.exists() {
            ui.println(format!(
                "  {} Settings file missing (fresh install?)",
                ui.icon_warn()
            ));
            return true;
        }

        ui.println(format!("  {} Settings file readable", ui.icon_ok()));
        match settings.strategy {
            Some(s) => ui.println(format!("  {} Strategy: {}", ui.icon_info(), s)),
            None => ui.println(format!(
                "  {} No strategy chosen yet (run `modswap init`)",
                ui.icon_warn()
            )),
        }
        if !settings.has_initialized {
            ui.println(format!(
                "  {} Initial setup has not been performed",
                ui.icon_warn()
            ));
        }
        true
    });

    // 2. Directories
    check_step(ui, "Directories", || {
        let mut ok = true;
        let profiles_root = settings
            .as_ref()
            .and_then(|s| s.profiles_root_path.clone())
            .unwrap_or_else(|| paths.profiles_dir.clone());

        if profiles_root.is_dir() {
            ui.println(format!(
                "  {} Profiles root exists: {}",
                ui.icon_ok(),
                profiles_root.display()
            ));
        } else {
            ui.println(format!(
                "  {} Profiles root missing: {}",
                ui.icon_err(),
                profiles_root.display()
            ));
            ok = false;
        }

        match settings.as_ref().and_then(|s| s.user_data_path.clone()) {
            Some(user_data) if user_data.is_dir() => {
                ui.println(format!(
                    "  {} User-data directory exists: {}",
                    ui.icon_ok(),
                    user_data.display()
                ));
            }
            Some(user_data) => {
                ui.println(format!(
                    "  {} User-data directory missing: {}",
                    ui.icon_err(),
                    user_data.display()
                ));
                ok = false;
            }
            None => {
                ui.println(format!(
                    "  {} No user-data path configured",
                    ui.icon_warn()
                ));
            }
        }
        ok
    });

    // 3. Active profile consistency
    check_step(ui, "Active Profile", || {
        let Some(settings) = &settings else {
            return true;
        };
        let mut registry = match settings.to_registry(paths) {
            Ok(r) => r,
            Err(_) => {
                ui.println(format!(
                    "  {} Not configured yet, skipping",
                    ui.icon_info()
                ));
                return true;
            }
        };
        let _ = registry.scan_profiles();

        let Some(active) = registry.active_profile_path() else {
            ui.println(format!("  {} No active profile set", ui.icon_info()));
            return true;
        };

        if !active.is_dir() {
            ui.println(format!(
                "  {} Active profile directory MISSING: {}",
                ui.icon_err(),
                active.display()
            ));
            return false;
        }
        ui.println(format!(
            "  {} Active profile directory exists: {}",
            ui.icon_ok(),
            active.display()
        ));

        check_active_links(ui, &registry, active)
    });

    // 4. Profiles on disk
    check_step(ui, "Profiles", || {
        let profiles_root = settings
            .as_ref()
            .and_then(|s| s.profiles_root_path.clone())
            .unwrap_or_else(|| paths.profiles_dir.clone());
        let mut registry = Registry::new(std::path::PathBuf::new(), profiles_root);
        // Without the persisted pointer, the active profile would be
        // flagged for its legitimately missing subfolders under Move
        registry.set_active(
            settings
                .as_ref()
                .and_then(|s| s.active_profile_path.as_deref()),
        );
        if registry.scan_profiles().is_err() {
            ui.println(format!(
                "  {} Failed to enumerate profiles root",
                ui.icon_err()
            ));
            return false;
        }

        if registry.profiles().is_empty() {
            ui.println(format!("  {} No profiles found", ui.icon_warn()));
            return true;
        }

        ui.println(format!("  Found {} profiles:", registry.profiles().len()));
        let active = registry.active_profile_path().map(|p| p.to_path_buf());
        for profile in registry.profiles() {
            if profile_entry_ok(profile.directory(), active.as_deref()) {
                ui.println(format!("    {} {}", ui.icon_ok(), profile.name()));
            } else {
                ui.println(format!(
                    "    {} {} (missing mods/ or saves/)",
                    ui.icon_warn(),
                    profile.name()
                ));
            }
        }
        true
    });

    // 5. Strategy availability
    check_step(ui, "Strategies", || {
        let scratch = &paths.config_dir;
        for candidate in LinkStrategy::all() {
            if !candidate.is_available() {
                ui.println(format!(
                    "  {} {}: not supported on this platform",
                    ui.icon_info(),
                    candidate
                ));
                continue;
            }

            let works = match candidate {
                LinkStrategy::Move => true,
                LinkStrategy::Symlink => strategy::probe_symlink_permission(scratch),
                LinkStrategy::Junction => {
                    let spinner = ui.spinner(format!("Probing {} support...", candidate));
                    let result = strategy::junction::probe_permission(scratch);
                    spinner.finish_and_clear();
                    result
                }
            };

            if works {
                ui.println(format!("  {} {}: available", ui.icon_ok(), candidate));
            } else {
                ui.println(format!(
                    "  {} {}: permission probe failed",
                    ui.icon_warn(),
                    candidate
                ));
            }
        }
        true
    });
}

/// Verify the link state at the user-data path matches the configured
/// strategy for the active profile.
fn check_active_links(ui: &Ui, registry: &Registry, active: &std::path::Path) -> bool {
    let Some(strategy_kind) = registry.strategy else {
        return true;
    };
    let user_data = registry
        .active_profile()
        .map(|p| registry.user_data_for(p))
        .unwrap_or(&registry.user_data_path);
    let (data_mods, data_saves) = profile_subfolders(user_data);
    let (profile_mods, profile_saves) = profile_subfolders(active);

    match strategy_kind {
        LinkStrategy::Move => {
            // Content lives at user data while active
            if profile_mods.exists() || profile_saves.exists() {
                ui.println(format!(
                    "  {} Active profile still holds mods/saves; content should be at {}",
                    ui.icon_warn(),
                    user_data.display()
                ));
            } else {
                ui.println(format!(
                    "  {} Content relocated to user-data path",
                    ui.icon_ok()
                ));
            }
            true
        }
        LinkStrategy::Symlink | LinkStrategy::Junction => {
            let mut ok = true;
            for link in [&data_mods, &data_saves] {
                match strategy::is_link(link) {
                    Ok(true) => {
                        ui.println(format!(
                            "  {} Link in place: {}",
                            ui.icon_ok(),
                            link.display()
                        ));
                    }
                    Ok(false) => {
                        ui.println(format!(
                            "  {} Expected a link, found a real entry: {}",
                            ui.icon_err(),
                            link.display()
                        ));
                        ok = false;
                    }
                    Err(_) => {
                        ui.println(format!(
                            "  {} Link missing or unreadable: {}",
                            ui.icon_err(),
                            link.display()
                        ));
                        ok = false;
                    }
                }
            }
            ok
        }
    }
}

/// Whether a profile directory is in a healthy on-disk shape. The active
/// profile legitimately lacks its subfolders under the Move strategy, so
/// it is exempt from the check.
fn profile_entry_ok(profile_dir: &std::path::Path, active: Option<&std::path::Path>) -> bool {
    if Some(profile_dir) == active {
        return true;
    }
    let (mods, saves) = profile_subfolders(profile_dir);
    mods.is_dir() && saves.is_dir()
}

fn check_step<F>(ui: &Ui, name: &str, check_fn: F)
where
    F: FnOnce() -> bool,
{
    ui.println(ui.bold(format!("Checking {}...", name)));
    let success = check_fn();
    if !success {
        ui.println(ui.colored("  Issues detected!", AnsiColor::Red));
    }
    ui.newline();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::seed_profile;
    use std::fs;
    use std::path::PathBuf;
    use tempfile::TempDir;

    #[test]
    fn test_profile_entry_checks_subfolders() {
        let temp = TempDir::new().unwrap();
        let complete = seed_profile(temp.path(), "complete");
        let bare = temp.path().join("bare");
        fs::create_dir_all(&bare).unwrap();

        assert!(profile_entry_ok(&complete, None));
        assert!(!profile_entry_ok(&bare, None));
    }

    #[test]
    fn test_active_move_profile_is_exempt() {
        // Under Move the active profile's mods/saves live at the
        // user-data path, so the emptied directory is healthy as long as
        // the persisted active pointer says so.
        let temp = TempDir::new().unwrap();
        let emptied = temp.path().join("emptied");
        fs::create_dir_all(&emptied).unwrap();

        assert!(profile_entry_ok(&emptied, Some(&emptied)));
        assert!(!profile_entry_ok(&emptied, Some(&temp.path().join("other"))));
    }

    #[test]
    fn test_scan_with_persisted_pointer_marks_active() {
        // The listing check builds its registry from the settings file;
        // the persisted pointer must survive the scan.
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("profiles");
        let emptied = root.join("emptied");
        fs::create_dir_all(&emptied).unwrap();
        seed_profile(&root, "other");

        let settings = Settings {
            active_profile_path: Some(emptied.clone()),
            ..Default::default()
        };

        let mut registry = Registry::new(PathBuf::new(), root);
        registry.set_active(settings.active_profile_path.as_deref());
        registry.scan_profiles().unwrap();

        let active = registry.active_profile_path().map(|p| p.to_path_buf());
        assert_eq!(active.as_deref(), Some(emptied.as_path()));
        assert!(profile_entry_ok(&emptied, active.as_deref()));
    }
}
