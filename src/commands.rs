//! High-level command orchestration for the CLI.
//!
//! This module contains the handler functions for each CLI command
//! (`list`, `activate`, `init`, etc.). It serves as the coordination
//! layer, interacting with:
//! - `crate::ui` for user interaction (output, prompts).
//! - `crate::paths` for filesystem locations.
//! - `crate::sync` for registry mutations and event handling.
//! - `crate::engine` for the activation machinery.
//! - `crate::settings` for persistent state.
//!
//! Each function here generally corresponds to a subcommand in `main.rs`.

use anstyle::AnsiColor;
use anyhow::{Context, Result, bail};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::doctor::run_doctor;
use crate::engine;
use crate::paths::Paths;
use crate::registry::Registry;
use crate::settings::{JsonSettingsStore, Settings};
use crate::strategy::{self, LinkStrategy};
use crate::sync::Synchronizer;
use crate::ui::Ui;
use crate::watcher::DirectoryWatcher;

/// Load settings, build the registry from disk, and wrap both in a
/// synchronizer backed by the JSON settings store.
fn load_synchronizer(paths: &Paths) -> Result<Synchronizer<JsonSettingsStore>> {
    let settings = Settings::read(&paths.settings_file)?;
    let mut registry = settings.to_registry(paths)?;
    registry
        .scan_profiles()
        .context("Failed to enumerate the profiles root")?;
    Ok(Synchronizer::new(
        registry,
        JsonSettingsStore::new(paths.settings_file.clone()),
    ))
}

fn resolve_profile_dir(registry: &Registry, name: &str) -> Result<PathBuf> {
    registry
        .profiles()
        .iter()
        .find(|p| p.name().eq_ignore_ascii_case(name))
        .map(|p| p.directory().to_path_buf())
        .with_context(|| format!("No profile named '{}'", name))
}

/// List all profiles with installation, size, and activation status
pub fn list(paths: &Paths, ui: &Ui) -> Result<()> {
    let sync = load_synchronizer(paths)?;
    let registry = sync.registry();

    if registry.profiles().is_empty() {
        ui.warn("No profiles found.");
        ui.newline();
        ui.println("Create one with:");
        ui.println(format!("  {} new <name>", ui.bold("modswap")));
        return Ok(());
    }

    let mut table = ui.simple_table();
    table.set_header(vec![
        ui.header_cell(""),
        ui.header_cell("Profile"),
        ui.header_cell("Installation"),
        ui.header_cell("Size"),
        ui.header_cell("Status"),
    ]);

    for profile in registry.profiles() {
        let icon = if profile.active { ui.icon_ok() } else { " " };
        let status_cell = if profile.active {
            ui.colored_cell("active", AnsiColor::Green)
        } else {
            ui.cell("-")
        };
        let installation = profile.installation_name.as_deref().unwrap_or("-");

        table.add_row(vec![
            ui.cell(icon),
            ui.cell(profile.name()),
            ui.cell(installation),
            ui.cell(entry_size(profile.directory())),
            status_cell,
        ]);
    }

    ui.section("Profiles");
    ui.println(table.to_string());
    Ok(())
}

/// Show the active profile, strategy, and configured paths
pub fn status(paths: &Paths, ui: &Ui) -> Result<()> {
    let settings = Settings::read(&paths.settings_file)?;

    ui.section("Status");
    ui.newline();

    let mut table = ui.table();
    match &settings.active_profile_path {
        Some(active) => {
            let name = active
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| active.display().to_string());
            table.add_row(vec![ui.cell("Active profile:"), ui.header_cell(name)]);
            table.add_row(vec![
                ui.cell("Profile directory:"),
                ui.cell(active.display().to_string()),
            ]);
        }
        None => {
            table.add_row(vec![ui.cell("Active profile:"), ui.cell("(none)")]);
        }
    }

    let strategy_display = settings
        .strategy
        .map(|s| s.to_string())
        .unwrap_or_else(|| "(not chosen)".into());
    table.add_row(vec![ui.cell("Strategy:"), ui.cell(strategy_display)]);

    if let Some(user_data) = &settings.user_data_path {
        table.add_row(vec![
            ui.cell("User data:"),
            ui.cell(user_data.display().to_string()),
        ]);
    }
    let profiles_root = settings
        .profiles_root_path
        .clone()
        .unwrap_or_else(|| paths.profiles_dir.clone());
    table.add_row(vec![
        ui.cell("Profiles root:"),
        ui.cell(profiles_root.display().to_string()),
    ]);
    if let Some(updated) = &settings.updated_at {
        table.add_row(vec![ui.cell("Last updated:"), ui.cell(updated.to_string())]);
    }

    ui.println(table.to_string());

    if !settings.has_initialized {
        ui.newline();
        ui.warn("Initial setup has not been performed. Run `modswap init`.");
    }
    Ok(())
}

/// Create a new empty profile
pub fn new_profile(paths: &Paths, name: &str, ui: &Ui) -> Result<()> {
    let mut sync = load_synchronizer(paths)?;
    let created = sync.create(name)?;
    ui.ok(format!("Created profile '{}' at {}", name, created.display()));
    Ok(())
}

/// Activate a profile by name, deactivating the current one first
pub fn activate(paths: &Paths, name: &str, ui: &Ui) -> Result<()> {
    let mut sync = load_synchronizer(paths)?;
    let target = resolve_profile_dir(sync.registry(), name)?;

    let spinner = ui.spinner(format!("Activating profile '{}'...", name));
    match sync.activate(&target) {
        Ok(()) => {
            ui.spinner_finish_ok(&spinner, format!("Active profile: {}", name));
            Ok(())
        }
        Err(e) => {
            ui.spinner_finish_err(&spinner, format!("Failed to activate: {}", e));
            Err(e)
        }
    }
}

/// Deactivate the currently active profile, if any
pub fn deactivate(paths: &Paths, ui: &Ui) -> Result<()> {
    let mut sync = load_synchronizer(paths)?;
    let Some(active) = sync.registry().active_profile() else {
        ui.info("No profile is active.");
        return Ok(());
    };
    let name = active.name().to_string();

    sync.deactivate()?;
    ui.ok(format!("Deactivated profile '{}'", name));
    Ok(())
}

/// Rename a profile, re-linking when it is the active one
pub fn rename(paths: &Paths, old_name: &str, new_name: &str, ui: &Ui) -> Result<()> {
    let mut sync = load_synchronizer(paths)?;
    let target = resolve_profile_dir(sync.registry(), old_name)?;

    let renamed = sync.rename(&target, new_name)?;
    ui.ok(format!(
        "Renamed '{}' to '{}' ({})",
        old_name,
        new_name,
        renamed.display()
    ));
    Ok(())
}

/// One-time setup: record paths, pick a strategy, move the existing
/// `mods`/`saves` into the default profile and link them back.
pub fn init(
    paths: &Paths,
    user_data: &Path,
    strategy_arg: Option<LinkStrategy>,
    dry_run: bool,
    ui: &Ui,
) -> Result<()> {
    let settings = Settings::read(&paths.settings_file)?;
    if settings.has_initialized {
        bail!("Already initialized. Settings: {}", paths.settings_file.display());
    }

    paths.ensure_dirs()?;
    let profiles_root = settings
        .profiles_root_path
        .clone()
        .unwrap_or_else(|| paths.profiles_dir.clone());

    let strategy = match strategy_arg {
        Some(s) => s,
        None => prompt_strategy(paths, ui)?,
    };

    let plan = engine::plan_initial_setup(user_data, &profiles_root, Some(strategy))?;
    ui.section("Planned operations");
    for step in &plan.steps {
        ui.println(format!("  {} {}", ui.icon_info(), step));
    }
    ui.newline();

    if dry_run {
        ui.info("Dry run, nothing was changed.");
        return Ok(());
    }

    let confirmed = inquire::Confirm::new("Perform these operations?")
        .with_default(false)
        .prompt()
        .unwrap_or(false);
    if !confirmed {
        ui.info("Aborted, nothing was changed.");
        return Ok(());
    }

    let plan = engine::perform_initial_setup(user_data, &profiles_root, Some(strategy))?;

    let mut registry = Registry::new(user_data.to_path_buf(), profiles_root);
    registry.strategy = Some(strategy);
    registry.has_initialized = true;
    registry.scan_profiles()?;
    registry.set_active(Some(&plan.profile_dir));
    Settings::from_registry(&registry).write(&paths.settings_file)?;

    ui.ok(format!(
        "Initialized. Default profile: {}",
        plan.profile_dir.display()
    ));
    Ok(())
}

/// Offer only the strategies whose permission probe passes.
fn prompt_strategy(paths: &Paths, ui: &Ui) -> Result<LinkStrategy> {
    let spinner = ui.spinner("Probing available strategies...");
    let available: Vec<LinkStrategy> = LinkStrategy::all()
        .into_iter()
        .filter(|s| s.is_available())
        .filter(|s| match s {
            LinkStrategy::Move => true,
            LinkStrategy::Symlink => strategy::probe_symlink_permission(&paths.config_dir),
            LinkStrategy::Junction => strategy::junction::probe_permission(&paths.config_dir),
        })
        .collect();
    spinner.finish_and_clear();

    inquire::Select::new("Which link strategy should be used?", available)
        .prompt()
        .context("Strategy selection cancelled")
}

/// Watch the profiles root and keep the registry in sync until interrupted
pub fn watch(paths: &Paths, ui: &Ui) -> Result<()> {
    let mut sync = load_synchronizer(paths)?;
    let root = sync.registry().profiles_root.clone();

    let watcher = DirectoryWatcher::new(&root)?;
    ui.info(format!("Watching {}", root.display()));
    ui.println(ui.dim("Press Ctrl-C to stop"));

    loop {
        let event = match watcher.recv_timeout(Duration::from_millis(500)) {
            Ok(Some(event)) => event,
            Ok(None) => continue,
            // Queue closed (backend died or the root vanished): stop
            // polling instead of spinning on timeouts.
            Err(_) => bail!(
                "Watcher for {} shut down unexpectedly; was the directory removed?",
                root.display()
            ),
        };

        match sync.apply_event(event) {
            Ok(warnings) => {
                for warning in warnings {
                    ui.warn(warning.to_string());
                }
            }
            Err(e) => ui.err(format!("Failed to apply change: {}", e)),
        }
    }
}

/// Run diagnostics
pub fn doctor(paths: &Paths, ui: &Ui) -> Result<()> {
    run_doctor(paths, ui);
    Ok(())
}

/// Human-readable size of a directory entry
fn entry_size(path: &Path) -> String {
    let size = if path.is_dir() {
        crate::fs_utils::dir_size(path).unwrap_or(0)
    } else {
        std::fs::metadata(path).map(|m| m.len()).unwrap_or(0)
    };
    format_bytes(size)
}

/// Format bytes as human-readable string
fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}
