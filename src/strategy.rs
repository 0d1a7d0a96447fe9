//! Link strategies: three interchangeable ways to make a profile's
//! `mods`/`saves` content appear at the game's user-data path.
//!
//! - `Move` physically relocates the two folders.
//! - `Symlink` leaves them in the profile and links to them.
//! - `Junction` does the same through a Windows directory junction, which
//!   needs no elevated privileges there.
//!
//! Every perform has a symmetric revert. Reverting link-based strategies
//! refuses to delete anything that is not actually a link.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::{ActivationError, Result};
use crate::paths::profile_subfolders;

/// How profile content is made visible at the user-data path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkStrategy {
    Move,
    Symlink,
    Junction,
}

impl LinkStrategy {
    pub fn all() -> [LinkStrategy; 3] {
        [Self::Move, Self::Symlink, Self::Junction]
    }

    /// Whether this strategy can work on the current platform at all.
    /// Junctions exist only on the Windows family.
    pub fn is_available(&self) -> bool {
        match self {
            Self::Move | Self::Symlink => true,
            Self::Junction => cfg!(windows),
        }
    }

    /// Make `profile_dir`'s content visible at `user_data_dir`.
    pub fn perform(&self, profile_dir: &Path, user_data_dir: &Path) -> Result<()> {
        match self {
            Self::Move => perform_profile_move(profile_dir, user_data_dir),
            Self::Symlink => perform_profile_symlinks(profile_dir, user_data_dir),
            Self::Junction => perform_profile_junctions(profile_dir, user_data_dir),
        }
    }

    /// Undo [`perform`](Self::perform), restoring the pre-activation state.
    pub fn revert(&self, user_data_dir: &Path, profile_dir: &Path) -> Result<()> {
        match self {
            Self::Move => revert_profile_move(user_data_dir, profile_dir),
            Self::Symlink | Self::Junction => revert_links(user_data_dir),
        }
    }
}

impl fmt::Display for LinkStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Move => write!(f, "move"),
            Self::Symlink => write!(f, "symlink"),
            Self::Junction => write!(f, "junction"),
        }
    }
}

impl FromStr for LinkStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "move" => Ok(Self::Move),
            "symlink" => Ok(Self::Symlink),
            "junction" => Ok(Self::Junction),
            _ => Err(format!("unknown strategy: {}", s)),
        }
    }
}

/// Dispatch to the configured strategy's perform.
///
/// `strategy` is `None` when settings never recorded one; that is an
/// [`ActivationError::InvalidArgument`], not a default.
pub fn perform_move_general(
    strategy: Option<LinkStrategy>,
    user_data_dir: &Path,
    profile_dir: &Path,
) -> Result<()> {
    let strategy = strategy.ok_or(ActivationError::InvalidArgument("strategy is not set"))?;
    strategy.perform(profile_dir, user_data_dir)
}

/// Dispatch to the configured strategy's revert.
pub fn revert_move_general(
    strategy: Option<LinkStrategy>,
    user_data_dir: &Path,
    profile_dir: &Path,
) -> Result<()> {
    let strategy = strategy.ok_or(ActivationError::InvalidArgument("strategy is not set"))?;
    strategy.revert(user_data_dir, profile_dir)
}

// -----------------------------------------------------------------------------
// Move
// -----------------------------------------------------------------------------

/// Move `mods` and `saves` from the profile folder into the user-data folder.
///
/// Not atomic across the pair. If the second move fails the first one is
/// moved back; if that rollback also fails the error reports the
/// half-moved state instead of guessing a repair.
fn perform_profile_move(profile_dir: &Path, user_data_dir: &Path) -> Result<()> {
    let (profile_mods, profile_saves) = profile_subfolders(profile_dir);
    let (data_mods, data_saves) = profile_subfolders(user_data_dir);

    move_folder_pair(&profile_mods, &data_mods, &profile_saves, &data_saves)
}

/// Move `mods` and `saves` back from the user-data folder into the profile.
fn revert_profile_move(user_data_dir: &Path, profile_dir: &Path) -> Result<()> {
    let (profile_mods, profile_saves) = profile_subfolders(profile_dir);
    let (data_mods, data_saves) = profile_subfolders(user_data_dir);

    move_folder_pair(&data_mods, &profile_mods, &data_saves, &profile_saves)
}

fn move_folder_pair(
    first_src: &Path,
    first_dst: &Path,
    second_src: &Path,
    second_dst: &Path,
) -> Result<()> {
    for src in [first_src, second_src] {
        if !src.exists() {
            return Err(ActivationError::MissingPath(src.to_path_buf()));
        }
    }

    fs::rename(first_src, first_dst)?;

    if let Err(e) = fs::rename(second_src, second_dst) {
        // Roll the first move back so the pair stays together.
        return match fs::rename(first_dst, first_src) {
            Ok(()) => Err(e.into()),
            Err(rollback) => Err(ActivationError::partial(
                format!(
                    "moved {} but failed to move {}, and rollback failed: {}",
                    first_src.display(),
                    second_src.display(),
                    rollback
                ),
                e.into(),
            )),
        };
    }

    Ok(())
}

// -----------------------------------------------------------------------------
// Symlink
// -----------------------------------------------------------------------------

/// Create `userData/mods` and `userData/saves` as symlinks into the profile.
fn perform_profile_symlinks(profile_dir: &Path, user_data_dir: &Path) -> Result<()> {
    let (profile_mods, profile_saves) = profile_subfolders(profile_dir);
    let (data_mods, data_saves) = profile_subfolders(user_data_dir);

    check_link_preconditions(&profile_mods, &profile_saves, &data_mods, &data_saves)?;

    make_symlink(&profile_mods, &data_mods)?;
    make_symlink(&profile_saves, &data_saves)?;
    Ok(())
}

/// Create `userData/mods` and `userData/saves` as directory junctions.
fn perform_profile_junctions(profile_dir: &Path, user_data_dir: &Path) -> Result<()> {
    let (profile_mods, profile_saves) = profile_subfolders(profile_dir);
    let (data_mods, data_saves) = profile_subfolders(user_data_dir);

    check_link_preconditions(&profile_mods, &profile_saves, &data_mods, &data_saves)?;

    junction::create(&data_mods, &profile_mods)?;
    junction::create(&data_saves, &profile_saves)?;
    Ok(())
}

fn check_link_preconditions(
    profile_mods: &Path,
    profile_saves: &Path,
    data_mods: &Path,
    data_saves: &Path,
) -> Result<()> {
    for src in [profile_mods, profile_saves] {
        if !src.exists() {
            return Err(ActivationError::MissingPath(src.to_path_buf()));
        }
    }
    // symlink_metadata also catches dangling links left behind earlier
    for dst in [data_mods, data_saves] {
        if fs::symlink_metadata(dst).is_ok() {
            return Err(ActivationError::AlreadyExists(dst.to_path_buf()));
        }
    }
    Ok(())
}

/// Delete the `mods`/`saves` entries in the user-data folder, verifying
/// first that each is genuinely a link. Dangling links are deleted without
/// complaint; a real directory is never touched.
fn revert_links(user_data_dir: &Path) -> Result<()> {
    let (data_mods, data_saves) = profile_subfolders(user_data_dir);

    for entry in [&data_mods, &data_saves] {
        let meta = match fs::symlink_metadata(entry) {
            Ok(m) => m,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
            Err(e) => return Err(e.into()),
        };

        if meta.file_type().is_symlink() {
            remove_link(entry)?;
            continue;
        }

        // Junctions are not reported as symlinks everywhere; fall back to
        // the real-path comparison.
        if is_link(entry)? {
            remove_link(entry)?;
        } else {
            return Err(ActivationError::NotALink(entry.to_path_buf()));
        }
    }

    Ok(())
}

// -----------------------------------------------------------------------------
// Link primitives
// -----------------------------------------------------------------------------

/// Check whether `path` is a symlink or a junction.
///
/// A path whose real path differs from its nominal path resolves through
/// some link. Does not distinguish junction from symlink.
pub fn is_link(path: &Path) -> Result<bool> {
    let meta = fs::symlink_metadata(path)?;
    if meta.file_type().is_symlink() {
        return Ok(true);
    }

    let real = match fs::canonicalize(path) {
        Ok(p) => p,
        // Resolvable metadata but unresolvable real path: dangling link
        Err(_) => return Ok(true),
    };

    let nominal = match (path.parent(), path.file_name()) {
        (Some(parent), Some(name)) => fs::canonicalize(parent)?.join(name),
        _ => return Ok(false),
    };

    Ok(real != nominal)
}

fn make_symlink(target: &Path, link: &Path) -> Result<()> {
    #[cfg(unix)]
    std::os::unix::fs::symlink(target, link)?;

    #[cfg(windows)]
    std::os::windows::fs::symlink_dir(target, link)?;

    Ok(())
}

/// Remove a link without following it.
fn remove_link(link: &Path) -> Result<()> {
    #[cfg(unix)]
    fs::remove_file(link)?;

    // Directory links on Windows are removed as directories. This deletes
    // the link, not the target.
    #[cfg(windows)]
    fs::remove_dir(link)?;

    Ok(())
}

/// Probe whether symlink creation is permitted, using a scratch directory.
///
/// Creates and removes a throwaway target/link pair. Any failure means the
/// strategy should not be offered.
pub fn probe_symlink_permission(scratch_dir: &Path) -> bool {
    let target = scratch_dir.join("probe_target");
    let link = scratch_dir.join("probe_link");

    if fs::create_dir_all(&target).is_err() {
        return false;
    }

    let created = make_symlink(&target, &link).is_ok();

    let _ = remove_link(&link);
    let _ = fs::remove_dir(&target);

    created
}

// -----------------------------------------------------------------------------
// Junctions (Windows directory aliases, created via `mklink /J`)
// -----------------------------------------------------------------------------

pub mod junction {
    use super::*;
    use std::time::{Duration, Instant};

    /// Bound on how long an `mklink`/`rmdir` child process may run.
    const PROCESS_TIMEOUT: Duration = Duration::from_secs(5);

    /// Create a directory junction at `link` pointing at `target`.
    #[cfg(windows)]
    pub fn create(link: &Path, target: &Path) -> Result<()> {
        let target = target.canonicalize()?;
        if !target.is_dir() {
            return Err(ActivationError::MissingPath(target));
        }
        if fs::symlink_metadata(link).is_ok() {
            return Err(ActivationError::AlreadyExists(link.to_path_buf()));
        }

        let status = run_bounded(&[
            "/C",
            "mklink",
            "/J",
            &link.to_string_lossy(),
            &target.to_string_lossy(),
        ])?;
        if status != 0 {
            return Err(std::io::Error::other(format!("mklink exited with {}", status)).into());
        }
        Ok(())
    }

    #[cfg(not(windows))]
    pub fn create(_link: &Path, _target: &Path) -> Result<()> {
        Err(ActivationError::PlatformUnsupported(
            "directory junctions require Windows",
        ))
    }

    /// Probe whether junction creation is permitted by creating and
    /// removing one in a scratch directory. Always `false` off Windows.
    pub fn probe_permission(scratch_dir: &Path) -> bool {
        if !cfg!(windows) {
            return false;
        }
        probe_permission_impl(scratch_dir)
    }

    #[cfg(windows)]
    fn probe_permission_impl(scratch_dir: &Path) -> bool {
        let from_dir = scratch_dir.join("probe_junction_target");
        let to_dir = scratch_dir.join("probe_junction_link");

        if fs::create_dir_all(&from_dir).is_err() {
            return false;
        }

        let created = create(&to_dir, &from_dir).is_ok() && to_dir.exists();

        // rmdir deletes the junction itself, never the target's content
        let _ = run_bounded(&["/C", "rmdir", &to_dir.to_string_lossy()]);
        let _ = fs::remove_dir(&from_dir);

        created
    }

    #[cfg(not(windows))]
    fn probe_permission_impl(_scratch_dir: &Path) -> bool {
        false
    }

    /// Run `cmd` with the given arguments, waiting at most
    /// [`PROCESS_TIMEOUT`]. A process that outlives the bound is killed
    /// and treated as failed rather than waited on forever.
    #[cfg(windows)]
    fn run_bounded(args: &[&str]) -> Result<i32> {
        let mut child = std::process::Command::new("cmd")
            .args(args)
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .spawn()?;

        let deadline = Instant::now() + PROCESS_TIMEOUT;
        loop {
            if let Some(status) = child.try_wait()? {
                return Ok(status.code().unwrap_or(-1));
            }
            if Instant::now() >= deadline {
                let _ = child.kill();
                let _ = child.wait();
                return Err(std::io::Error::new(
                    std::io::ErrorKind::TimedOut,
                    "cmd child process exceeded time bound",
                )
                .into());
            }
            std::thread::sleep(Duration::from_millis(50));
        }
    }

    // Keep the timeout constant referenced on every platform.
    #[cfg(not(windows))]
    #[allow(dead_code)]
    fn run_bounded(_args: &[&str]) -> Result<i32> {
        let _ = (PROCESS_TIMEOUT, Instant::now());
        Err(ActivationError::PlatformUnsupported(
            "cmd is only invoked on Windows",
        ))
    }
}
