//! Typed errors for the strategy and activation layers.
//!
//! Everything in this taxonomy is recoverable at the operation boundary:
//! the CLI decides whether to retry, ignore, or prompt. Filesystem errors
//! are never swallowed; anything unexpected surfaces through
//! [`ActivationError::Io`].

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ActivationError {
    /// An expected directory is absent.
    #[error("expected path does not exist: {0}")]
    MissingPath(PathBuf),

    /// A link target is already present at the user-data path.
    #[error("cannot create link, path already exists: {0}")]
    AlreadyExists(PathBuf),

    /// A subfolder at the user-data path is already a link; initial setup
    /// would nest a link inside a link.
    #[error("folder is already a symbolic link: {0}")]
    AlreadySymlink(PathBuf),

    /// Revert was asked to delete something that is not a link. Refused,
    /// deleting a real directory here would lose user data.
    #[error("refusing to delete, not a link: {0}")]
    NotALink(PathBuf),

    /// Rename or create target already exists on disk.
    #[error("name already in use: {0}")]
    NameConflict(PathBuf),

    /// No strategy configured (the settings zero value).
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    /// Junctions requested outside the Windows family, or without the
    /// permission the probe checks for.
    #[error("operation not supported on this platform: {0}")]
    PlatformUnsupported(&'static str),

    /// A composite operation failed after partially succeeding. The caller
    /// must surface this; there is no silent auto-recovery.
    #[error("operation partially completed: {context}: {source}")]
    PartialFailure {
        context: String,
        #[source]
        source: Box<ActivationError>,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl ActivationError {
    /// Wrap an error that occurred after earlier steps already mutated the
    /// filesystem.
    pub fn partial(context: impl Into<String>, source: ActivationError) -> Self {
        Self::PartialFailure {
            context: context.into(),
            source: Box::new(source),
        }
    }
}

pub type Result<T, E = ActivationError> = std::result::Result<T, E>;
