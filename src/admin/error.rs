use std::path::PathBuf;

use thiserror::Error;

use crate::types::StrudexError;

/// Failures of the operator-facing commands.
#[derive(Debug, Error)]
pub enum AdminError {
    /// No snapshot exists at the given path and creation was not requested.
    #[error("store not found: {0}")]
    MissingStore(PathBuf),
    /// A checker name that is not one of the bundled kinds.
    #[error("unknown checker '{0}' (expected spacegroup, members, canonical or external-id)")]
    UnknownChecker(String),
    /// Registry, store, or checker failure.
    #[error(transparent)]
    Core(#[from] StrudexError),
    /// Filesystem failure outside the store itself.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Result alias for the admin module.
pub type Result<T> = std::result::Result<T, AdminError>;
