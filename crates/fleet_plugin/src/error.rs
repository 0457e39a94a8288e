//! Plugin-layer error types.

use std::path::PathBuf;

/// Errors that can occur while loading a native module.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    /// The platform loader rejected the module. Carries the path as it was
    /// requested by the caller, not the normalized one.
    #[error("unable to load shared library '{path}': {reason}")]
    Open {
        /// The path the caller asked for.
        path: String,
        /// The platform loader's diagnostic text.
        reason: String,
    },

    /// The given path has no usable file-name component.
    #[error("shared library path '{0}' has no file name")]
    InvalidPath(String),

    /// The working directory could not be restored after the load attempt.
    /// Surfaced separately so the process never silently keeps running in
    /// the module's directory.
    #[error("unable to restore working directory to '{dir}': {reason}")]
    RestoreWorkingDir {
        /// The directory the process should have returned to.
        dir: PathBuf,
        /// The OS diagnostic.
        reason: String,
    },

    /// A requested entry-point symbol is missing from the module.
    #[error("symbol '{symbol}' not found in '{path}': {reason}")]
    Symbol {
        /// The requested symbol name.
        symbol: String,
        /// The module's requested path.
        path: String,
        /// The platform loader's diagnostic text.
        reason: String,
    },
}
