//! Native module loading.
//!
//! A [`LoadedModule`] is the sole owner of one dynamically loaded shared
//! library. Loading is atomic: a failed load never yields a module object.
//! Unloading happens exactly once, when the owner is dropped — unless the
//! module was pinned with `prevent_unload`, in which case the OS handle
//! stays mapped until process exit. That pin exists for plugins that
//! install process-lifetime state (factories, allocator hooks) which is
//! unsafe to revoke while proxies built from the plugin are still alive.

use std::mem::ManuallyDrop;
use std::path::{Path, PathBuf};

use libloading::Library;
use tracing::debug;

use crate::error::LoadError;

/// Environment variable naming the service-bus plugin to load.
pub const SERVICE_BUS_PLUGIN_ENV: &str = "FLEET_SERVICE_BUS_PLUGIN";

/// Platform file-name prefix for shared libraries.
#[cfg(windows)]
const LIBRARY_PREFIX: &str = "";
/// Platform file-name prefix for shared libraries.
#[cfg(not(windows))]
const LIBRARY_PREFIX: &str = "lib";

/// Platform shared-library extension.
#[cfg(windows)]
const LIBRARY_EXTENSION: &str = "dll";
/// Platform shared-library extension.
#[cfg(target_os = "macos")]
const LIBRARY_EXTENSION: &str = "dylib";
/// Platform shared-library extension.
#[cfg(all(unix, not(target_os = "macos")))]
const LIBRARY_EXTENSION: &str = "so";

/// Normalize a library path to the platform's native naming convention.
///
/// Operates on the file-name component only: surrounding whitespace is
/// trimmed, the platform prefix (`lib` on Unix-like targets) is prepended
/// when missing, and the native extension is appended when the name has
/// none. The directory part is left untouched, and the file does not have
/// to exist.
///
/// # Errors
///
/// Returns [`LoadError::InvalidPath`] if the path has no file name.
pub fn resolve_library_path(path: &str) -> Result<PathBuf, LoadError> {
    normalize_file_name(path, LIBRARY_PREFIX, LIBRARY_EXTENSION)
}

fn normalize_file_name(path: &str, prefix: &str, extension: &str) -> Result<PathBuf, LoadError> {
    let trimmed = path.trim();
    let full_path = Path::new(trimmed);
    let Some(file_name) = full_path.file_name().and_then(|n| n.to_str()) else {
        return Err(LoadError::InvalidPath(path.to_string()));
    };

    let mut file_name = file_name.to_string();
    if !prefix.is_empty() && !file_name.starts_with(prefix) {
        file_name = format!("{prefix}{file_name}");
    }
    if Path::new(&file_name).extension().is_none() {
        file_name = format!("{file_name}.{extension}");
    }

    Ok(match full_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.join(file_name),
        _ => PathBuf::from(file_name),
    })
}

/// One dynamically loaded native module.
///
/// Owns the OS library handle. The handle is either valid or this object
/// does not exist; there is no partially loaded state. Dropping the module
/// unloads the library unless it was pinned with `prevent_unload`.
pub struct LoadedModule {
    /// The path as the caller requested it (not normalized).
    requested_path: String,
    /// The normalized path that was actually opened.
    resolved_path: PathBuf,
    /// Dropped manually so the pin flag can skip the unload.
    library: ManuallyDrop<Library>,
    prevent_unload: bool,
}

impl LoadedModule {
    /// Load the native module at `path`.
    ///
    /// The file name is normalized per [`resolve_library_path`] before the
    /// platform loader is invoked. With `prevent_unload` the library is
    /// never unloaded, even when this object is dropped.
    ///
    /// # Errors
    ///
    /// Returns [`LoadError::Open`] carrying the requested path and the
    /// platform loader's diagnostic if the module cannot be loaded.
    pub fn load(path: &str, prevent_unload: bool) -> Result<Self, LoadError> {
        let resolved_path = resolve_library_path(path)?;
        let library = open_module(&resolved_path, path)?;
        debug!(
            path,
            resolved = %resolved_path.display(),
            prevent_unload,
            "loaded native module"
        );
        Ok(Self {
            requested_path: path.to_string(),
            resolved_path,
            library: ManuallyDrop::new(library),
            prevent_unload,
        })
    }

    /// Load the service-bus plugin named by [`SERVICE_BUS_PLUGIN_ENV`].
    ///
    /// Returns `Ok(None)` when the variable is unset or empty.
    ///
    /// # Errors
    ///
    /// Returns [`LoadError`] if the variable names a module that cannot be
    /// loaded.
    pub fn load_from_env(prevent_unload: bool) -> Result<Option<Self>, LoadError> {
        match std::env::var(SERVICE_BUS_PLUGIN_ENV) {
            Ok(path) if !path.trim().is_empty() => Self::load(&path, prevent_unload).map(Some),
            _ => Ok(None),
        }
    }

    /// The path as originally requested by the caller.
    #[must_use]
    pub fn file_path(&self) -> &str {
        &self.requested_path
    }

    /// The normalized path that was handed to the platform loader.
    #[must_use]
    pub fn resolved_path(&self) -> &Path {
        &self.resolved_path
    }

    /// Whether this module is pinned in memory for process lifetime.
    #[must_use]
    pub fn prevent_unload(&self) -> bool {
        self.prevent_unload
    }

    /// Look up an extern entry point in the module.
    ///
    /// The returned symbol borrows the module, so the module outlives every
    /// raw entry point handed out — callers must not smuggle the pointer
    /// past that borrow.
    ///
    /// # Errors
    ///
    /// Returns [`LoadError::Symbol`] if the symbol is absent.
    ///
    /// # Safety
    ///
    /// The caller must ensure `T` matches the actual type of the exported
    /// symbol; a mismatch is undefined behaviour.
    pub unsafe fn symbol<T>(&self, name: &str) -> Result<libloading::Symbol<'_, T>, LoadError> {
        unsafe {
            self.library
                .get(name.as_bytes())
                .map_err(|source| LoadError::Symbol {
                    symbol: name.to_string(),
                    path: self.requested_path.clone(),
                    reason: source.to_string(),
                })
        }
    }
}

impl Drop for LoadedModule {
    fn drop(&mut self) {
        if self.prevent_unload {
            // Pinned: leak the handle so the OS mapping survives until
            // process exit.
            debug!(path = %self.resolved_path.display(), "module pinned, skipping unload");
        } else {
            // The handle is dropped exactly once; `library` is never
            // touched again after this point.
            unsafe { ManuallyDrop::drop(&mut self.library) };
        }
    }
}

impl std::fmt::Debug for LoadedModule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadedModule")
            .field("requested_path", &self.requested_path)
            .field("resolved_path", &self.resolved_path)
            .field("prevent_unload", &self.prevent_unload)
            .finish_non_exhaustive()
    }
}

/// Open the library, resolving transitive native dependencies from its own
/// directory. On Windows that requires temporarily switching the working
/// directory; the switch is always undone, and a failed restore surfaces as
/// [`LoadError::RestoreWorkingDir`].
#[cfg(windows)]
fn open_module(resolved: &Path, requested: &str) -> Result<Library, LoadError> {
    let open_error = |reason: String| LoadError::Open {
        path: requested.to_string(),
        reason,
    };

    let original_dir = std::env::current_dir().map_err(|e| open_error(e.to_string()))?;
    if let Some(parent) = resolved.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::env::set_current_dir(parent).map_err(|e| open_error(e.to_string()))?;
    }

    let loaded = unsafe { Library::new(resolved) };

    if let Err(source) = std::env::set_current_dir(&original_dir) {
        return Err(LoadError::RestoreWorkingDir {
            dir: original_dir,
            reason: source.to_string(),
        });
    }

    loaded.map_err(|source| open_error(source.to_string()))
}

#[cfg(not(windows))]
fn open_module(resolved: &Path, requested: &str) -> Result<Library, LoadError> {
    unsafe { Library::new(resolved) }.map_err(|source| LoadError::Open {
        path: requested.to_string(),
        reason: source.to_string(),
    })
}
