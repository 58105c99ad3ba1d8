//! Thin wrapper around a dynamically loaded shared library.

use std::path::{Path, PathBuf};

use libloading::{Library, Symbol};

use crate::error::{Error, Result};

/// An open shared-library handle.
///
/// Symbols resolved from it are raw function pointers; the library must
/// stay alive for as long as they are called. [`crate::predictor::Predictor`]
/// owns both, releasing the handle on drop.
pub struct SharedLibrary {
    lib: Library,
    path: PathBuf,
}

impl SharedLibrary {
    /// Load the library at `path` (.so / .dylib / .dll).
    pub fn open(path: &Path) -> Result<Self> {
        let lib = unsafe { Library::new(path) }.map_err(|e| {
            Error::Abi(format!(
                "failed to load dynamic shared library '{}': {e}",
                path.display()
            ))
        })?;
        Ok(Self {
            lib,
            path: path.to_path_buf(),
        })
    }

    /// Resolve a symbol, naming the library path on failure.
    ///
    /// # Safety
    ///
    /// `T` must match the symbol's actual signature.
    pub unsafe fn get<T>(&self, name: &str) -> Result<Symbol<'_, T>> {
        self.lib.get(name.as_bytes()).map_err(|_| {
            Error::Abi(format!(
                "dynamic shared library '{}' does not contain a function {name}()",
                self.path.display()
            ))
        })
    }

    /// Path the library was loaded from.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl std::fmt::Debug for SharedLibrary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedLibrary").field("path", &self.path).finish()
    }
}
