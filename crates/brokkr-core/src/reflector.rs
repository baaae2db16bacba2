//! The module reflector collaborator
//!
//! Extracting declarative metadata from a compiled binary is outside this
//! system; the registry consumes it through this trait. Implementations
//! must tolerate being asked about a module that cannot be loaded and
//! answer "no data" instead of failing.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::declarations::ModuleMetadata;
use crate::error::Result;

/// Extracts declared metadata from a compiled module
pub trait ModuleReflector: Send + Sync {
    /// Reflect over the module at `path`.
    ///
    /// `Ok(None)` means the file carries no addin metadata (or could not be
    /// introspected); `Err` is reserved for failures the caller should
    /// record against the file and retry on the next pass.
    fn reflect(&self, path: &Path) -> Result<Option<ModuleMetadata>>;
}

/// Reflector that knows nothing about any module
#[derive(Debug, Default, Clone, Copy)]
pub struct NullReflector;

impl ModuleReflector for NullReflector {
    fn reflect(&self, _path: &Path) -> Result<Option<ModuleMetadata>> {
        Ok(None)
    }
}

/// Reflector backed by a fixed path → metadata map.
///
/// Stands in for a real binary reflector in tests and in hosts that
/// pre-extract metadata out of band.
#[derive(Debug, Default)]
pub struct StaticReflector {
    modules: HashMap<PathBuf, ModuleMetadata>,
}

impl StaticReflector {
    /// Create an empty static reflector
    pub fn new() -> Self {
        Self::default()
    }

    /// Register metadata for a module path
    pub fn insert(&mut self, path: impl Into<PathBuf>, metadata: ModuleMetadata) {
        self.modules.insert(path.into(), metadata);
    }
}

impl ModuleReflector for StaticReflector {
    fn reflect(&self, path: &Path) -> Result<Option<ModuleMetadata>> {
        Ok(self.modules.get(path).cloned())
    }
}
