//! Error types for brokkr-core

use thiserror::Error;

/// Result type alias using brokkr-core's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Core error taxonomy for the registry engine.
///
/// Most variants are recoverable within a scan pass: IO problems cascade
/// into removals, load failures are retried next pass, and cache corruption
/// is a cache miss. Only `StoreUnavailable` and corruption of the host
/// index abort an update.
#[derive(Error, Debug)]
pub enum Error {
    /// Folder or file missing or unreadable
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed aggregator or addin manifest
    #[error("Failed to parse manifest {path}: {message}")]
    ManifestParse { path: String, message: String },

    /// The reflector could not introspect a compiled module
    #[error("Failed to load module {path}: {message}")]
    ModuleLoad { path: String, message: String },

    /// A persisted record failed to deserialize
    #[error("Corrupted cache record: {record}")]
    CacheCorruption { record: String },

    /// The cache directory cannot be created or locked at all
    #[error("Registry store unavailable at {path}: {message}")]
    StoreUnavailable { path: String, message: String },

    /// Not a dotted-numeric version string
    #[error("Invalid version format: {version}")]
    InvalidVersion { version: String },

    /// Lookup for an addin id that is not installed
    #[error("Addin not installed: {id}")]
    AddinNotFound { id: String },
}

impl Error {
    /// Create a manifest parse error
    pub fn manifest_parse(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ManifestParse {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a module load error
    pub fn module_load(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ModuleLoad {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a cache corruption error
    pub fn cache_corruption(record: impl Into<String>) -> Self {
        Self::CacheCorruption {
            record: record.into(),
        }
    }

    /// Create a store unavailable error
    pub fn store_unavailable(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::StoreUnavailable {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create an invalid version error
    pub fn invalid_version(version: impl Into<String>) -> Self {
        Self::InvalidVersion {
            version: version.into(),
        }
    }

    /// Create an addin not found error
    pub fn addin_not_found(id: impl Into<String>) -> Self {
        Self::AddinNotFound { id: id.into() }
    }
}
