//! File change fingerprints
//!
//! A fingerprint is the pair (mtime, size). Cheap to take, stable across
//! scans of an unchanged file, and good enough for change detection: a
//! content edit that preserves both is outside the threat model, and a
//! stale skip self-heals on the next real change.

use std::fs;
use std::path::Path;
use std::time::UNIX_EPOCH;

use serde::{Deserialize, Serialize};

use brokkr_core::Result;

/// Change fingerprint of a scanned file
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fingerprint {
    /// Modification time, nanoseconds since the epoch
    pub mtime: u64,
    /// File size in bytes
    pub size: u64,
}

impl Fingerprint {
    /// Take the fingerprint of a file on disk
    pub fn of(path: &Path) -> Result<Self> {
        let metadata = fs::metadata(path)?;
        let mtime = metadata
            .modified()?
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(0);
        Ok(Self {
            mtime,
            size: metadata.len(),
        })
    }
}
