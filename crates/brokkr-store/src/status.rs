//! Registry status configuration
//!
//! Small mutable record tracking which addins are disabled and which are
//! pending uninstall. Kept as YAML next to the binary records so a user
//! can inspect it; a missing or malformed file reads as the default
//! (everything enabled, nothing pending).

use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use brokkr_core::Result;

/// Name of the status file inside the store root
pub const STATUS_FILE: &str = "registry-status.yaml";

/// Enabled/disabled and pending-uninstall state for installed addins
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryStatus {
    /// Full ids of explicitly disabled addins
    #[serde(default)]
    pub disabled: BTreeSet<String>,

    /// Full ids scheduled for removal on the next pass
    #[serde(default)]
    pub pending_uninstall: BTreeSet<String>,
}

impl RegistryStatus {
    /// Load from a status file; absent or unreadable files are the default
    pub fn load(path: &Path) -> Self {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(_) => return Self::default(),
        };
        match serde_yaml_ng::from_str(&content) {
            Ok(status) => status,
            Err(e) => {
                warn!("Ignoring malformed status file {:?}: {}", path, e);
                Self::default()
            }
        }
    }

    /// Save to a status file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_yaml_ng::to_string(self)
            .map_err(|e| brokkr_core::Error::cache_corruption(format!("status encode: {e}")))?;
        fs::write(path, content)?;
        debug!(
            "Saved registry status: {} disabled, {} pending uninstall",
            self.disabled.len(),
            self.pending_uninstall.len()
        );
        Ok(())
    }

    /// Whether an addin id is enabled
    pub fn is_enabled(&self, addin_id: &str) -> bool {
        !self.disabled.contains(addin_id)
    }

    /// Mark an addin disabled
    pub fn disable(&mut self, addin_id: &str) {
        self.disabled.insert(addin_id.to_string());
    }

    /// Mark an addin enabled again
    pub fn enable(&mut self, addin_id: &str) {
        self.disabled.remove(addin_id);
    }
}
