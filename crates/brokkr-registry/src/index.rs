//! The host index record
//!
//! One record per store summarizing everything a host needs at startup:
//! the registered scan roots, the installed addins (with pointers to
//! their description records), and the fully resolved extension points.
//! It is rewritten in the same transaction as the records it points to,
//! so a reader never observes an index referencing missing descriptions.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use brokkr_core::types::{Domain, ExtensionPoint};
use brokkr_core::AddinVersion;
use brokkr_store::StoreRecord;

/// A directory registered for scanning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegisteredFolder {
    /// Directory to walk on every update
    pub path: PathBuf,

    /// Whether to descend into plain subdirectories
    pub recursive: bool,
}

/// One installed addin, as recorded in the host index
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstalledAddin {
    /// Full addin id
    pub id: String,

    /// Installed version
    pub version: AddinVersion,

    /// Store-relative path of the description record
    pub record: String,

    /// Whether the addin is a root (host contract)
    pub is_root: bool,

    /// File the addin was scanned from
    pub source_file: PathBuf,

    /// Domain of the folder that produced it
    pub domain: Domain,
}

/// Persistent summary of the registry's resolved state
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HostIndex {
    /// Registered scan roots
    pub folders: Vec<RegisteredFolder>,

    /// Installed addins, sorted by id then version
    pub installed: Vec<InstalledAddin>,

    /// Resolved extension points, sorted by path
    pub points: Vec<ExtensionPoint>,
}

impl StoreRecord for HostIndex {
    const TYPE_NAME: &'static str = "HostIndex";
}

impl HostIndex {
    /// Installed entries for one addin id
    pub fn versions_of<'a>(&'a self, id: &'a str) -> impl Iterator<Item = &'a InstalledAddin> {
        self.installed.iter().filter(move |a| a.id == id)
    }

    /// Whether any version of an addin id is installed
    pub fn is_installed(&self, id: &str) -> bool {
        self.versions_of(id).next().is_some()
    }
}
