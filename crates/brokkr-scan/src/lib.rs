//! # brokkr-scan
//!
//! Folder scanning and change detection for the addin registry:
//! - Per-folder cache of file fingerprints, produced addins, and error flags
//! - Aggregator manifest parsing (extra directories, exclude patterns)
//! - Addin manifest lowering into declaration bags
//! - The incremental scanner that decides what actually needs rescanning

pub mod aggregator;
pub mod fingerprint;
pub mod folder_cache;
pub mod manifest;
pub mod scanner;
pub mod sidecar;

pub use aggregator::{AggregatorManifest, DirectoryEntry, ExcludeSet};
pub use fingerprint::Fingerprint;
pub use folder_cache::{FileInfo, FolderInfo, FolderInfoCache};
pub use manifest::{parse_addin_manifest, ParsedManifest};
pub use scanner::{FileScan, FolderScanner, ScanPass, ScanRoot};
pub use sidecar::SidecarReflector;
