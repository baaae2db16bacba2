//! Per-folder scan cache
//!
//! One `FolderInfo` record per scanned directory, persisted in the store
//! and loaded lazily. It remembers, per file, the last fingerprint, the
//! addin the file produced, the error flag, and any paths the file told
//! us to ignore. The folder's domain is sticky: read once, overwritten
//! only when newly observed data contradicts it, and a domain change
//! forces regeneration of that folder's relation data.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use brokkr_core::types::Domain;
use brokkr_core::Result;
use brokkr_store::{Store, StoreRecord, Transaction};

use crate::fingerprint::Fingerprint;

/// Cached scan state for one file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FileInfo {
    /// Absolute path of the file
    pub path: PathBuf,

    /// Fingerprint at the last scan
    pub fingerprint: Fingerprint,

    /// Full id of the addin this file produced; empty if none
    pub addin_id: String,

    /// Version of that addin, as a string key for its store record
    pub addin_version: String,

    /// Whether the produced addin is a root
    pub is_root: bool,

    /// Store-relative path of the description record this file produced;
    /// shared-object records encode the source content hash
    pub record: String,

    /// Whether the last scan of this file failed
    pub scan_error: bool,

    /// Paths this file told the scanner to skip (module files referenced
    /// by a manifest, for example)
    pub ignore_paths: Vec<PathBuf>,
}

impl FileInfo {
    /// True when the file produced an installed addin
    pub fn has_addin(&self) -> bool {
        !self.addin_id.is_empty()
    }
}

/// Cached scan state for one folder
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FolderInfo {
    /// Absolute path of the folder
    pub folder_path: PathBuf,

    /// Sticky domain; `None` until first established
    pub domain: Option<Domain>,

    /// Whether the folder carries a pre-computed scan-data index
    pub has_scan_index: bool,

    /// Per-file scan state, keyed by absolute path
    pub files: HashMap<PathBuf, FileInfo>,

    /// Directories this folder pulled into its last pass (recursion and
    /// aggregator directories), so a subtree that vanishes between passes
    /// is still reconciled
    pub subfolders: Vec<PathBuf>,

    /// When the folder was last walked
    pub last_scan: Option<DateTime<Utc>>,
}

impl StoreRecord for FolderInfo {
    const TYPE_NAME: &'static str = "FolderInfo";
}

impl FolderInfo {
    /// Cached entries whose path is not in `seen` (the file disappeared)
    pub fn missing_files(&self, seen: &HashSet<PathBuf>) -> Vec<FileInfo> {
        self.files
            .values()
            .filter(|info| !seen.contains(&info.path))
            .cloned()
            .collect()
    }
}

/// Lazily loaded map of folder path → FolderInfo, backed by the store
#[derive(Debug)]
pub struct FolderInfoCache {
    store: Store,
    folders: HashMap<PathBuf, FolderInfo>,
    dirty: HashSet<PathBuf>,
    dropped: HashSet<PathBuf>,
}

impl FolderInfoCache {
    /// Create a cache over a store
    pub fn new(store: Store) -> Self {
        Self {
            store,
            folders: HashMap::new(),
            dirty: HashSet::new(),
            dropped: HashSet::new(),
        }
    }

    /// Folder state, loading the persisted record on first access.
    ///
    /// A record that fails to deserialize is a cache miss: the folder
    /// starts empty and every file in it rescans.
    pub fn folder(&mut self, path: &Path) -> &FolderInfo {
        self.folder_mut_untracked(path)
    }

    fn folder_mut_untracked(&mut self, path: &Path) -> &mut FolderInfo {
        if !self.folders.contains_key(path) {
            let loaded = self
                .store
                .read::<FolderInfo>(&Store::folder_record(path))
                .unwrap_or_else(|| FolderInfo {
                    folder_path: path.to_path_buf(),
                    ..Default::default()
                });
            self.folders.insert(path.to_path_buf(), loaded);
        }
        self.folders.get_mut(path).expect("just inserted")
    }

    /// Cached state for one file in a folder
    pub fn get_file_info(&mut self, folder: &Path, file: &Path) -> Option<FileInfo> {
        self.folder_mut_untracked(folder).files.get(file).cloned()
    }

    /// Record the scan result for a file. Re-recording an identical
    /// result does not dirty the folder.
    pub fn set_file_info(&mut self, folder: &Path, info: FileInfo) {
        let entry = self.folder_mut_untracked(folder);
        if entry.files.get(&info.path) == Some(&info) {
            return;
        }
        entry.files.insert(info.path.clone(), info);
        self.mark_dirty(folder);
    }

    /// Remove a file's cached state
    pub fn remove_file_info(&mut self, folder: &Path, file: &Path) {
        let entry = self.folder_mut_untracked(folder);
        if entry.files.remove(file).is_some() {
            self.mark_dirty(folder);
        }
    }

    /// Establish or verify the folder's domain.
    ///
    /// Returns `true` when an already-established domain had to be
    /// overwritten; the caller must regenerate the folder's relation data
    /// in that case.
    pub fn assign_domain(&mut self, folder: &Path, domain: Domain) -> bool {
        let entry = self.folder_mut_untracked(folder);
        match entry.domain {
            None => {
                entry.domain = Some(domain);
                self.mark_dirty(folder);
                false
            }
            Some(current) if current == domain => false,
            Some(current) => {
                debug!(
                    "Folder {:?} moved from domain {} to {}",
                    folder, current, domain
                );
                entry.domain = Some(domain);
                self.mark_dirty(folder);
                true
            }
        }
    }

    /// Update the scan-index flag.
    ///
    /// A flip invalidates this folder's cached files (they all rescan),
    /// not the whole registry.
    pub fn set_has_scan_index(&mut self, folder: &Path, has_index: bool) {
        let entry = self.folder_mut_untracked(folder);
        if entry.has_scan_index != has_index {
            debug!(
                "Folder {:?} scan-index flag changed to {}, invalidating its cache",
                folder, has_index
            );
            entry.has_scan_index = has_index;
            entry.files.clear();
            self.mark_dirty(folder);
        }
    }

    /// Record the directories a folder pulled into this pass
    pub fn set_subfolders(&mut self, folder: &Path, mut subfolders: Vec<PathBuf>) {
        subfolders.sort();
        subfolders.dedup();
        let entry = self.folder_mut_untracked(folder);
        if entry.subfolders != subfolders {
            entry.subfolders = subfolders;
            self.mark_dirty(folder);
        }
    }

    /// Stamp the folder as scanned now
    pub fn touch(&mut self, folder: &Path) {
        self.folder_mut_untracked(folder).last_scan = Some(Utc::now());
        self.mark_dirty(folder);
    }

    /// Forget a folder entirely (its directory disappeared).
    ///
    /// Loads any persisted record first so the caller sees the files the
    /// folder used to contain; the record is deleted on the next flush.
    pub fn drop_folder(&mut self, folder: &Path) -> FolderInfo {
        self.folder_mut_untracked(folder);
        let info = self.folders.remove(folder).expect("loaded above");
        self.dirty.remove(folder);
        if self.store.contains(&Store::folder_record(folder)) {
            self.dropped.insert(folder.to_path_buf());
        }
        info
    }

    /// Every folder loaded during this pass
    pub fn loaded_folders(&self) -> impl Iterator<Item = &FolderInfo> {
        self.folders.values()
    }

    /// Whether any folder state changed since the last flush
    pub fn is_dirty(&self) -> bool {
        !self.dirty.is_empty() || !self.dropped.is_empty()
    }

    /// Stage every dirty folder record into a transaction
    pub fn flush(&mut self, tx: &mut Transaction) -> Result<()> {
        for path in self.dirty.drain() {
            if let Some(info) = self.folders.get(&path) {
                tx.write(&Store::folder_record(&path), info)?;
            }
        }
        for path in self.dropped.drain() {
            tx.delete(&Store::folder_record(&path));
        }
        Ok(())
    }

    fn mark_dirty(&mut self, folder: &Path) {
        self.dirty.insert(folder.to_path_buf());
    }
}
