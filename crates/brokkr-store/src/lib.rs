//! # brokkr-store
//!
//! Persistent binary store for the addin registry:
//! - Advisory shared/exclusive locking across processes
//! - Cooperative transactions with staged writes and atomic commit
//! - Postcard record envelopes with a type table, read-as-absent on corruption
//! - Shared-object dedup keyed by content hash, with garbage collection
//! - The enabled/disabled/pending-uninstall status file

pub mod codec;
pub mod lock;
pub mod status;
pub mod transaction;

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tracing::{debug, info};
use walkdir::WalkDir;

use brokkr_core::{Error, Result};

pub use codec::StoreRecord;
pub use lock::{ReadGuard, WriteGuard};
pub use status::RegistryStatus;
pub use transaction::Transaction;

/// Store-relative path of the host/root index record
pub const HOST_INDEX_RECORD: &str = "host-index.bin";

const ADDIN_DIR: &str = "addins";
const FOLDER_DIR: &str = "folders";
const SHARED_DIR: &str = "shared";

/// The registry's persistent store, rooted at one cache directory.
///
/// All multi-process coordination goes through this type: advisory locks
/// for readers and writers, and an explicit begin/commit/rollback
/// transaction for mutations.
#[derive(Debug, Clone)]
pub struct Store {
    root: PathBuf,
}

impl Store {
    /// Open (creating if needed) a store at the given cache directory.
    ///
    /// Failure to create the directory tree is the one systemic,
    /// user-visible store failure.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        for dir in [ADDIN_DIR, FOLDER_DIR, SHARED_DIR] {
            fs::create_dir_all(root.join(dir)).map_err(|e| {
                Error::store_unavailable(root.display().to_string(), e.to_string())
            })?;
        }
        debug!("Opened registry store at {:?}", root);
        Ok(Self { root })
    }

    /// The cache directory this store lives in
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Take the shared read lock
    pub fn lock_read(&self) -> Result<ReadGuard> {
        ReadGuard::acquire(&self.root.join(lock::LOCK_FILE))
    }

    /// Take the exclusive write lock
    pub fn lock_write(&self) -> Result<WriteGuard> {
        WriteGuard::acquire(&self.root.join(lock::LOCK_FILE))
    }

    /// Open a write transaction, or `None` if another writer holds one
    pub fn begin_transaction(&self) -> Result<Option<Transaction>> {
        Transaction::begin(self.root.clone())
    }

    /// Read a record at a store-relative path.
    ///
    /// Absent, truncated, or otherwise undecodable records all read as
    /// `None`; callers treat that as a cache miss.
    pub fn read<T: StoreRecord>(&self, relative: &str) -> Option<T> {
        let bytes = fs::read(self.root.join(relative)).ok()?;
        codec::decode(&bytes)
    }

    /// Whether a record file exists at a store-relative path
    pub fn contains(&self, relative: &str) -> bool {
        self.root.join(relative).is_file()
    }

    /// Load the status file (missing or corrupt reads as default)
    pub fn status(&self) -> RegistryStatus {
        RegistryStatus::load(&self.root.join(status::STATUS_FILE))
    }

    /// Persist the status file.
    ///
    /// Status is YAML, not a binary record, so it is written directly
    /// under the write lock rather than staged in a transaction.
    pub fn save_status(&self, status: &RegistryStatus) -> Result<()> {
        status.save(&self.root.join(status::STATUS_FILE))
    }

    /// Store-relative record path for an addin description
    pub fn addin_record(addin_id: &str, version: &str) -> String {
        format!("{ADDIN_DIR}/{}.bin", hash_key(&format!("{addin_id} {version}")))
    }

    /// Store-relative record path for a folder's scan cache
    pub fn folder_record(folder: &Path) -> String {
        format!("{FOLDER_DIR}/{}.bin", hash_key(&normalize_path(folder)))
    }

    /// Store-relative record path for a shared object by content hash
    pub fn shared_record(content_hash: &str) -> String {
        format!("{SHARED_DIR}/{content_hash}.bin")
    }

    /// Content hash of a source file's bytes, for shared-object dedup
    pub fn content_hash(bytes: &[u8]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        hex_prefix(&hasher.finalize())
    }

    /// List content hashes of every shared object currently on disk
    pub fn shared_hashes(&self) -> Vec<String> {
        let mut hashes = Vec::new();
        for entry in WalkDir::new(self.root.join(SHARED_DIR))
            .min_depth(1)
            .into_iter()
            .flatten()
        {
            if let Some(name) = entry.path().file_name().and_then(|n| n.to_str()) {
                if let Some(hash) = name.strip_suffix(".bin") {
                    hashes.push(hash.to_string());
                }
            }
        }
        hashes
    }

    /// Delete shared objects whose content hash no longer appears in
    /// `live`. Returns the number of objects removed.
    pub fn collect_shared_garbage(&self, live: &HashSet<String>) -> Result<usize> {
        let mut removed = 0;
        for hash in self.shared_hashes() {
            if !live.contains(&hash) {
                fs::remove_file(self.root.join(Self::shared_record(&hash)))?;
                removed += 1;
            }
        }
        if removed > 0 {
            info!("Collected {} unreferenced shared objects", removed);
        }
        Ok(removed)
    }

    /// Make a path store-relative when it falls under the store root, for
    /// relocatability of persisted records
    pub fn relativize(&self, path: &Path) -> PathBuf {
        path.strip_prefix(&self.root)
            .map(Path::to_path_buf)
            .unwrap_or_else(|_| path.to_path_buf())
    }

    /// Undo [`Store::relativize`]
    pub fn absolutize(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }
}

impl StoreRecord for brokkr_core::types::AddinDescription {
    const TYPE_NAME: &'static str = "AddinDescription";
}

/// Normalize a path into a stable string key: forward slashes, no
/// trailing separator
fn normalize_path(path: &Path) -> String {
    let raw = path.to_string_lossy().replace('\\', "/");
    raw.trim_end_matches('/').to_string()
}

fn hash_key(key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(key.as_bytes());
    hex_prefix(&hasher.finalize())
}

fn hex_prefix(digest: &[u8]) -> String {
    digest
        .iter()
        .take(16)
        .map(|b| format!("{b:02x}"))
        .collect()
}
