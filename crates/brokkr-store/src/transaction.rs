//! Store transactions
//!
//! A transaction stages every write as a `<target>.new` file and applies
//! the whole batch with renames on commit, so readers never observe a
//! half-written record. Exclusion between writers is cooperative: whoever
//! holds `transaction.lock` owns the open transaction, and a second
//! `begin` is told "busy" instead of blocking. Dropping an uncommitted
//! transaction rolls it back.

use std::fs::{self, File, OpenOptions};
use std::path::PathBuf;

use fs4::fs_std::FileExt;
use tracing::{debug, warn};

use brokkr_core::Result;

use crate::codec::{self, StoreRecord};

/// Name of the transaction lock file inside the store root
pub const TRANSACTION_LOCK_FILE: &str = "transaction.lock";

/// An open write transaction against the store
#[derive(Debug)]
pub struct Transaction {
    root: PathBuf,
    lock_file: File,
    staged: Vec<PathBuf>,
    deletes: Vec<PathBuf>,
    committed: bool,
}

impl Transaction {
    /// Try to open a transaction; `None` means another writer already
    /// holds one and the caller should back off.
    pub(crate) fn begin(root: PathBuf) -> Result<Option<Self>> {
        let lock_file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(root.join(TRANSACTION_LOCK_FILE))?;
        if !lock_file.try_lock_exclusive()? {
            debug!("Transaction already open elsewhere, backing off");
            return Ok(None);
        }
        Ok(Some(Self {
            root,
            lock_file,
            staged: Vec::new(),
            deletes: Vec::new(),
            committed: false,
        }))
    }

    /// Stage a record write at a store-relative path
    pub fn write<T: StoreRecord>(&mut self, relative: &str, value: &T) -> Result<()> {
        let target = self.root.join(relative);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        let staged = staged_path(&target);
        let bytes = codec::encode(value)?;
        fs::write(&staged, bytes)?;
        if !self.staged.contains(&target) {
            self.staged.push(target);
        }
        Ok(())
    }

    /// Stage removal of a record
    pub fn delete(&mut self, relative: &str) {
        let target = self.root.join(relative);
        if !self.deletes.contains(&target) {
            self.deletes.push(target);
        }
    }

    /// Number of staged writes and deletes
    pub fn pending(&self) -> usize {
        self.staged.len() + self.deletes.len()
    }

    /// Atomically make all staged writes visible and apply deletes
    pub fn commit(mut self) -> Result<()> {
        for target in &self.staged {
            fs::rename(staged_path(target), target)?;
        }
        for target in &self.deletes {
            match fs::remove_file(target) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        debug!(
            "Committed transaction: {} writes, {} deletes",
            self.staged.len(),
            self.deletes.len()
        );
        self.committed = true;
        let _ = self.lock_file.unlock();
        Ok(())
    }

    /// Discard every staged write
    pub fn rollback(mut self) {
        self.discard_staged();
        self.committed = true; // nothing left for Drop to do
        let _ = self.lock_file.unlock();
    }

    fn discard_staged(&mut self) {
        for target in &self.staged {
            if let Err(e) = fs::remove_file(staged_path(target)) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!("Failed to discard staged record {:?}: {}", target, e);
                }
            }
        }
        self.staged.clear();
        self.deletes.clear();
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        if !self.committed {
            debug!("Rolling back uncommitted transaction");
            self.discard_staged();
            let _ = self.lock_file.unlock();
        }
    }
}

fn staged_path(target: &PathBuf) -> PathBuf {
    let mut name = target.as_os_str().to_os_string();
    name.push(".new");
    PathBuf::from(name)
}
