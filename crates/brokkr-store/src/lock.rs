//! Advisory store locks
//!
//! Cooperative, cross-process locking over the shared cache directory.
//! Readers hold a shared lock, writers an exclusive one; both are scoped
//! guards that release on every exit path when dropped. These locks only
//! coordinate processes that play along, which is all the registry needs.

use std::fs::{File, OpenOptions};
use std::path::Path;

use fs4::fs_std::FileExt;

use brokkr_core::Result;

/// Name of the lock file inside the store root
pub const LOCK_FILE: &str = "registry.lock";

fn open_lock_file(path: &Path) -> Result<File> {
    Ok(OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(false)
        .open(path)?)
}

/// Shared (read) lock on the store, released on drop
#[derive(Debug)]
pub struct ReadGuard {
    file: File,
}

impl ReadGuard {
    /// Block until a shared lock is acquired
    pub fn acquire(lock_path: &Path) -> Result<Self> {
        let file = open_lock_file(lock_path)?;
        file.lock_shared()?;
        Ok(Self { file })
    }
}

impl Drop for ReadGuard {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}

/// Exclusive (write) lock on the store, released on drop
#[derive(Debug)]
pub struct WriteGuard {
    file: File,
}

impl WriteGuard {
    /// Block until the exclusive lock is acquired
    pub fn acquire(lock_path: &Path) -> Result<Self> {
        let file = open_lock_file(lock_path)?;
        file.lock_exclusive()?;
        Ok(Self { file })
    }
}

impl Drop for WriteGuard {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}
