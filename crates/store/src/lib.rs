//! # Store - Disk Key-Value Backends
//!
//! The byte-oriented key-value contract the attribute cache writes through
//! to, plus two implementations:
//!
//! | Type          | Purpose                                                    |
//! |---------------|------------------------------------------------------------|
//! | [`MemStore`]  | Ordered in-memory map with I/O counters, used by tests     |
//! | [`FileStore`] | Append-only CRC-checked log with an in-memory offset index |
//!
//! Keys are opaque. Callers that share one store between several logical
//! namespaces append a record-type tag themselves (see `codec::tagged_key`).
//!
//! ## Locking
//!
//! [`DiskStore::lock`] / [`DiskStore::unlock`] bracket bulk operations with an
//! advisory, cross-process lock. It guards against a second process (a backup
//! or maintenance tool) opening the same file; it is not an in-process mutex.
//! Locks nest: only the outermost `unlock` releases it. [`with_lock`] runs a
//! closure under the lock and carries on unlocked if it cannot be taken.
//!
//! ## Example
//!
//! ```rust,no_run
//! use store::{DiskStore, FileStore};
//!
//! let mut db = FileStore::open("attrs.db").unwrap();
//! db.put(b"hello", b"world").unwrap();
//! assert_eq!(db.get(b"hello").unwrap(), Some(b"world".to_vec()));
//! ```

mod file;
mod lock;
mod log;
mod mem;

pub use file::FileStore;
pub use mem::MemStore;

use std::io;
use thiserror::Error;
use tracing::warn;

/// Errors that can occur in a disk store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// An underlying I/O error.
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// A log record failed CRC validation or carried an unknown op code.
    #[error("corrupt record at offset {offset}")]
    Corrupt { offset: u64 },

    /// The advisory lock is held by another open handle.
    #[error("store is locked by another process")]
    Locked,
}

/// Byte-oriented key-value engine the cache writes through to.
///
/// A missing key is `Ok(None)`, never an error. Deleting a missing key is a
/// no-op.
pub trait DiskStore {
    fn get(&mut self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError>;

    fn put(&mut self, key: &[u8], value: &[u8]) -> Result<(), StoreError>;

    fn delete(&mut self, key: &[u8]) -> Result<(), StoreError>;

    /// Takes the advisory write lock. Stores without one succeed trivially.
    fn lock(&mut self) -> Result<(), StoreError> {
        Ok(())
    }

    /// Releases the advisory write lock.
    fn unlock(&mut self) -> Result<(), StoreError> {
        Ok(())
    }

    /// Toggles per-write durability (fsync after every mutation).
    fn set_sync(&mut self, _sync: bool) {}
}

impl<S: DiskStore + ?Sized> DiskStore for &mut S {
    fn get(&mut self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        (**self).get(key)
    }

    fn put(&mut self, key: &[u8], value: &[u8]) -> Result<(), StoreError> {
        (**self).put(key, value)
    }

    fn delete(&mut self, key: &[u8]) -> Result<(), StoreError> {
        (**self).delete(key)
    }

    fn lock(&mut self) -> Result<(), StoreError> {
        (**self).lock()
    }

    fn unlock(&mut self) -> Result<(), StoreError> {
        (**self).unlock()
    }

    fn set_sync(&mut self, sync: bool) {
        (**self).set_sync(sync)
    }
}

/// Runs `f` with the store's advisory lock held.
///
/// Failing to take the lock is logged and `f` runs anyway; the lock is only
/// released if it was taken.
pub fn with_lock<S, T, F>(store: &mut S, f: F) -> T
where
    S: DiskStore + ?Sized,
    F: FnOnce(&mut S) -> T,
{
    let locked = match store.lock() {
        Ok(()) => true,
        Err(e) => {
            warn!(error = %e, "could not lock store, continuing without it");
            false
        }
    };
    let out = f(store);
    if locked {
        if let Err(e) = store.unlock() {
            warn!(error = %e, "could not unlock store");
        }
    }
    out
}

#[cfg(test)]
mod tests;
