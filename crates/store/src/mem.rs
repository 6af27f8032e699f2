use std::collections::BTreeMap;
use std::io;

use crate::{DiskStore, StoreError};

/// In-memory [`DiskStore`] that counts every operation.
///
/// The counters let tests assert exactly how many backing-store reads and
/// writes a cache operation caused. Writes can be made to fail on demand to
/// exercise error paths.
#[derive(Debug, Default)]
pub struct MemStore {
    map: BTreeMap<Vec<u8>, Vec<u8>>,
    reads: u64,
    writes: u64,
    deletes: u64,
    locks: u64,
    lock_depth: u32,
    fail_writes: bool,
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `get` calls since creation or the last [`reset_counters`](Self::reset_counters).
    pub fn reads(&self) -> u64 {
        self.reads
    }

    /// Number of successful `put` calls.
    pub fn writes(&self) -> u64 {
        self.writes
    }

    /// Number of successful `delete` calls (including deletes of missing keys).
    pub fn deletes(&self) -> u64 {
        self.deletes
    }

    /// Number of `lock` calls.
    pub fn locks(&self) -> u64 {
        self.locks
    }

    /// Current lock nesting depth.
    pub fn lock_depth(&self) -> u32 {
        self.lock_depth
    }

    pub fn reset_counters(&mut self) {
        self.reads = 0;
        self.writes = 0;
        self.deletes = 0;
        self.locks = 0;
    }

    /// When `true`, every `put` and `delete` fails with an I/O error.
    pub fn set_fail_writes(&mut self, fail: bool) {
        self.fail_writes = fail;
    }

    /// Direct lookup that does not touch the counters.
    pub fn peek(&self, key: &[u8]) -> Option<&[u8]> {
        self.map.get(key).map(Vec::as_slice)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    fn check_writable(&self) -> Result<(), StoreError> {
        if self.fail_writes {
            return Err(StoreError::Io(io::Error::new(
                io::ErrorKind::Other,
                "writes disabled",
            )));
        }
        Ok(())
    }
}

impl DiskStore for MemStore {
    fn get(&mut self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        self.reads += 1;
        Ok(self.map.get(key).cloned())
    }

    fn put(&mut self, key: &[u8], value: &[u8]) -> Result<(), StoreError> {
        self.check_writable()?;
        self.writes += 1;
        self.map.insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn delete(&mut self, key: &[u8]) -> Result<(), StoreError> {
        self.check_writable()?;
        self.deletes += 1;
        self.map.remove(key);
        Ok(())
    }

    fn lock(&mut self) -> Result<(), StoreError> {
        self.locks += 1;
        self.lock_depth += 1;
        Ok(())
    }

    fn unlock(&mut self) -> Result<(), StoreError> {
        self.lock_depth = self.lock_depth.saturating_sub(1);
        Ok(())
    }
}
