//! # Cache - Write-Back Attribute Cache
//!
//! An in-memory, byte-budgeted LRU cache in front of a [`DiskStore`]. Values
//! are keyed by `(key bytes, RecordType)`. Attribute records
//! ([`RecordType::ATTRIBUTE`], keyed by an 8-byte [`AttrKey`]) are read and
//! written through the [`ObjectPipeline`]; every other record type goes to
//! the disk store directly, under a [`tagged_key`].
//!
//! ## Architecture
//!
//! ```text
//! get / put / delete
//!        |
//!        v
//! ┌──────────────────────────────────────────────┐
//! │                    CACHE                     │
//! │  buckets: width chains  ──┐                  │
//! │                           ├─ arena slots     │
//! │  LRU list: head ... tail ─┘                  │
//! │  (head = evicted first)                      │
//! └──────────────────────────────────────────────┘
//!        | miss / eviction / sync
//!        v
//!   ATTRIBUTE ──> ObjectPipeline ──> DiskStore
//!   other     ─────────────────────> DiskStore
//! ```
//!
//! ## Module Responsibilities
//!
//! | Module      | Purpose                                                  |
//! |-------------|----------------------------------------------------------|
//! | `lib.rs`    | `Cache` struct, constructor, accessors, `Debug`, `Drop`  |
//! | `arena`     | Entry slab and the global LRU list                       |
//! | `buckets`   | Hash chains                                              |
//! | `read`      | `get()`, read-through                                    |
//! | `write`     | `put()`, `delete()`, write-through to the backing layer  |
//! | `evict`     | Making room under the size budget                        |
//! | `sync`      | `sync()`, `reset()`                                      |
//! | `stats`     | Activity counters and the operator table                 |
//! | `report`    | Per-object and per-attribute listings                    |
//!
//! ## Write-back
//!
//! `put` and `delete` only touch memory and mark the entry dirty. A dirty
//! entry reaches the backing layer when it is evicted or on [`Cache::sync`].
//! A failed write leaves the entry cached and dirty, so nothing acknowledged
//! is dropped.
//!
//! ## Size budget
//!
//! Cached value bytes never exceed the budget: room is made *before* an
//! insertion by evicting from the LRU head. A value larger than the whole
//! budget is never cached; it is written through immediately.
//!
//! ## Dump mode
//!
//! While [`Cache::set_dumping`] is on, entries faulted in by reads are linked
//! at the head of their chain and of the LRU list, so they are the first to
//! go and the resident working set survives a full snapshot walk.

mod arena;
mod buckets;
mod evict;
mod read;
mod report;
mod stats;
mod sync;
mod write;

pub use report::{AttributeLine, ObjectLine, ObjectReport};
pub use stats::CacheStats;

use arena::Arena;
use bytes::Bytes;
use buckets::Buckets;
use codec::{
    AttrKey, RecordType, ATTR_HEADER_SIZE, ATTR_KEY_LEN, MAX_BLOB_SIZE, OBJ_HEADER_SIZE,
};
use pipeline::{ObjectPipeline, PipelineError};
use stats::Counters;
use store::{DiskStore, StoreError};
use thiserror::Error;
use tracing::error;

/// Default number of hash buckets.
pub const DEFAULT_WIDTH: usize = 200;

/// Default byte budget for cached values.
pub const DEFAULT_SIZE: usize = 1_000_000;

/// Errors surfaced by cache operations.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// An attribute record was addressed with a key that is not an encoded
    /// [`AttrKey`].
    #[error("attribute key must be {expected} bytes, got {0}", expected = ATTR_KEY_LEN)]
    InvalidAttributeKey(usize),

    /// An attribute value too large to fit in any object blob.
    #[error("attribute value of {0} bytes exceeds the object size limit of {limit}", limit = MAX_BLOB_SIZE)]
    ValueTooLarge(usize),
}

/// Write-back LRU cache over a [`DiskStore`].
///
/// Single-threaded: every operation runs to completion before the next one.
/// The cache owns its store; pass `&mut store` to keep using the store after
/// the cache is gone.
pub struct Cache<S: DiskStore> {
    pub(crate) store: S,
    pub(crate) pipeline: ObjectPipeline,
    pub(crate) arena: Arena,
    pub(crate) buckets: Buckets,
    /// Sum of cached value lengths.
    pub(crate) size: usize,
    pub(crate) budget: usize,
    pub(crate) dumping: bool,
    pub(crate) standalone: bool,
    pub(crate) counters: Counters,
}

impl<S: DiskStore> Cache<S> {
    /// Creates an empty cache with `width` buckets (0 selects
    /// [`DEFAULT_WIDTH`]) and a budget of `size_budget` value bytes.
    pub fn new(store: S, width: usize, size_budget: usize) -> Self {
        let width = if width == 0 { DEFAULT_WIDTH } else { width };
        Self {
            store,
            pipeline: ObjectPipeline::new(),
            arena: Arena::new(),
            buckets: Buckets::new(width),
            size: 0,
            budget: size_budget,
            dumping: false,
            standalone: false,
            counters: Counters::new(),
        }
    }

    /// Reads attribute `attr` of `object`.
    pub fn get_attr(&mut self, object: u32, attr: i32) -> Result<Option<Bytes>, CacheError> {
        self.get(&AttrKey::new(object, attr).to_bytes(), RecordType::ATTRIBUTE)
    }

    /// Sets attribute `attr` of `object`.
    pub fn put_attr(
        &mut self,
        object: u32,
        attr: i32,
        value: Bytes,
    ) -> Result<(), CacheError> {
        self.put(
            &AttrKey::new(object, attr).to_bytes(),
            RecordType::ATTRIBUTE,
            Some(value),
        )
    }

    /// Deletes attribute `attr` of `object`.
    pub fn del_attr(&mut self, object: u32, attr: i32) -> Result<(), CacheError> {
        self.delete(&AttrKey::new(object, attr).to_bytes(), RecordType::ATTRIBUTE)
    }

    /// Toggles dump mode (see the crate docs).
    pub fn set_dumping(&mut self, dumping: bool) {
        self.dumping = dumping;
    }

    pub fn is_dumping(&self) -> bool {
        self.dumping
    }

    /// In standalone mode writes bypass the cache and go straight to the
    /// backing layer, and [`sync`](Self::sync) runs with per-write fsync off.
    pub fn set_standalone(&mut self, standalone: bool) {
        self.standalone = standalone;
    }

    pub fn is_standalone(&self) -> bool {
        self.standalone
    }

    /// Changes the byte budget. A smaller budget takes effect at the next
    /// insertion, which evicts down to it.
    pub fn set_size_budget(&mut self, budget: usize) {
        self.budget = budget;
    }

    pub fn size_budget(&self) -> usize {
        self.budget
    }

    /// Bytes of cached values.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Number of cached entries, tombstones included.
    pub fn len(&self) -> usize {
        self.arena.len()
    }

    pub fn is_empty(&self) -> bool {
        self.arena.len() == 0
    }

    pub fn width(&self) -> usize {
        self.buckets.width()
    }

    pub fn stats(&self) -> CacheStats {
        let c = &self.counters;
        CacheStats {
            writes: c.writes,
            reads: c.reads,
            dbreads: c.dbreads,
            dbwrites: c.dbwrites,
            dels: c.dels,
            rhits: c.rhits,
            whits: c.whits,
            fails: c.fails,
            syncs: c.syncs,
            size: self.size,
            budget: self.budget,
            entries: self.arena.len(),
            dirty: self.arena.lru().filter(|&i| self.arena.entry(i).dirty).count(),
            elapsed: c.since.elapsed(),
            pipeline: self.pipeline.stats(),
        }
    }

    pub fn pipeline(&self) -> &ObjectPipeline {
        &self.pipeline
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Direct access to the store, e.g. for maintenance. Writes made here
    /// bypass the cache and may be shadowed by cached entries.
    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    /// Whether reads and hits should be counted right now.
    pub(crate) fn counting(&self) -> bool {
        !self.standalone && !self.dumping
    }
}

/// Parses the key of an attribute record; `None` for every other record
/// type.
pub(crate) fn attr_key(key: &[u8], record_type: RecordType) -> Result<Option<AttrKey>, CacheError> {
    if !record_type.is_attribute() {
        return Ok(None);
    }
    AttrKey::from_bytes(key)
        .map(Some)
        .ok_or(CacheError::InvalidAttributeKey(key.len()))
}

/// Rejects an attribute value that could never be written, even as the only
/// attribute of its object.
pub(crate) fn check_attr_value(len: usize) -> Result<(), CacheError> {
    if OBJ_HEADER_SIZE + ATTR_HEADER_SIZE + len > MAX_BLOB_SIZE {
        return Err(CacheError::ValueTooLarge(len));
    }
    Ok(())
}

impl<S: DiskStore> std::fmt::Debug for Cache<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cache")
            .field("width", &self.buckets.width())
            .field("entries", &self.arena.len())
            .field("size", &self.size)
            .field("budget", &self.budget)
            .field("dumping", &self.dumping)
            .field("standalone", &self.standalone)
            .field("pipeline", &self.pipeline.stats())
            .finish()
    }
}

impl<S: DiskStore> Drop for Cache<S> {
    fn drop(&mut self) {
        let dirty = self.arena.lru().any(|i| self.arena.entry(i).dirty);
        if dirty || self.pipeline.stats().dirty > 0 {
            if let Err(e) = self.sync() {
                error!(error = %e, "final cache sync failed");
            }
        }
    }
}

#[cfg(test)]
mod tests;
