/// Write path: `put()`, `delete()`, and writing one value below the cache.
///
/// Mutations stay in memory as dirty entries. Standalone mode and values
/// too large for the whole budget skip the cache and are written through at
/// once.
use bytes::Bytes;
use codec::{tagged_key, RecordType};
use pipeline::{ObjectPipeline, PipelineError};
use store::DiskStore;
use tracing::debug;

use crate::arena::{Entry, EntryIdx};
use crate::{attr_key, check_attr_value, Cache, CacheError};

impl<S: DiskStore> Cache<S> {
    /// Stores `value` for `key`; `None` stages a deletion.
    ///
    /// An existing entry is replaced in place and moved to the most recently
    /// used end; otherwise a new dirty entry is added there.
    ///
    /// # Errors
    ///
    /// [`CacheError::ValueTooLarge`] for an attribute value that cannot fit
    /// in an object blob. Otherwise fails only if room could not be made
    /// because evicting a dirty entry failed to write. The cache is left as
    /// it was before the call.
    pub fn put(
        &mut self,
        key: &[u8],
        record_type: RecordType,
        value: Option<Bytes>,
    ) -> Result<(), CacheError> {
        if attr_key(key, record_type)?.is_some() {
            check_attr_value(value.as_ref().map_or(0, Bytes::len))?;
        }
        if self.standalone {
            return self.write_direct(key, record_type, value.as_ref());
        }
        self.counters.writes += 1;

        let len = value.as_ref().map_or(0, Bytes::len);
        if len > self.budget {
            self.write_direct(key, record_type, value.as_ref())?;
            self.counters.dbwrites += 1;
            debug!(%record_type, len, "oversized value written through");
            return Ok(());
        }

        let bucket = self.buckets.bucket(key, record_type);
        if let Some(idx) = self.buckets.find(&self.arena, bucket, key, record_type) {
            if !self.dumping {
                self.counters.whits += 1;
            }
            return self.replace(idx, value);
        }

        self.make_room(len)?;
        let idx = self.arena.alloc(Entry {
            key: key.to_vec(),
            record_type,
            value,
            dirty: true,
        });
        self.size += len;
        self.buckets.push_back(&mut self.arena, bucket, idx);
        self.arena.push_back(idx);
        Ok(())
    }

    /// Stages a deletion of `key`.
    ///
    /// A cached entry loses its value and moves to the least recently used
    /// end. An uncached key gets a tombstone there directly. Deleting twice
    /// is the same as deleting once.
    pub fn delete(&mut self, key: &[u8], record_type: RecordType) -> Result<(), CacheError> {
        attr_key(key, record_type)?;
        if self.standalone {
            return self.write_direct(key, record_type, None);
        }
        self.counters.dels += 1;

        let bucket = self.buckets.bucket(key, record_type);
        if let Some(idx) = self.buckets.find(&self.arena, bucket, key, record_type) {
            let entry = self.arena.entry_mut(idx);
            self.size -= entry.size();
            entry.value = None;
            entry.dirty = true;
            self.arena.move_to_front(idx);
            return Ok(());
        }

        self.make_room(0)?;
        let idx = self.arena.alloc(Entry {
            key: key.to_vec(),
            record_type,
            value: None,
            dirty: true,
        });
        self.buckets.push_front(&mut self.arena, bucket, idx);
        self.arena.push_front(idx);
        Ok(())
    }

    /// Writes below the cache and drops any cached copy of `key`.
    fn write_direct(
        &mut self,
        key: &[u8],
        record_type: RecordType,
        value: Option<&Bytes>,
    ) -> Result<(), CacheError> {
        write_back(&mut self.store, &mut self.pipeline, key, record_type, value)?;
        let bucket = self.buckets.bucket(key, record_type);
        if let Some(idx) = self.buckets.find(&self.arena, bucket, key, record_type) {
            self.discard(idx);
        }
        Ok(())
    }

    /// Swaps the value of a cached entry, making room first without
    /// considering the entry itself for eviction.
    fn replace(&mut self, idx: EntryIdx, value: Option<Bytes>) -> Result<(), CacheError> {
        let old = self.arena.entry(idx).size();
        let new = value.as_ref().map_or(0, Bytes::len);

        self.arena.unlink(idx);
        self.size -= old;
        let room = self.make_room(new);
        self.size += old;
        self.arena.push_back(idx);
        room?;

        let entry = self.arena.entry_mut(idx);
        entry.value = value;
        entry.dirty = true;
        self.size = self.size - old + new;
        Ok(())
    }
}

/// Writes one value (or deletion) to the layer below the cache: the object
/// pipeline for attributes, the disk store otherwise.
pub(crate) fn write_back<S: DiskStore + ?Sized>(
    store: &mut S,
    pipeline: &mut ObjectPipeline,
    key: &[u8],
    record_type: RecordType,
    value: Option<&Bytes>,
) -> Result<(), CacheError> {
    if let Some(attr) = attr_key(key, record_type)? {
        match value {
            Some(v) => pipeline.set_attribute(store, attr.object, attr.attr, v.clone())?,
            None => pipeline.delete_attribute(store, attr.object, attr.attr)?,
        }
        return Ok(());
    }

    let disk_key = tagged_key(key, record_type);
    store::with_lock(store, |s| match value {
        Some(v) => s.put(&disk_key, v),
        None => s.delete(&disk_key),
    })?;
    Ok(())
}

/// A write-back the pipeline refused because the object would outgrow its
/// blob. Retrying can never succeed.
pub(crate) fn is_unstorable(e: &CacheError) -> bool {
    matches!(
        e,
        CacheError::Pipeline(PipelineError::ObjectTooLarge { .. })
    )
}
