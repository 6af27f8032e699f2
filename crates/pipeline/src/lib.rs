//! # Pipeline - Object-Granularity Attribute Batching
//!
//! A fixed pool of [`POOL_SIZE`] decoded objects sitting between the
//! attribute cache and the disk store. Attribute reads and writes operate on
//! the resident [`ObjectRecord`]; the disk store only ever sees whole-object
//! blobs, one `put` per flushed object instead of one per attribute.
//!
//! ## Residency
//!
//! Every successful resolve (hit or fault-in) stamps the pipe with a global,
//! monotonically increasing access counter. When an object must enter a full
//! pool, the pipe with the smallest stamp is flushed (if dirty) and its slot
//! reused. Ties go to the lowest slot index.
//!
//! A flushed object with no attributes left is deleted from the store rather
//! than written as an empty blob.
//!
//! The pipeline does not own the store. Every operation borrows it, so the
//! cache can share one store between the pipeline and its other record types.

use bytes::Bytes;
use codec::{
    decode, encode, encoded_size, tagged_key, ObjectRecord, RecordType, ATTR_HEADER_SIZE,
    MAX_BLOB_SIZE,
};
use store::{DiskStore, StoreError};
use thiserror::Error;
use tracing::{debug, error, info, warn};

/// Number of objects the pool holds at once.
pub const POOL_SIZE: usize = 64;

/// Errors surfaced by pipeline operations.
///
/// Store writes can fail, and so can attribute writes that would grow an
/// object past [`MAX_BLOB_SIZE`]. Reads that fail or return garbage fall back
/// to an empty object.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// The write was refused and the object left as it was.
    #[error("object #{object} would grow to {size} bytes, limit is {}", MAX_BLOB_SIZE)]
    ObjectTooLarge { object: u32, size: usize },
}

/// Disk key for the blob of object `id`.
pub fn object_key(id: u32) -> Vec<u8> {
    tagged_key(&id.to_ne_bytes(), RecordType::ATTRIBUTE)
}

/// One resident object and the access stamp it was last resolved with.
#[derive(Debug)]
struct Pipe {
    record: ObjectRecord,
    stamp: u64,
}

/// Counters for operator diagnostics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineStats {
    /// Pipes currently holding an object.
    pub resident: usize,
    /// Resident pipes with unflushed changes.
    pub dirty: usize,
    /// Resolves served by an already resident pipe.
    pub hits: u64,
    /// Resolves that had to load the object from the store.
    pub faults: u64,
    /// Pipes reclaimed to make room for another object.
    pub evictions: u64,
    /// Blobs that failed to decode and were replaced by an empty object.
    pub corrupt: u64,
}

/// Fixed-size pool of decoded objects.
#[derive(Debug)]
pub struct ObjectPipeline {
    slots: Vec<Option<Pipe>>,
    counter: u64,
    hits: u64,
    faults: u64,
    evictions: u64,
    corrupt: u64,
}

impl Default for ObjectPipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl ObjectPipeline {
    pub fn new() -> Self {
        Self {
            slots: (0..POOL_SIZE).map(|_| None).collect(),
            counter: 0,
            hits: 0,
            faults: 0,
            evictions: 0,
            corrupt: 0,
        }
    }

    /// Returns a copy of attribute `attr` of `object`.
    ///
    /// The object is faulted in if it is not resident. A missing object or
    /// attribute is `Ok(None)`.
    ///
    /// # Errors
    ///
    /// Fails only if making room required flushing a dirty pipe and that
    /// write failed.
    pub fn get_attribute<S>(
        &mut self,
        store: &mut S,
        object: u32,
        attr: i32,
    ) -> Result<Option<Bytes>, PipelineError>
    where
        S: DiskStore + ?Sized,
    {
        let record = self.resolve(store, object)?;
        Ok(record.get(attr).cloned())
    }

    /// Inserts or replaces attribute `attr` of `object`. Nothing is written
    /// to the store until the pipe is evicted or synced.
    ///
    /// # Errors
    ///
    /// [`PipelineError::ObjectTooLarge`] if the object's blob would exceed
    /// [`MAX_BLOB_SIZE`]; the object is not changed.
    pub fn set_attribute<S>(
        &mut self,
        store: &mut S,
        object: u32,
        attr: i32,
        bytes: Bytes,
    ) -> Result<(), PipelineError>
    where
        S: DiskStore + ?Sized,
    {
        let record = self.resolve(store, object)?;
        let replaced = record.get(attr).map_or(0, |b| ATTR_HEADER_SIZE + b.len());
        let size = encoded_size(record) - replaced + ATTR_HEADER_SIZE + bytes.len();
        if size > MAX_BLOB_SIZE {
            return Err(PipelineError::ObjectTooLarge { object, size });
        }
        record.set(attr, bytes);
        Ok(())
    }

    /// Removes attribute `attr` of `object`. Removing an attribute that is
    /// not there leaves the object clean.
    pub fn delete_attribute<S>(
        &mut self,
        store: &mut S,
        object: u32,
        attr: i32,
    ) -> Result<(), PipelineError>
    where
        S: DiskStore + ?Sized,
    {
        self.resolve(store, object)?.remove(attr);
        Ok(())
    }

    /// Writes every dirty pipe to the store without evicting anything.
    ///
    /// Returns the number of objects written or deleted. On error, pipes not
    /// yet flushed stay dirty.
    pub fn sync_all<S>(&mut self, store: &mut S) -> Result<usize, PipelineError>
    where
        S: DiskStore + ?Sized,
    {
        let mut flushed = 0;
        for pipe in self.slots.iter_mut().flatten() {
            if pipe.record.dirty {
                flush(store, &mut pipe.record)?;
                flushed += 1;
            }
        }
        if flushed > 0 {
            info!(flushed, "pipeline synced");
        }
        Ok(flushed)
    }

    /// Syncs, then empties the pool. Counters are reset.
    pub fn flush_and_clear<S>(&mut self, store: &mut S) -> Result<(), PipelineError>
    where
        S: DiskStore + ?Sized,
    {
        self.sync_all(store)?;
        *self = Self::new();
        Ok(())
    }

    /// Whether `object` currently occupies a pipe.
    pub fn is_resident(&self, object: u32) -> bool {
        self.position(object).is_some()
    }

    /// Ids of resident objects in slot order.
    pub fn resident_ids(&self) -> Vec<u32> {
        self.slots.iter().flatten().map(|p| p.record.id).collect()
    }

    pub fn stats(&self) -> PipelineStats {
        let resident = self.slots.iter().flatten();
        PipelineStats {
            resident: resident.clone().count(),
            dirty: resident.filter(|p| p.record.dirty).count(),
            hits: self.hits,
            faults: self.faults,
            evictions: self.evictions,
            corrupt: self.corrupt,
        }
    }

    fn position(&self, object: u32) -> Option<usize> {
        self.slots
            .iter()
            .position(|s| matches!(s, Some(p) if p.record.id == object))
    }

    /// Finds or loads `object`, stamping its pipe with the next counter value.
    fn resolve<S>(&mut self, store: &mut S, object: u32) -> Result<&mut ObjectRecord, PipelineError>
    where
        S: DiskStore + ?Sized,
    {
        let idx = match self.position(object) {
            Some(idx) => {
                self.hits += 1;
                idx
            }
            None => self.fault_in(store, object)?,
        };

        let stamp = self.counter;
        self.counter += 1;
        let pipe = self.slots[idx].get_or_insert_with(|| Pipe {
            record: ObjectRecord::new(object),
            stamp,
        });
        pipe.stamp = stamp;
        Ok(&mut pipe.record)
    }

    /// Loads `object` into a free slot, evicting the least recently resolved
    /// pipe if the pool is full. Returns the slot index.
    fn fault_in<S>(&mut self, store: &mut S, object: u32) -> Result<usize, PipelineError>
    where
        S: DiskStore + ?Sized,
    {
        let idx = match self.slots.iter().position(Option::is_none) {
            Some(idx) => idx,
            None => {
                let victim = self.oldest();
                self.evict(store, victim)?;
                victim
            }
        };

        let record = self.load(store, object);
        self.faults += 1;
        debug!(object, slot = idx, attrs = record.len(), "object faulted in");
        self.slots[idx] = Some(Pipe { record, stamp: 0 });
        Ok(idx)
    }

    /// Slot holding the smallest stamp; the first one wins a tie.
    fn oldest(&self) -> usize {
        let mut best: Option<(usize, u64)> = None;
        for (i, pipe) in self.slots.iter().enumerate() {
            if let Some(pipe) = pipe {
                if best.map_or(true, |(_, stamp)| pipe.stamp < stamp) {
                    best = Some((i, pipe.stamp));
                }
            }
        }
        best.map_or(0, |(i, _)| i)
    }

    fn evict<S>(&mut self, store: &mut S, idx: usize) -> Result<(), PipelineError>
    where
        S: DiskStore + ?Sized,
    {
        if let Some(pipe) = self.slots[idx].as_mut() {
            if pipe.record.dirty {
                flush(store, &mut pipe.record)?;
            }
            debug!(object = pipe.record.id, slot = idx, "pipe evicted");
        }
        self.slots[idx] = None;
        self.evictions += 1;
        Ok(())
    }

    fn load<S>(&mut self, store: &mut S, object: u32) -> ObjectRecord
    where
        S: DiskStore + ?Sized,
    {
        let blob = match store.get(&object_key(object)) {
            Ok(Some(blob)) => blob,
            Ok(None) => return ObjectRecord::new(object),
            Err(e) => {
                warn!(object, error = %e, "object read failed, treating as empty");
                return ObjectRecord::new(object);
            }
        };

        match decode(&blob) {
            Ok(record) if record.id == object => record,
            Ok(record) => {
                error!(object, stored_id = record.id, "object blob carries wrong id, ignoring it");
                self.corrupt += 1;
                ObjectRecord::new(object)
            }
            Err(e) => {
                error!(object, error = %e, len = blob.len(), "corrupt object blob, ignoring it");
                self.corrupt += 1;
                ObjectRecord::new(object)
            }
        }
    }
}

/// Writes `record` to the store under the advisory lock and marks it clean.
///
/// An object with no attributes is deleted instead.
fn flush<S>(store: &mut S, record: &mut ObjectRecord) -> Result<(), PipelineError>
where
    S: DiskStore + ?Sized,
{
    let key = object_key(record.id);
    store::with_lock(store, |s| {
        if record.is_empty() {
            s.delete(&key)
        } else {
            s.put(&key, &encode(record))
        }
    })?;
    record.dirty = false;
    Ok(())
}
