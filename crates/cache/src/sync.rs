/// Checkpointing: `sync()` and `reset()`.
///
/// Both run with the store's advisory lock held for the whole flush. A lock
/// that cannot be taken is logged and the flush goes ahead without it.
use store::DiskStore;
use tracing::{error, info};

use crate::arena::EntryIdx;
use crate::stats::Counters;
use crate::write::{is_unstorable, write_back};
use crate::{Cache, CacheError};

impl<S: DiskStore> Cache<S> {
    /// Writes every dirty entry below the cache, bucket by bucket, then
    /// flushes the object pipeline. Entries stay cached, now clean.
    ///
    /// In standalone mode per-write fsync is switched off for the duration.
    ///
    /// # Errors
    ///
    /// Stops at the first failed write; entries not yet written stay dirty.
    pub fn sync(&mut self) -> Result<(), CacheError> {
        self.counters.syncs += 1;
        let relaxed = self.standalone;
        if relaxed {
            self.store.set_sync(false);
        }

        let dirty: Vec<EntryIdx> = self
            .buckets
            .iter(&self.arena)
            .filter(|&i| self.arena.entry(i).dirty)
            .collect();

        let arena = &mut self.arena;
        let pipeline = &mut self.pipeline;
        let flush = |store: &mut S| -> Result<(u64, usize, Vec<EntryIdx>), CacheError> {
            let mut written = 0u64;
            let mut unstorable = Vec::new();
            for &idx in &dirty {
                let entry = arena.entry(idx);
                match write_back(
                    &mut *store,
                    pipeline,
                    &entry.key,
                    entry.record_type,
                    entry.value.as_ref(),
                ) {
                    Ok(()) => {
                        arena.entry_mut(idx).dirty = false;
                        written += 1;
                    }
                    Err(e) if is_unstorable(&e) => {
                        error!(error = %e, "dropping cached attribute that cannot be stored");
                        unstorable.push(idx);
                    }
                    Err(e) => return Err(e),
                }
            }
            let objects = pipeline.sync_all(&mut *store)?;
            Ok((written, objects, unstorable))
        };
        let result = store::with_lock(&mut self.store, flush);

        if relaxed {
            self.store.set_sync(true);
        }
        let (written, objects, unstorable) = result?;
        for idx in unstorable {
            self.discard(idx);
        }
        self.counters.dbwrites += written;
        info!(entries = written, objects, "cache synced");
        Ok(())
    }

    /// Syncs, then drops every cached entry and resident object and zeroes
    /// the statistics.
    ///
    /// # Errors
    ///
    /// If the sync fails nothing is dropped.
    pub fn reset(&mut self) -> Result<(), CacheError> {
        self.sync()?;
        self.pipeline.flush_and_clear(&mut self.store)?;
        let freed = self.arena.len();
        self.arena.clear();
        self.buckets.clear();
        self.size = 0;
        self.counters = Counters::new();
        info!(freed, "cache reset");
        Ok(())
    }
}
