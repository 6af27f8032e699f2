/// Eviction: keeping cached bytes within the size budget.
///
/// Room is made before an insertion by taking entries off the LRU head,
/// across all buckets. A dirty victim is written below the cache first; if
/// that write fails the victim stays put and the error is returned. An
/// attribute its object has no room for is logged and dropped.
use store::DiskStore;
use tracing::{debug, error};

use crate::arena::EntryIdx;
use crate::write::{is_unstorable, write_back};
use crate::{Cache, CacheError};

impl<S: DiskStore> Cache<S> {
    /// Evicts least recently used entries until `incoming` more bytes fit
    /// in the budget.
    pub(crate) fn make_room(&mut self, incoming: usize) -> Result<(), CacheError> {
        while self.size + incoming > self.budget {
            let Some(idx) = self.arena.front() else {
                break;
            };
            let entry = self.arena.entry(idx);
            if entry.dirty {
                match write_back(
                    &mut self.store,
                    &mut self.pipeline,
                    &entry.key,
                    entry.record_type,
                    entry.value.as_ref(),
                ) {
                    Ok(()) => self.counters.dbwrites += 1,
                    Err(e) if is_unstorable(&e) => {
                        error!(error = %e, "dropping evicted attribute that cannot be stored");
                    }
                    Err(e) => return Err(e),
                }
            }
            self.discard(idx);
        }
        Ok(())
    }

    /// Removes an entry from its chain and the LRU list and frees it.
    /// Nothing is written.
    pub(crate) fn discard(&mut self, idx: EntryIdx) {
        let entry = self.arena.entry(idx);
        let bucket = self.buckets.bucket(&entry.key, entry.record_type);
        self.buckets.remove(&mut self.arena, bucket, idx);
        let entry = self.arena.release(idx);
        self.size -= entry.size();
        debug!(
            record_type = %entry.record_type,
            len = entry.size(),
            "cache entry dropped"
        );
    }
}
