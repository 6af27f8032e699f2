/// Read path: `get()` and read-through on a miss.
///
/// A hit moves the entry to the most recently used end. A miss asks the
/// pipeline (attributes) or the disk store (everything else); found values
/// are cached, absent ones are not, so there are no negative entries.
use bytes::Bytes;
use codec::{tagged_key, RecordType};
use store::DiskStore;
use tracing::{debug, warn};

use crate::arena::Entry;
use crate::{attr_key, Cache, CacheError};

impl<S: DiskStore> Cache<S> {
    /// Looks up `key` in namespace `record_type`.
    ///
    /// Returns `Ok(None)` if the key does not exist or has a pending delete.
    ///
    /// # Errors
    ///
    /// [`CacheError::InvalidAttributeKey`] for a malformed attribute key;
    /// [`CacheError::Pipeline`] if faulting in the object required flushing
    /// another one and that write failed. Disk store read failures are
    /// logged and read as `None`.
    pub fn get(&mut self, key: &[u8], record_type: RecordType) -> Result<Option<Bytes>, CacheError> {
        let attr = attr_key(key, record_type)?;
        let counting = self.counting();
        if counting {
            self.counters.reads += 1;
        }

        let bucket = self.buckets.bucket(key, record_type);
        if let Some(idx) = self.buckets.find(&self.arena, bucket, key, record_type) {
            if counting {
                self.counters.rhits += 1;
            }
            self.arena.move_to_back(idx);
            return Ok(self.arena.entry(idx).value.clone());
        }

        let value = match attr {
            Some(a) => self
                .pipeline
                .get_attribute(&mut self.store, a.object, a.attr)?,
            None => match self.store.get(&tagged_key(key, record_type)) {
                Ok(v) => v.map(Bytes::from),
                Err(e) => {
                    warn!(%record_type, error = %e, "store read failed, treating as missing");
                    None
                }
            },
        };
        if counting {
            self.counters.dbreads += 1;
        }

        let Some(value) = value else {
            if counting {
                self.counters.fails += 1;
            }
            return Ok(None);
        };

        if value.len() > self.budget {
            debug!(%record_type, len = value.len(), "value exceeds cache budget, not caching");
            return Ok(Some(value));
        }
        if let Err(e) = self.make_room(value.len()) {
            warn!(error = %e, "could not make room, returning value uncached");
            return Ok(Some(value));
        }

        let idx = self.arena.alloc(Entry {
            key: key.to_vec(),
            record_type,
            value: Some(value.clone()),
            dirty: false,
        });
        self.size += value.len();
        if self.dumping {
            self.buckets.push_front(&mut self.arena, bucket, idx);
            self.arena.push_front(idx);
        } else {
            self.buckets.push_back(&mut self.arena, bucket, idx);
            self.arena.push_back(idx);
        }
        Ok(Some(value))
    }
}
