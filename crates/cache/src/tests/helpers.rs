use bytes::Bytes;
use codec::{tagged_key, RecordType};
use store::MemStore;

pub fn b(s: &str) -> Bytes {
    Bytes::copy_from_slice(s.as_bytes())
}

/// Disk key a raw (non-attribute) record ends up under.
pub fn disk_key(key: &[u8], record_type: RecordType) -> Vec<u8> {
    tagged_key(key, record_type)
}

/// Store seeded with raw `OBJECT` records, counters cleared.
pub fn seeded_store(records: &[(&str, &str)]) -> MemStore {
    let mut db = MemStore::new();
    for (k, v) in records {
        store::DiskStore::put(&mut db, &disk_key(k.as_bytes(), RecordType::OBJECT), v.as_bytes())
            .unwrap();
    }
    db.reset_counters();
    db
}
