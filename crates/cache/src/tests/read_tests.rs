use super::helpers::{b, disk_key, seeded_store};
use crate::*;
use store::{DiskStore, MemStore};

const OBJ: RecordType = RecordType::OBJECT;

// --------------------- Hits and misses ---------------------

#[test]
fn missing_key_is_none_and_not_cached() {
    let mut db = MemStore::new();
    let mut cache = Cache::new(&mut db, 4, DEFAULT_SIZE);

    assert_eq!(cache.get(b"nope", OBJ).unwrap(), None);
    assert_eq!(cache.get(b"nope", OBJ).unwrap(), None);

    assert!(cache.is_empty());
    let stats = cache.stats();
    assert_eq!(stats.reads, 2);
    assert_eq!(stats.dbreads, 2);
    assert_eq!(stats.fails, 2);
    assert_eq!(cache.store().reads(), 2);
}

#[test]
fn read_through_is_cached() {
    let mut db = seeded_store(&[("cfg", "value")]);
    let mut cache = Cache::new(&mut db, 4, DEFAULT_SIZE);

    assert_eq!(cache.get(b"cfg", OBJ).unwrap(), Some(b("value")));
    assert_eq!(cache.get(b"cfg", OBJ).unwrap(), Some(b("value")));

    assert_eq!(cache.store().reads(), 1);
    let stats = cache.stats();
    assert_eq!(stats.rhits, 1);
    assert_eq!(stats.dbreads, 1);
    assert_eq!(stats.size, 5);
    assert_eq!(stats.dirty, 0);
}

#[test]
fn record_types_do_not_collide() {
    let mut db = MemStore::new();
    let mut cache = Cache::new(&mut db, 1, DEFAULT_SIZE);

    cache.put(b"k", RecordType::OBJECT, Some(b("object"))).unwrap();
    cache.put(b"k", RecordType::DBINFO, Some(b("dbinfo"))).unwrap();

    assert_eq!(cache.get(b"k", RecordType::OBJECT).unwrap(), Some(b("object")));
    assert_eq!(cache.get(b"k", RecordType::DBINFO).unwrap(), Some(b("dbinfo")));
    cache.sync().unwrap();
    drop(cache);

    assert_eq!(db.peek(&disk_key(b"k", RecordType::OBJECT)), Some(&b"object"[..]));
    assert_eq!(db.peek(&disk_key(b"k", RecordType::DBINFO)), Some(&b"dbinfo"[..]));
}

#[test]
fn malformed_attribute_key_is_rejected() {
    let mut db = MemStore::new();
    let mut cache = Cache::new(&mut db, 4, DEFAULT_SIZE);

    assert!(matches!(
        cache.get(b"short", RecordType::ATTRIBUTE),
        Err(CacheError::InvalidAttributeKey(5))
    ));
    assert!(matches!(
        cache.put(b"short", RecordType::ATTRIBUTE, Some(b("x"))),
        Err(CacheError::InvalidAttributeKey(5))
    ));
    assert!(cache.is_empty());
}

#[test]
fn read_hit_refreshes_recency() {
    let mut db = seeded_store(&[("a", "aaaa"), ("b", "bbbb"), ("c", "cccc")]);
    let mut cache = Cache::new(&mut db, 4, 8);

    cache.get(b"a", OBJ).unwrap();
    cache.get(b"b", OBJ).unwrap();
    cache.get(b"a", OBJ).unwrap();
    // Needs room: "b" is now least recently used.
    cache.get(b"c", OBJ).unwrap();
    cache.store_mut().reset_counters();

    cache.get(b"a", OBJ).unwrap();
    assert_eq!(cache.store().reads(), 0);
    cache.get(b"b", OBJ).unwrap();
    assert_eq!(cache.store().reads(), 1);
}

#[test]
fn oversized_stored_value_is_returned_uncached() {
    let mut db = seeded_store(&[("big", "0123456789")]);
    let mut cache = Cache::new(&mut db, 4, 4);

    assert_eq!(cache.get(b"big", OBJ).unwrap(), Some(b("0123456789")));
    assert!(cache.is_empty());
    assert_eq!(cache.size(), 0);
}

// --------------------- Attribute reads ---------------------

#[test]
fn attribute_write_then_read_costs_no_store_reads() {
    let mut db = MemStore::new();
    let mut cache = Cache::new(&mut db, 4, DEFAULT_SIZE);

    cache.put_attr(7, 3, b("hello")).unwrap();
    assert_eq!(cache.get_attr(7, 3).unwrap(), Some(b("hello")));
    assert_eq!(cache.store().reads(), 0);
}

#[test]
fn value_survives_sync_and_restart() {
    let mut db = MemStore::new();
    {
        let mut cache = Cache::new(&mut db, 4, DEFAULT_SIZE);
        cache.put_attr(7, 3, b("hello")).unwrap();
        assert_eq!(cache.get_attr(7, 3).unwrap(), Some(b("hello")));
        assert_eq!(cache.store().reads(), 0);
        cache.sync().unwrap();
    }
    db.reset_counters();

    let mut cache = Cache::new(&mut db, 4, DEFAULT_SIZE);
    assert_eq!(cache.get_attr(7, 3).unwrap(), Some(b("hello")));
    assert_eq!(cache.store().reads(), 1);
    assert_eq!(cache.stats().pipeline.faults, 1);
}

#[test]
fn attribute_miss_goes_through_pipeline() {
    let mut db = MemStore::new();
    let mut cache = Cache::new(&mut db, 4, DEFAULT_SIZE);

    // Both attributes of object 9 come from a single fault-in.
    assert_eq!(cache.get_attr(9, 1).unwrap(), None);
    assert_eq!(cache.get_attr(9, 2).unwrap(), None);
    assert_eq!(cache.store().reads(), 1);
    assert_eq!(cache.stats().pipeline.hits, 1);
}

// --------------------- Dump mode ---------------------

#[test]
fn dump_reads_do_not_push_out_resident_entries() {
    let mut db = seeded_store(&[
        ("a", "aaaa"),
        ("b", "bbbb"),
        ("c", "cccc"),
        ("x", "xxxx"),
        ("y", "yyyy"),
    ]);
    let mut cache = Cache::new(&mut db, 4, 12);
    for k in [b"a", b"b", b"c"] {
        cache.get(k, OBJ).unwrap();
    }

    cache.set_dumping(true);
    cache.get(b"x", OBJ).unwrap();
    cache.get(b"y", OBJ).unwrap();
    cache.set_dumping(false);

    // "x" went in at the head and was the first thing reclaimed for "y".
    cache.store_mut().reset_counters();
    cache.get(b"b", OBJ).unwrap();
    cache.get(b"c", OBJ).unwrap();
    cache.get(b"y", OBJ).unwrap();
    assert_eq!(cache.store().reads(), 0);
}

#[test]
fn dump_activity_is_not_counted() {
    let mut db = seeded_store(&[("a", "aaaa")]);
    let mut cache = Cache::new(&mut db, 4, DEFAULT_SIZE);

    cache.set_dumping(true);
    cache.get(b"a", OBJ).unwrap();
    cache.get(b"a", OBJ).unwrap();
    cache.get(b"zz", OBJ).unwrap();

    let stats = cache.stats();
    assert_eq!(stats.reads, 0);
    assert_eq!(stats.rhits, 0);
    assert_eq!(stats.dbreads, 0);
    assert_eq!(stats.fails, 0);
}

#[test]
fn store_read_failure_reads_as_missing() {
    struct Broken;
    impl DiskStore for Broken {
        fn get(&mut self, _: &[u8]) -> Result<Option<Vec<u8>>, store::StoreError> {
            Err(store::StoreError::Corrupt { offset: 0 })
        }
        fn put(&mut self, _: &[u8], _: &[u8]) -> Result<(), store::StoreError> {
            Ok(())
        }
        fn delete(&mut self, _: &[u8]) -> Result<(), store::StoreError> {
            Ok(())
        }
    }

    let mut cache = Cache::new(Broken, 4, DEFAULT_SIZE);
    assert_eq!(cache.get(b"k", OBJ).unwrap(), None);
    assert_eq!(cache.get_attr(1, 1).unwrap(), None);
}
