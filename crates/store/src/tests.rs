use super::*;
use std::fs;
use tempfile::tempdir;

// -------------------- MemStore --------------------

#[test]
fn mem_store_put_get_delete() {
    let mut db = MemStore::new();
    assert_eq!(db.get(b"k").unwrap(), None);
    db.put(b"k", b"v1").unwrap();
    db.put(b"k", b"v2").unwrap();
    assert_eq!(db.get(b"k").unwrap(), Some(b"v2".to_vec()));
    db.delete(b"k").unwrap();
    assert_eq!(db.get(b"k").unwrap(), None);

    assert_eq!(db.reads(), 3);
    assert_eq!(db.writes(), 2);
    assert_eq!(db.deletes(), 1);
}

#[test]
fn mem_store_delete_missing_is_noop() {
    let mut db = MemStore::new();
    db.delete(b"nope").unwrap();
    assert!(db.is_empty());
}

#[test]
fn mem_store_peek_does_not_count() {
    let mut db = MemStore::new();
    db.put(b"k", b"v").unwrap();
    assert_eq!(db.peek(b"k"), Some(&b"v"[..]));
    assert_eq!(db.reads(), 0);
}

#[test]
fn mem_store_injected_write_failure() {
    let mut db = MemStore::new();
    db.set_fail_writes(true);
    assert!(matches!(db.put(b"k", b"v"), Err(StoreError::Io(_))));
    assert!(db.delete(b"k").is_err());
    db.set_fail_writes(false);
    db.put(b"k", b"v").unwrap();
    assert_eq!(db.len(), 1);
}

#[test]
fn store_usable_through_mutable_reference() {
    fn write_through<S: DiskStore>(mut s: S) {
        s.put(b"a", b"1").unwrap();
    }
    let mut db = MemStore::new();
    write_through(&mut db);
    assert_eq!(db.peek(b"a"), Some(&b"1"[..]));
}

// -------------------- FileStore basics --------------------

#[test]
fn file_store_put_get_delete() {
    let dir = tempdir().unwrap();
    let mut db = FileStore::open(dir.path().join("attrs.db")).unwrap();

    db.put(b"k1", b"v1").unwrap();
    db.put(b"k2", b"").unwrap();
    assert_eq!(db.get(b"k1").unwrap(), Some(b"v1".to_vec()));
    assert_eq!(db.get(b"k2").unwrap(), Some(Vec::new()));
    assert_eq!(db.get(b"k3").unwrap(), None);

    db.delete(b"k1").unwrap();
    assert_eq!(db.get(b"k1").unwrap(), None);
    assert_eq!(db.len(), 1);
}

#[test]
fn file_store_survives_reopen() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("attrs.db");

    {
        let mut db = FileStore::open(&path).unwrap();
        db.put(b"a", b"1").unwrap();
        db.put(b"b", b"2").unwrap();
        db.put(b"a", b"3").unwrap();
        db.delete(b"b").unwrap();
    }

    let mut db = FileStore::open(&path).unwrap();
    assert_eq!(db.get(b"a").unwrap(), Some(b"3".to_vec()));
    assert_eq!(db.get(b"b").unwrap(), None);
    assert_eq!(db.len(), 1);
    assert!(db.garbage_bytes() > 0);
}

#[test]
fn file_store_delete_missing_appends_nothing() {
    let dir = tempdir().unwrap();
    let mut db = FileStore::open(dir.path().join("attrs.db")).unwrap();
    let before = db.file_size();
    db.delete(b"ghost").unwrap();
    assert_eq!(db.file_size(), before);
}

#[test]
fn file_store_async_mode_still_readable() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("attrs.db");
    {
        let mut db = FileStore::open(&path).unwrap();
        db.set_sync(false);
        for i in 0..100u32 {
            db.put(&i.to_le_bytes(), format!("v{}", i).as_bytes()).unwrap();
        }
    }
    let mut db = FileStore::open(&path).unwrap();
    assert_eq!(db.len(), 100);
    assert_eq!(db.get(&42u32.to_le_bytes()).unwrap(), Some(b"v42".to_vec()));
}

// -------------------- Crash tolerance --------------------

#[test]
fn file_store_truncated_tail_is_discarded() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("attrs.db");
    {
        let mut db = FileStore::open(&path).unwrap();
        db.put(b"k1", b"v1").unwrap();
        db.put(b"k2", b"v2").unwrap();
    }

    let good_len = fs::metadata(&path).unwrap().len();
    let mut data = fs::read(&path).unwrap();
    data.extend_from_slice(&[0x20, 0x00, 0x00, 0x00, 0xAA, 0xBB]);
    fs::write(&path, &data).unwrap();

    {
        let mut db = FileStore::open(&path).unwrap();
        assert_eq!(db.len(), 2);
        assert_eq!(fs::metadata(&path).unwrap().len(), good_len);
        db.put(b"k3", b"v3").unwrap();
    }

    let mut db = FileStore::open(&path).unwrap();
    assert_eq!(db.get(b"k3").unwrap(), Some(b"v3".to_vec()));
    assert_eq!(db.len(), 3);
}

#[test]
fn file_store_detects_crc_mismatch() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("attrs.db");
    {
        let mut db = FileStore::open(&path).unwrap();
        db.put(b"key", b"value").unwrap();
    }

    let mut data = fs::read(&path).unwrap();
    let last = data.len() - 1;
    data[last] ^= 0xFF;
    fs::write(&path, &data).unwrap();

    assert!(matches!(
        FileStore::open(&path),
        Err(StoreError::Corrupt { offset: 4 })
    ));
}

#[test]
fn file_store_rejects_foreign_file() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("attrs.db");
    fs::write(&path, b"not a store at all").unwrap();
    assert!(matches!(
        FileStore::open(&path),
        Err(StoreError::Corrupt { offset: 0 })
    ));
}

// -------------------- Optimize --------------------

#[test]
fn optimize_reclaims_garbage_and_keeps_live_data() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("attrs.db");
    let mut db = FileStore::open(&path).unwrap();
    db.set_sync(false);

    for round in 0..10u32 {
        for k in 0..20u32 {
            db.put(&k.to_le_bytes(), format!("r{}k{}", round, k).as_bytes())
                .unwrap();
        }
    }
    for k in 10..20u32 {
        db.delete(&k.to_le_bytes()).unwrap();
    }
    let before = db.file_size();

    db.optimize().unwrap();

    assert!(db.file_size() < before);
    assert_eq!(db.garbage_bytes(), 0);
    assert_eq!(db.len(), 10);
    assert_eq!(db.get(&3u32.to_le_bytes()).unwrap(), Some(b"r9k3".to_vec()));
    assert_eq!(db.get(&15u32.to_le_bytes()).unwrap(), None);
    assert!(!dir.path().join("attrs.db.tmp").exists());

    db.put(b"after", b"optimize").unwrap();
    drop(db);
    let mut db = FileStore::open(&path).unwrap();
    assert_eq!(db.get(b"after").unwrap(), Some(b"optimize".to_vec()));
    assert_eq!(db.len(), 11);
}

#[test]
fn optimize_keeps_a_log_whose_name_ends_in_tmp() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("attrs.tmp");
    let mut db = FileStore::open(&path).unwrap();
    db.put(b"k", b"old").unwrap();
    db.put(b"k", b"new").unwrap();

    db.optimize().unwrap();

    assert_eq!(db.get(b"k").unwrap(), Some(b"new".to_vec()));
    assert!(!dir.path().join("attrs.tmp.tmp").exists());
    drop(db);
    let mut db = FileStore::open(&path).unwrap();
    assert_eq!(db.get(b"k").unwrap(), Some(b"new".to_vec()));
}

// -------------------- Failed appends --------------------

#[test]
fn failed_put_is_cut_back_and_later_puts_survive() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("attrs.db");
    let mut db = FileStore::open(&path).unwrap();
    db.put(b"a", b"first").unwrap();
    let good_len = fs::metadata(&path).unwrap().len();

    db.fail_next_append_after(20);
    assert!(matches!(db.put(b"big", &[7u8; 100]), Err(StoreError::Io(_))));
    assert_eq!(fs::metadata(&path).unwrap().len(), good_len);
    assert_eq!(db.file_size(), good_len);
    assert_eq!(db.get(b"big").unwrap(), None);

    db.put(b"b", b"second").unwrap();
    assert_eq!(db.get(b"b").unwrap(), Some(b"second".to_vec()));

    drop(db);
    let mut db = FileStore::open(&path).unwrap();
    assert_eq!(db.get(b"a").unwrap(), Some(b"first".to_vec()));
    assert_eq!(db.get(b"b").unwrap(), Some(b"second".to_vec()));
    assert_eq!(db.get(b"big").unwrap(), None);
}

#[test]
fn failed_delete_keeps_the_key() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("attrs.db");
    let mut db = FileStore::open(&path).unwrap();
    db.put(b"k", b"v").unwrap();

    db.fail_next_append_after(3);
    assert!(db.delete(b"k").is_err());
    assert_eq!(db.get(b"k").unwrap(), Some(b"v".to_vec()));

    db.put(b"j", b"w").unwrap();
    drop(db);
    let mut db = FileStore::open(&path).unwrap();
    assert_eq!(db.get(b"k").unwrap(), Some(b"v".to_vec()));
    assert_eq!(db.get(b"j").unwrap(), Some(b"w".to_vec()));
}

// -------------------- Locking --------------------

#[test]
fn lock_is_reentrant_for_same_handle() {
    let dir = tempdir().unwrap();
    let mut db = FileStore::open(dir.path().join("attrs.db")).unwrap();
    db.lock().unwrap();
    db.lock().unwrap();
    db.unlock().unwrap();
    db.unlock().unwrap();
}

#[cfg(unix)]
#[test]
fn nested_lock_held_until_outermost_unlock() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("attrs.db");
    let mut first = FileStore::open(&path).unwrap();
    let mut second = FileStore::open(&path).unwrap();

    first.lock().unwrap();
    first.lock().unwrap();
    first.unlock().unwrap();
    assert!(matches!(second.lock(), Err(StoreError::Locked)));
    first.unlock().unwrap();
    second.lock().unwrap();
}

#[test]
fn with_lock_brackets_closure() {
    let mut db = MemStore::new();
    let depth = with_lock(&mut db, |s| {
        s.put(b"k", b"v").unwrap();
        s.lock_depth()
    });
    assert_eq!(depth, 1);
    assert_eq!(db.lock_depth(), 0);
    assert_eq!(db.locks(), 1);
}

#[cfg(unix)]
#[test]
fn with_lock_runs_even_when_lock_is_taken() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("attrs.db");
    let mut holder = FileStore::open(&path).unwrap();
    holder.lock().unwrap();

    let mut db = FileStore::open(&path).unwrap();
    with_lock(&mut db, |s| s.put(b"k", b"v")).unwrap();
    assert_eq!(db.get(b"k").unwrap(), Some(b"v".to_vec()));
    holder.unlock().unwrap();
}

#[cfg(unix)]
#[test]
fn lock_conflicts_between_handles() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("attrs.db");
    let mut first = FileStore::open(&path).unwrap();
    let mut second = FileStore::open(&path).unwrap();

    first.lock().unwrap();
    assert!(matches!(second.lock(), Err(StoreError::Locked)));
    first.unlock().unwrap();
    second.lock().unwrap();
}
