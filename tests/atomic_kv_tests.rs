mod common;

use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;

use fold_kv::kv::{
    AtomicConfig, AtomicKvDatabase, KeyRange, KeyRanges, KvPairIterator, KvRead, KvStore,
    SimpleKvDatabase, Writes,
};

use common::{init_test_env, key};

fn started() -> AtomicKvDatabase<SimpleKvDatabase> {
    init_test_env();
    let db = AtomicKvDatabase::new(SimpleKvDatabase::new());
    db.start().unwrap();
    db
}

#[test]
fn test_concurrent_counter_adjustments_are_exact() {
    let db = started();
    let counter = key("0a01");
    db.put(&counter, &db.encode_counter(0).unwrap()).unwrap();

    thread::scope(|scope| {
        for _ in 0..4 {
            scope.spawn(|| {
                for _ in 0..50 {
                    db.adjust_counter(&counter, 1).unwrap();
                }
            });
        }
    });

    let value = db.get(&counter).unwrap().unwrap();
    assert_eq!(db.decode_counter(&value).unwrap(), 200);
}

#[test]
fn test_concurrent_read_modify_write_is_atomic() {
    init_test_env();
    let config = AtomicConfig {
        max_retries: 50,
        ..AtomicConfig::default()
    };
    let db = AtomicKvDatabase::with_config(SimpleKvDatabase::new(), config);
    db.start().unwrap();
    let cell = key("0b");
    db.put(&cell, &0u64.to_be_bytes()).unwrap();
    let succeeded = AtomicU64::new(0);

    thread::scope(|scope| {
        for _ in 0..4 {
            scope.spawn(|| {
                for _ in 0..25 {
                    let result = db.do_in_transaction(|tx| {
                        let bytes = tx.get(&cell)?.unwrap_or_default();
                        let current = u64::from_be_bytes(bytes.try_into().unwrap_or([0; 8]));
                        tx.put(&cell, &(current + 1).to_be_bytes())
                    });
                    if result.is_ok() {
                        succeeded.fetch_add(1, Ordering::SeqCst);
                    } else {
                        assert!(result.unwrap_err().is_retryable());
                    }
                }
            });
        }
    });

    let bytes = db.get(&cell).unwrap().unwrap();
    let stored = u64::from_be_bytes(bytes.try_into().unwrap());
    assert_eq!(stored, succeeded.load(Ordering::SeqCst));
    assert!(stored > 0);
}

#[test]
fn test_snapshot_is_stable_while_writers_commit() {
    let db = started();
    db.put(&key("01"), b"before").unwrap();

    let snapshot = db.snapshot().unwrap();
    db.put(&key("01"), b"after").unwrap();
    db.put(&key("02"), b"new").unwrap();

    assert_eq!(snapshot.get(&key("01")).unwrap(), Some(b"before".to_vec()));
    assert_eq!(snapshot.get(&key("02")).unwrap(), None);
    assert_eq!(db.get(&key("01")).unwrap(), Some(b"after".to_vec()));
    snapshot.close().unwrap();
    assert_eq!(db.leaked_snapshots(), 0);
}

#[test]
fn test_range_iteration_over_snapshot() {
    let db = started();
    let mut writes = Writes::new();
    for k in ["00", "10", "20", "30", "40", "50"] {
        writes.put(&key(k), &key(k));
    }
    writes
        .remove_range(&key("20"), Some(key("30").as_slice()))
        .unwrap();
    db.mutate(&writes, true).unwrap();

    let ranges = KeyRanges::new([
        KeyRange::new(key("10"), Some(key("35"))).unwrap(),
        KeyRange::new(key("50"), None).unwrap(),
    ]);
    let keys = db
        .with_snapshot(|snapshot| {
            KvPairIterator::new(snapshot, ranges.clone(), true)
                .map(|pair| pair.map(|p| hex::encode(p.key)))
                .collect::<Result<Vec<_>, _>>()
        })
        .unwrap();
    assert_eq!(keys, vec!["50", "30", "10"]);
}

#[test]
fn test_stopped_store_rejects_operations() {
    let db = started();
    db.stop().unwrap();
    assert!(db.get(&key("01")).is_err());
    assert!(db.snapshot().is_err());
}
