//! Integration tests for the extendible hash table

use strata::container::ExtendibleHashTable;

#[test]
fn test_sample_scenario() {
    let table = ExtendibleHashTable::new(2);

    table.insert(1u32, "a");
    table.insert(2, "b");
    table.insert(3, "c");
    table.insert(4, "d");
    table.insert(5, "e");
    table.insert(6, "f");
    table.insert(7, "g");
    table.insert(8, "h");
    table.insert(9, "i");

    assert_eq!(table.get_local_depth(0), 2);
    assert_eq!(table.get_local_depth(1), 3);
    assert_eq!(table.get_local_depth(2), 2);
    assert_eq!(table.get_local_depth(3), 2);

    assert_eq!(table.find(&9), Some("i"));
    assert_eq!(table.find(&8), Some("h"));
    assert_eq!(table.find(&2), Some("b"));
    assert_eq!(table.find(&10), None);

    assert!(table.remove(&8));
    assert!(table.remove(&4));
    assert!(table.remove(&1));
    assert!(!table.remove(&20));
}

#[test]
fn test_split_growth() {
    let table = ExtendibleHashTable::new(2);

    table.insert(1u32, "a");
    table.insert(2, "b");
    assert_eq!(table.get_local_depth(0), 0);

    table.insert(3, "c");
    table.insert(4, "d");
    assert_eq!(table.get_local_depth(0), 1);
    assert_eq!(table.get_local_depth(1), 1);

    table.insert(5, "e");
    table.insert(6, "f");
    assert_eq!(table.get_local_depth(0), 2);
    assert_eq!(table.get_local_depth(1), 2);
    assert_eq!(table.get_local_depth(2), 2);
    assert_eq!(table.get_local_depth(3), 2);
}

#[test]
fn test_bucket_count() {
    let table = ExtendibleHashTable::new(4);

    for key in [4u32, 12, 16, 64, 31, 10, 51, 15, 18, 20, 7, 23] {
        table.insert(key, "x");
    }

    assert_eq!(table.get_num_buckets(), 6);
}

#[test]
fn test_insert_overwrites() {
    let table = ExtendibleHashTable::new(2);

    table.insert(5u32, 1);
    assert_eq!(table.find(&5), Some(1));

    table.insert(5, 2);
    assert_eq!(table.find(&5), Some(2));
}

#[test]
fn test_remove_then_reinsert() {
    let table = ExtendibleHashTable::new(2);

    for i in 0..16u32 {
        table.insert(i, i * 10);
    }
    for i in 0..16u32 {
        assert_eq!(table.find(&i), Some(i * 10), "missing key {}", i);
    }

    for i in (0..16u32).step_by(2) {
        assert!(table.remove(&i));
    }
    for i in 0..16u32 {
        let expected = if i % 2 == 0 { None } else { Some(i * 10) };
        assert_eq!(table.find(&i), expected);
    }

    // Reinserting lands in the already-deepened directory
    for i in (0..16u32).step_by(2) {
        table.insert(i, i);
        assert_eq!(table.find(&i), Some(i));
    }
}

#[test]
fn test_directory_invariants() {
    let table = ExtendibleHashTable::new(2);

    for i in 0..64u32 {
        table.insert(i, i);
    }

    let global = table.get_global_depth();
    for slot in 0..(1usize << global) {
        assert!(table.get_local_depth(slot) <= global);
    }
}

#[test]
fn test_concurrent_insert() {
    use std::sync::Arc;
    use std::thread;

    const NUM_RUNS: usize = 50;
    const NUM_THREADS: u32 = 10;

    // Repeat to give interleavings a chance to go wrong
    for _ in 0..NUM_RUNS {
        let table = Arc::new(ExtendibleHashTable::new(2));

        let handles: Vec<_> = (0..NUM_THREADS)
            .map(|tid| {
                let table = Arc::clone(&table);
                thread::spawn(move || {
                    table.insert(tid, tid);
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(table.get_global_depth(), 3);
        for i in 0..NUM_THREADS {
            assert_eq!(table.find(&i), Some(i));
        }
    }
}

#[test]
fn test_concurrent_mixed_workload() {
    use std::sync::Arc;
    use std::thread;

    let table = Arc::new(ExtendibleHashTable::new(4));

    let writers: Vec<_> = (0..4u32)
        .map(|t| {
            let table = Arc::clone(&table);
            thread::spawn(move || {
                for i in 0..100u32 {
                    let key = t * 100 + i;
                    table.insert(key, key);
                    assert_eq!(table.find(&key), Some(key));
                }
            })
        })
        .collect();

    for handle in writers {
        handle.join().unwrap();
    }

    for key in 0..400u32 {
        assert_eq!(table.find(&key), Some(key));
    }
}
