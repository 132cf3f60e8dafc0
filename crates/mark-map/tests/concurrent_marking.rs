//! Concurrent marking tests.
//!
//! These tests hammer the atomic paths from many threads and check that the
//! final bitmap is the union of everything applied.

use std::sync::{Arc, Barrier};
use std::thread;

use mark_map::{MarkMap, MarkMapConfig, StorageKind, BITS_PER_WORD};

const BASE: usize = 0x2000_0000;

fn new_map(heap: usize) -> Arc<MarkMap> {
    Arc::new(
        MarkMap::new(
            &MarkMapConfig::new(heap)
                .with_heap_base(BASE)
                .with_storage(StorageKind::Heap),
        )
        .unwrap(),
    )
}

#[test]
fn test_same_word_union_of_all_masks() {
    let map = new_map(1 << 16);
    let threads = 8;
    let barrier = Arc::new(Barrier::new(threads));

    let handles: Vec<_> = (0..threads)
        .map(|t| {
            let map = Arc::clone(&map);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                for round in 0..1000 {
                    let bit = (t * 7 + round * 13) % BITS_PER_WORD;
                    map.atomic_set_bits(5, 1 << bit);
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    let mut expected = 0usize;
    for t in 0..threads {
        for round in 0..1000 {
            expected |= 1 << ((t * 7 + round * 13) % BITS_PER_WORD);
        }
    }
    assert_eq!(map.word(5), expected);
    assert_eq!(map.word(4), 0);
    assert_eq!(map.word(6), 0);
}

#[test]
fn test_each_thread_owns_one_bit_of_shared_word() {
    let map = new_map(1 << 16);
    let threads = BITS_PER_WORD.min(16);

    let handles: Vec<_> = (0..threads)
        .map(|bit| {
            let map = Arc::clone(&map);
            thread::spawn(move || {
                for _ in 0..500 {
                    map.atomic_set_bits(0, 1 << bit);
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(map.word(0), (1usize << threads) - 1);
}

#[test]
fn test_mark_reports_exactly_one_winner() {
    let map = new_map(1 << 16);
    let threads = 8;
    let granules = 256;
    let barrier = Arc::new(Barrier::new(threads));

    let handles: Vec<_> = (0..threads)
        .map(|_| {
            let map = Arc::clone(&map);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                (0..granules).filter(|g| map.mark(BASE + g * 8)).count()
            })
        })
        .collect();

    let winners: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
    assert_eq!(winners, granules);
    assert_eq!(map.count_marked_in_range(BASE, BASE + granules * 8), granules);
}

#[test]
fn test_overlapping_range_marks_from_many_threads() {
    let map = new_map(1 << 20);
    let threads = 6;
    let span = 3000;

    let handles: Vec<_> = (0..threads)
        .map(|t| {
            let map = Arc::clone(&map);
            thread::spawn(move || {
                let low = BASE + t * span / 2 * 8;
                map.mark_range(low, low + span * 8);
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let low = BASE;
    let high = BASE + ((threads - 1) * span / 2 + span) * 8;
    assert_eq!(map.count_marked_in_range(low, high), (high - low) / 8);
    assert!(!map.is_marked(high));
}
