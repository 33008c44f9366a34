//! Concurrency behavior over one shared index.

use std::sync::Arc;
use voyager_core::{Index, IndexParams, SpaceType, StorageDataType};

#[test]
fn test_concurrent_disjoint_inserts_lose_nothing() {
    // 8 threads × 1000 disjoint labels into an index that starts with a
    // single slot: every insert races the grow path.
    let index = Arc::new(Index::new(
        SpaceType::Euclidean,
        4,
        StorageDataType::Float32,
        IndexParams {
            max_elements: 1,
            ..IndexParams::default()
        },
    ));

    let threads = 8u64;
    let per_thread = 1000u64;
    let handles: Vec<_> = (0..threads)
        .map(|t| {
            let index = Arc::clone(&index);
            std::thread::spawn(move || {
                for i in 0..per_thread {
                    let label = t * per_thread + i;
                    let x = label as f32;
                    index
                        .add_item(&[x, -x, x * 0.5, 1.0], Some(label))
                        .unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(index.len(), (threads * per_thread) as usize);
    let mut ids = index.ids();
    ids.sort_unstable();
    assert_eq!(ids, (0..threads * per_thread).collect::<Vec<u64>>());

    // Every vector finds its own label.
    for label in (0..threads * per_thread).step_by(97) {
        let x = label as f32;
        let (labels, distances) = index
            .query(&[x, -x, x * 0.5, 1.0], 1, Some(50))
            .unwrap();
        assert_eq!(labels[0], label);
        assert!(distances[0] <= 1e-5);
    }
}

#[test]
fn test_concurrent_readers_and_writers() {
    let index = Arc::new(Index::new(
        SpaceType::Euclidean,
        2,
        StorageDataType::Float32,
        IndexParams {
            max_elements: 64,
            ..IndexParams::default()
        },
    ));
    for i in 0..64u64 {
        index.add_item(&[i as f32, 0.0], Some(i)).unwrap();
    }

    let writers: Vec<_> = (0..2u64)
        .map(|t| {
            let index = Arc::clone(&index);
            std::thread::spawn(move || {
                for i in 0..500u64 {
                    let label = 1000 + t * 500 + i;
                    index.add_item(&[label as f32, 1.0], Some(label)).unwrap();
                }
            })
        })
        .collect();

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let index = Arc::clone(&index);
            std::thread::spawn(move || {
                for i in 0..500u64 {
                    let target = i % 64;
                    // A search racing inserts may be approximate, but must
                    // return valid labels and non-negative distances.
                    let (labels, distances) =
                        index.query(&[target as f32, 0.0], 1, Some(30)).unwrap();
                    assert!(index.contains(labels[0]));
                    assert!(distances[0] >= 0.0);
                }
            })
        })
        .collect();

    for handle in writers.into_iter().chain(readers) {
        handle.join().unwrap();
    }
    assert_eq!(index.len(), 64 + 1000);
}

#[test]
fn test_concurrent_same_label_inserts_serialize() {
    let index = Arc::new(Index::new(
        SpaceType::Euclidean,
        1,
        StorageDataType::Float32,
        IndexParams {
            max_elements: 4,
            ..IndexParams::default()
        },
    ));

    let handles: Vec<_> = (0..4)
        .map(|t| {
            let index = Arc::clone(&index);
            std::thread::spawn(move || {
                for i in 0..200 {
                    index
                        .add_item(&[(t * 1000 + i) as f32], Some(7))
                        .unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    // However the writes interleaved, there is exactly one element.
    assert_eq!(index.len(), 1);
    assert_eq!(index.ids(), vec![7]);
}

#[test]
fn test_parallel_batch_insert_through_facade() {
    let index = Index::new(
        SpaceType::Cosine,
        8,
        StorageDataType::Float32,
        IndexParams::default(),
    );
    let vectors: Vec<Vec<f32>> = (0..500)
        .map(|i| (0..8).map(|j| ((i * 8 + j) as f32).sin()).collect())
        .collect();

    let labels = index.add_items(&vectors, None, Some(4)).unwrap();
    assert_eq!(labels.len(), 500);
    assert_eq!(index.len(), 500);

    let (rows, _) = index.query_batch(&vectors, 1, Some(4), Some(50)).unwrap();
    let hits = rows
        .iter()
        .enumerate()
        .filter(|(i, row)| row[0] == *i as u64)
        .count();
    // Cosine self-recall over a smooth deterministic set should be
    // essentially perfect at this ef.
    assert!(hits >= 495, "self-recall too low: {hits}/500");
}
