//! Tests for the typed index façade.

use super::{Index, IndexParams, TypedIndex};
use crate::error::Error;
use crate::spaces::SpaceType;
use crate::storage::{Float8, StorageDataType};
use crate::streams::{MemoryInputStream, MemoryOutputStream};

fn euclidean_f32(dims: usize) -> TypedIndex<f32> {
    TypedIndex::new(SpaceType::Euclidean, dims, IndexParams::default())
}

#[test]
fn test_add_and_query() {
    let index = euclidean_f32(2);
    index.add_item(&[1.0, 2.0], Some(7)).unwrap();
    index.add_item(&[2.0, 3.0], Some(42)).unwrap();

    let (labels, distances) = index.query(&[1.0, 2.0], 1, None).unwrap();
    assert_eq!(labels, vec![7]);
    assert_eq!(distances, vec![0.0]);
}

#[test]
fn test_grow_on_full_from_capacity_one() {
    // Default max_elements is 1: every insert past the first exercises the
    // resize-and-retry path.
    let index = euclidean_f32(2);
    for i in 0..50u64 {
        index.add_item(&[i as f32, 0.0], Some(i)).unwrap();
    }
    assert_eq!(index.len(), 50);
    assert!(index.capacity() >= 50);

    for i in 0..50u64 {
        let (labels, _) = index.query(&[i as f32, 0.0], 1, Some(30)).unwrap();
        assert_eq!(labels[0], i);
    }
}

#[test]
fn test_dimension_mismatch() {
    let index = euclidean_f32(3);
    match index.add_item(&[1.0, 2.0], None) {
        Err(Error::DimensionMismatch { expected, actual }) => {
            assert_eq!(expected, 3);
            assert_eq!(actual, 2);
        }
        other => panic!("expected DimensionMismatch, got {other:?}"),
    }
    assert!(index.query(&[1.0], 1, None).is_err());
}

#[test]
fn test_auto_labels_are_monotonic_and_collision_free() {
    let index = euclidean_f32(1);
    let a = index.add_item(&[0.0], None).unwrap();
    let b = index.add_item(&[1.0], None).unwrap();
    assert_eq!((a, b), (0, 1));

    // An explicit id bumps the auto counter past itself.
    index.add_item(&[2.0], Some(10)).unwrap();
    let c = index.add_item(&[3.0], None).unwrap();
    assert_eq!(c, 11);
}

#[test]
fn test_reinsert_keeps_count() {
    let index = euclidean_f32(1);
    index.add_item(&[1.0], Some(3)).unwrap();
    index.add_item(&[2.0], Some(3)).unwrap();
    assert_eq!(index.len(), 1);
    let (_, distances) = index.query(&[2.0], 1, None).unwrap();
    assert_eq!(distances[0], 0.0);
}

#[test]
fn test_cosine_normalizes_on_input() {
    let index = TypedIndex::<f32>::new(SpaceType::Cosine, 3, IndexParams::default());
    index.add_item(&[1.0, 0.0, 0.0], Some(1)).unwrap();
    index.add_item(&[0.0, 1.0, 0.0], Some(2)).unwrap();

    // Normalization cancels scale: a query at twice the length matches.
    let (labels, distances) = index.query(&[2.0, 0.0, 0.0], 1, None).unwrap();
    assert_eq!(labels, vec![1]);
    assert!(distances[0].abs() < 1e-6);

    // The stored vector comes back unit length, whatever went in.
    index.add_item(&[3.0, 4.0, 0.0], Some(3)).unwrap();
    let stored = index.get_vector(3).unwrap();
    let norm: f32 = stored.iter().map(|x| x * x).sum::<f32>().sqrt();
    assert!((norm - 1.0).abs() < 1e-6);
    assert!((stored[0] - 0.6).abs() < 1e-6);
    assert!((stored[1] - 0.8).abs() < 1e-6);
}

#[test]
fn test_order_preserving_transform_tracks_max_norm() {
    let index = TypedIndex::<f32>::new(SpaceType::InnerProduct, 2, IndexParams::default());
    assert!(index.uses_order_preserving_transform());

    index.add_item(&[3.0, 4.0], Some(1)).unwrap(); // norm 5
    index.add_item(&[1.0, 1.0], Some(2)).unwrap(); // norm √2
    assert!((index.max_norm() - 5.0).abs() < 1e-6);

    // The largest-inner-product element ranks first.
    let (labels, _) = index.query(&[3.0, 4.0], 2, Some(10)).unwrap();
    assert_eq!(labels[0], 1);

    // The augmented coordinate is stripped from returned vectors.
    assert_eq!(index.get_vector(1).unwrap(), vec![3.0, 4.0]);
}

#[test]
fn test_transform_can_be_disabled() {
    let params = IndexParams {
        use_order_preserving_transform: false,
        ..IndexParams::default()
    };
    let index = TypedIndex::<f32>::new(SpaceType::InnerProduct, 2, params);
    assert!(!index.uses_order_preserving_transform());
    index.add_item(&[3.0, 4.0], Some(1)).unwrap();
    assert_eq!(index.max_norm(), 0.0, "transform off: no norm tracking");
}

#[test]
fn test_query_distances_are_non_negative() {
    // Inner-product distance of a strong match is 1 − a·b < 0; the guard
    // clamps what is returned to zero.
    let index = TypedIndex::<f32>::new(SpaceType::InnerProduct, 2, IndexParams::default());
    index.add_item(&[3.0, 4.0], Some(1)).unwrap();
    index.add_item(&[0.1, 0.1], Some(2)).unwrap();
    let (_, distances) = index.query(&[3.0, 4.0], 2, Some(10)).unwrap();
    assert!(distances.iter().all(|&d| d >= 0.0));
}

#[test]
fn test_batch_label_mismatch() {
    let index = euclidean_f32(1);
    let vectors = vec![vec![0.0], vec![1.0]];
    match index.add_items(&vectors, Some(&[1]), None) {
        Err(Error::LabelMismatch { labels, vectors }) => {
            assert_eq!(labels, 1);
            assert_eq!(vectors, 2);
        }
        other => panic!("expected LabelMismatch, got {other:?}"),
    }
}

#[test]
fn test_batch_insert_and_query_sequential() {
    let index = euclidean_f32(2);
    let vectors: Vec<Vec<f32>> = (0..6).map(|i| vec![i as f32, 0.0]).collect();
    // Batch of 6 with plenty of threads: takes the sequential path.
    let labels = index.add_items(&vectors, None, Some(8)).unwrap();
    assert_eq!(labels, vec![0, 1, 2, 3, 4, 5]);

    let (batch_labels, batch_distances) = index
        .query_batch(&vectors, 1, Some(8), Some(10))
        .unwrap();
    for (i, row) in batch_labels.iter().enumerate() {
        assert_eq!(row[0], i as u64);
        assert_eq!(batch_distances[i][0], 0.0);
    }
}

#[test]
fn test_batch_insert_parallel_path() {
    let index = euclidean_f32(4);
    let vectors: Vec<Vec<f32>> = (0..64)
        .map(|i| {
            let x = i as f32;
            vec![x, -x, x * 0.5, 1.0]
        })
        .collect();
    let ids: Vec<u64> = (100..164).collect();
    // 64 items across 2 threads exceeds the 4×threads threshold.
    let labels = index.add_items(&vectors, Some(&ids), Some(2)).unwrap();
    assert_eq!(labels, ids);
    assert_eq!(index.len(), 64);

    let (rows, _) = index.query_batch(&vectors, 1, Some(2), Some(20)).unwrap();
    for (i, row) in rows.iter().enumerate() {
        assert_eq!(row[0], ids[i]);
    }
}

#[test]
fn test_get_vector_unknown_label() {
    let index = euclidean_f32(1);
    assert!(matches!(
        index.get_vector(5),
        Err(Error::UnknownLabel(5))
    ));
}

#[test]
fn test_float8_get_vector_within_quantization_error() {
    let index = TypedIndex::<Float8>::new(SpaceType::Euclidean, 4, IndexParams::default());
    index.add_item(&[1.0, -1.0, 0.5, -0.5], Some(0)).unwrap();
    let stored = index.get_vector(0).unwrap();
    for (got, expected) in stored.iter().zip([1.0f32, -1.0, 0.5, -0.5]) {
        assert!((got - expected).abs() <= 1.0 / 127.0);
    }
}

#[test]
fn test_float8_rejects_out_of_range_inputs() {
    let index = TypedIndex::<Float8>::new(SpaceType::Euclidean, 2, IndexParams::default());
    match index.add_item(&[0.5, 1.5], Some(0)) {
        Err(Error::ValueOutOfRange { storage, .. }) => assert_eq!(storage, "Float8"),
        other => panic!("expected ValueOutOfRange, got {other:?}"),
    }
}

#[test]
fn test_get_distance_matches_metric() {
    let index = euclidean_f32(2);
    assert!((index.get_distance(&[0.0, 0.0], &[3.0, 4.0]).unwrap() - 25.0).abs() < 1e-5);

    let cosine = TypedIndex::<f32>::new(SpaceType::Cosine, 2, IndexParams::default());
    let d = cosine.get_distance(&[5.0, 0.0], &[1.0, 0.0]).unwrap();
    assert!(d.abs() < 1e-6, "colinear vectors have cosine distance 0");
}

#[test]
fn test_typed_save_load_round_trip() {
    let index = euclidean_f32(3);
    for i in 0..30u64 {
        let x = i as f32;
        index.add_item(&[x, -x, x * 0.25], Some(i)).unwrap();
    }
    index.mark_deleted(9).unwrap();

    let mut out = MemoryOutputStream::new();
    index.save(&mut out).unwrap();

    let mut input = MemoryInputStream::new(out.into_bytes());
    let loaded = Index::load(&mut input).unwrap();
    assert_eq!(loaded.len(), 30);
    assert_eq!(loaded.dims(), 3);
    assert_eq!(loaded.space(), SpaceType::Euclidean);
    assert_eq!(loaded.storage_data_type(), StorageDataType::Float32);

    for i in 0..30u64 {
        if i == 9 {
            continue;
        }
        let x = i as f32;
        let (labels, _) = loaded.query(&[x, -x, x * 0.25], 1, Some(20)).unwrap();
        assert_eq!(labels[0], i);
    }

    // The auto-label counter resumes past the loaded labels.
    let next = loaded.add_item(&[0.5, 0.5, 0.5], None).unwrap();
    assert_eq!(next, 30);
}

#[test]
fn test_load_with_mismatched_parameters_fails() {
    let index = euclidean_f32(3);
    index.add_item(&[1.0, 2.0, 3.0], Some(0)).unwrap();
    let mut out = MemoryOutputStream::new();
    index.save(&mut out).unwrap();

    let mut input = MemoryInputStream::new(out.into_bytes());
    match Index::load_with_parameters(&mut input, SpaceType::Euclidean, 4, StorageDataType::Float32)
    {
        Err(Error::Corruption(msg)) => assert!(msg.contains("do not match")),
        other => panic!("expected Corruption, got {:?}", other.err()),
    }
}

#[test]
fn test_resize_shrink_rejected_through_facade() {
    let index = euclidean_f32(1);
    for i in 0..10u64 {
        index.add_item(&[i as f32], Some(i)).unwrap();
    }
    match index.resize(index.len() - 1) {
        Err(Error::IndexCannotBeShrunk { .. }) => {}
        other => panic!("expected IndexCannotBeShrunk, got {other:?}"),
    }
}

#[test]
fn test_ids_listing_through_facade() {
    let index = Index::new(
        SpaceType::Euclidean,
        1,
        StorageDataType::Float32,
        IndexParams::default(),
    );
    index.add_item(&[0.0], Some(4)).unwrap();
    index.add_item(&[1.0], Some(2)).unwrap();
    let mut ids = index.ids();
    ids.sort_unstable();
    assert_eq!(ids, vec![2, 4]);
    assert!(index.contains(4));
    assert!(!index.contains(3));
}
