//! Persistence: metadata preservation, byte stability, legacy loads.

use voyager_core::{
    Index, IndexParams, MemoryInputStream, MemoryOutputStream, SpaceType, StorageDataType,
};

/// Byte length of the V1 header: magic + version + V1 fields.
const V1_HEADER_LEN: usize = 19;

fn build_index(storage: StorageDataType, space: SpaceType) -> Index {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
    let index = Index::new(
        space,
        4,
        storage,
        IndexParams {
            m: 8,
            ef_construction: 80,
            ef: 16,
            max_elements: 64,
            seed: 3,
            use_order_preserving_transform: true,
        },
    );
    for i in 0..40u64 {
        let x = i as f32 / 40.0;
        index
            .add_item(&[x, -x, x * 0.5, 0.25], Some(i * 2))
            .unwrap();
    }
    index.mark_deleted(10).unwrap();
    index
}

fn save_bytes(index: &Index) -> bytes::Bytes {
    let mut out = MemoryOutputStream::new();
    index.save(&mut out).unwrap();
    out.into_bytes()
}

#[test]
fn test_round_trip_preserves_configuration() {
    for (storage, space) in [
        (StorageDataType::Float32, SpaceType::Euclidean),
        (StorageDataType::Float8, SpaceType::Cosine),
        (StorageDataType::E4M3, SpaceType::Euclidean),
        (StorageDataType::Float32, SpaceType::InnerProduct),
    ] {
        let index = build_index(storage, space);
        let mut input = MemoryInputStream::new(save_bytes(&index));
        let loaded = Index::load(&mut input).unwrap();

        assert_eq!(loaded.space(), space);
        assert_eq!(loaded.storage_data_type(), storage);
        assert_eq!(loaded.dims(), 4);
        assert_eq!(loaded.len(), index.len());
        assert_eq!(loaded.capacity(), index.capacity());
        assert_eq!(loaded.ef(), index.ef());
        assert!((loaded.max_norm() - index.max_norm()).abs() < 1e-6);

        let mut expected = index.ids();
        expected.sort_unstable();
        let mut got = loaded.ids();
        got.sort_unstable();
        assert_eq!(got, expected, "{storage:?}/{space:?}");
    }
}

#[test]
fn test_save_load_save_is_byte_identical() {
    let index = build_index(StorageDataType::Float8, SpaceType::Cosine);
    let first = save_bytes(&index);

    let mut input = MemoryInputStream::new(first.clone());
    let loaded = Index::load(&mut input).unwrap();
    let second = save_bytes(&loaded);

    assert_eq!(first, second);
}

#[test]
fn test_file_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("index.voy");

    let index = build_index(StorageDataType::Float32, SpaceType::Euclidean);
    index.save_to_path(&path).unwrap();

    let loaded = Index::load_from_path(&path).unwrap();
    assert_eq!(loaded.len(), index.len());
    for i in (0..40u64).map(|i| i * 2) {
        if i == 10 {
            continue;
        }
        let x = i as f32 / 80.0;
        let query = [x, -x, x * 0.5, 0.25];
        assert_eq!(
            index.query(&query, 3, Some(24)).unwrap(),
            loaded.query(&query, 3, Some(24)).unwrap()
        );
    }
}

#[test]
fn test_header_magic_and_enums_on_the_wire() {
    let index = build_index(StorageDataType::E4M3, SpaceType::Cosine);
    let bytes = save_bytes(&index);

    assert_eq!(&bytes[0..4], b"VOYA");
    assert_eq!(&bytes[4..8], &1i32.to_le_bytes()); // version
    assert_eq!(&bytes[8..12], &4i32.to_le_bytes()); // dimensions
    assert_eq!(bytes[12], 2); // Cosine
    assert_eq!(bytes[13], 0x30); // E4M3
}

#[test]
fn test_legacy_body_loads_with_out_of_band_parameters() {
    // A legacy (V0) file is exactly the graph body: strip the V1 header
    // from a fresh save and reload with caller-supplied parameters.
    let index = build_index(StorageDataType::Float32, SpaceType::Euclidean);
    let bytes = save_bytes(&index);
    let body = bytes.slice(V1_HEADER_LEN..);

    let mut input = MemoryInputStream::new(body);
    let loaded = Index::load_with_parameters(
        &mut input,
        SpaceType::Euclidean,
        4,
        StorageDataType::Float32,
    )
    .unwrap();

    assert_eq!(loaded.len(), index.len());
    let query = [0.5, -0.5, 0.25, 0.25];
    assert_eq!(
        index.query(&query, 5, Some(24)).unwrap(),
        loaded.query(&query, 5, Some(24)).unwrap()
    );
}

#[test]
fn test_legacy_body_without_parameters_is_rejected() {
    let index = build_index(StorageDataType::Float32, SpaceType::Euclidean);
    let bytes = save_bytes(&index);
    let body = bytes.slice(V1_HEADER_LEN..);

    let mut input = MemoryInputStream::new(body);
    let err = Index::load(&mut input).unwrap_err();
    assert_eq!(err.code(), "VOYA-009");
    assert!(err.to_string().contains("supply the space"));
}

#[test]
fn test_unsupported_version_error() {
    let index = build_index(StorageDataType::Float32, SpaceType::Euclidean);
    let mut bytes = save_bytes(&index).to_vec();
    bytes[4..8].copy_from_slice(&7i32.to_le_bytes());

    let mut input = MemoryInputStream::new(bytes);
    let err = Index::load(&mut input).unwrap_err();
    assert_eq!(err.code(), "VOYA-010");
    assert!(err.to_string().contains("upgrade the library"));
}

#[test]
fn test_truncated_file_is_rejected() {
    let index = build_index(StorageDataType::Float32, SpaceType::Euclidean);
    let bytes = save_bytes(&index);

    let mut input = MemoryInputStream::new(bytes.slice(..bytes.len() - 40));
    let err = Index::load(&mut input).unwrap_err();
    assert_eq!(err.code(), "VOYA-011");
}

#[test]
fn test_tombstones_survive_round_trip() {
    let index = build_index(StorageDataType::Float32, SpaceType::Euclidean);
    let mut input = MemoryInputStream::new(save_bytes(&index));
    let loaded = Index::load(&mut input).unwrap();

    let x = 10.0 / 80.0;
    let (labels, _) = loaded.query(&[x, -x, x * 0.5, 0.25], 1, Some(24)).unwrap();
    assert_ne!(labels[0], 10, "deleted label resurfaced after reload");

    loaded.unmark_deleted(10).unwrap();
    let (labels, _) = loaded.query(&[x, -x, x * 0.5, 0.25], 1, Some(24)).unwrap();
    assert_eq!(labels[0], 10);
}
