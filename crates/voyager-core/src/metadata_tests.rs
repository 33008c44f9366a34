//! Tests for the serialization header.

use super::metadata::{Metadata, CURRENT_VERSION};
use crate::error::Error;
use crate::spaces::SpaceType;
use crate::storage::StorageDataType;
use crate::streams::{InputStream, MemoryInputStream, MemoryOutputStream};

fn sample() -> Metadata {
    Metadata {
        num_dimensions: 128,
        space: SpaceType::InnerProduct,
        storage: StorageDataType::Float8,
        max_norm: 5.5,
        use_order_preserving_transform: true,
    }
}

#[test]
fn test_header_round_trip() {
    let meta = sample();
    let mut out = MemoryOutputStream::new();
    meta.write(&mut out).unwrap();

    let mut input = MemoryInputStream::new(out.into_bytes());
    let parsed = Metadata::read(&mut input).unwrap().expect("versioned file");
    assert_eq!(parsed, meta);
}

#[test]
fn test_header_layout_is_byte_stable() {
    let meta = sample();
    let mut out = MemoryOutputStream::new();
    meta.write(&mut out).unwrap();
    let bytes = out.as_slice();

    assert_eq!(&bytes[0..4], b"VOYA");
    assert_eq!(&bytes[4..8], &CURRENT_VERSION.to_le_bytes());
    assert_eq!(&bytes[8..12], &128i32.to_le_bytes());
    assert_eq!(bytes[12], 1); // InnerProduct
    assert_eq!(bytes[13], 0x10); // Float8
    assert_eq!(&bytes[14..18], &5.5f32.to_le_bytes());
    assert_eq!(bytes[18], 1); // transform enabled
    assert_eq!(bytes.len(), 19);
}

#[test]
fn test_legacy_file_returns_none_without_consuming() {
    // A legacy body starts with an 8-byte offset, not the magic.
    let mut input = MemoryInputStream::new(0u64.to_le_bytes().to_vec());
    assert!(Metadata::read(&mut input).unwrap().is_none());
    assert_eq!(input.position(), 0, "V0 detection must not consume bytes");
}

#[test]
fn test_short_file_is_legacy() {
    let mut input = MemoryInputStream::new(vec![0x56u8, 0x4F]);
    assert!(Metadata::read(&mut input).unwrap().is_none());
}

#[test]
fn test_unsupported_version_policy() {
    for (version, expect_upgrade_hint) in [(2i32, true), (19, true), (20, false), (999, false)] {
        let mut bytes = b"VOYA".to_vec();
        bytes.extend_from_slice(&version.to_le_bytes());
        bytes.extend_from_slice(&[0u8; 16]);

        let mut input = MemoryInputStream::new(bytes);
        match Metadata::read(&mut input) {
            Err(err @ Error::UnsupportedVersion { version: v }) => {
                assert_eq!(v, version);
                assert_eq!(
                    err.to_string().contains("upgrade the library"),
                    expect_upgrade_hint,
                    "version {version}"
                );
            }
            other => panic!("expected UnsupportedVersion, got {other:?}"),
        }
    }
}

#[test]
fn test_unknown_enums_are_corruption() {
    let mut bytes = b"VOYA".to_vec();
    bytes.extend_from_slice(&1i32.to_le_bytes());
    bytes.extend_from_slice(&8i32.to_le_bytes());
    bytes.push(7); // bogus space
    bytes.push(0x20);
    bytes.extend_from_slice(&0.0f32.to_le_bytes());
    bytes.push(0);

    let mut input = MemoryInputStream::new(bytes);
    match Metadata::read(&mut input) {
        Err(Error::Corruption(msg)) => assert!(msg.contains("space type")),
        other => panic!("expected Corruption, got {other:?}"),
    }
}
