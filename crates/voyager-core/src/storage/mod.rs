//! Storage data types for index vectors.
//!
//! Vectors enter the index as `f32` and are stored as one of three scalar
//! types, trading precision for memory:
//!
//! | Type | Bytes/dim | Scale | Representable inputs |
//! |------|-----------|-------|----------------------|
//! | `Float32` | 4 | 1/1 | any finite f32 |
//! | `Float8` | 1 | 1/127 | \[−128/127, 128/127\] |
//! | `E4M3` | 1 | 1/1 | magnitudes 2⁻⁹ … 448, ±0, NaN |
//!
//! Conversion back to `f32` is precision-preserving: `Float8` dequantizes by
//! dividing the stored integer by 127, and `E4M3` decodes through a 256-entry
//! table matching IEEE rounding semantics. The graph and distance kernels are
//! generic over [`StorageScalar`], so the hot path is monomorphic.

mod e4m3;
mod float8;


pub use e4m3::E4M3;
pub use float8::Float8;

use crate::error::Result;
use serde::{Deserialize, Serialize};

/// Storage scalar type of an index, as carried in the serialization header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StorageDataType {
    /// Signed 8-bit fixed point with scale 1/127.
    Float8,
    /// IEEE 754 single precision.
    Float32,
    /// 8-bit float: 1 sign bit, 4 exponent bits, 3 mantissa bits.
    E4M3,
}

impl StorageDataType {
    /// Wire encoding of this storage type.
    #[must_use]
    pub const fn to_wire(self) -> u8 {
        match self {
            Self::Float8 => 0x10,
            Self::Float32 => 0x20,
            Self::E4M3 => 0x30,
        }
    }

    /// Decodes a wire byte, returning `None` for unknown values.
    #[must_use]
    pub const fn from_wire(byte: u8) -> Option<Self> {
        match byte {
            0x10 => Some(Self::Float8),
            0x20 => Some(Self::Float32),
            0x30 => Some(Self::E4M3),
            _ => None,
        }
    }

    /// Bytes occupied by one scalar of this type.
    #[must_use]
    pub const fn bytes_per_element(self) -> usize {
        match self {
            Self::Float8 | Self::E4M3 => 1,
            Self::Float32 => 4,
        }
    }

    /// Human-readable name, as used in error messages.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Float8 => "Float8",
            Self::Float32 => "Float32",
            Self::E4M3 => "E4M3",
        }
    }
}

mod sealed {
    pub trait Sealed {}
    impl Sealed for f32 {}
    impl Sealed for super::Float8 {}
    impl Sealed for super::E4M3 {}
}

/// A scalar type vectors can be stored as.
///
/// Sealed: the three implementations (`f32`, [`Float8`], [`E4M3`]) are the
/// complete set understood by the serialization format.
pub trait StorageScalar:
    sealed::Sealed + Copy + Default + Send + Sync + std::fmt::Debug + 'static
{
    /// The corresponding [`StorageDataType`].
    const DATA_TYPE: StorageDataType;

    /// Bytes occupied by one scalar on the wire.
    const BYTES: usize;

    /// Numerator of the scale factor applied during conversion.
    const SCALE_NUM: u32;

    /// Denominator of the scale factor applied during conversion.
    const SCALE_DEN: u32;

    /// Width of the band of small negative distances attributed to
    /// floating-point noise rather than corruption.
    const DISTANCE_TOLERANCE: f32;

    /// Converts an `f32` into this storage type.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::ValueOutOfRange`] when the value cannot be
    /// represented.
    fn from_f32(value: f32) -> Result<Self>;

    /// Converts back to `f32`, applying the scale factor.
    fn to_f32(self) -> f32;

    /// Serializes this scalar into `out` (little-endian for multi-byte
    /// types). `out` must be exactly [`StorageScalar::BYTES`] long.
    fn write_bytes(self, out: &mut [u8]);

    /// Deserializes a scalar from `src`, the inverse of
    /// [`StorageScalar::write_bytes`].
    fn read_bytes(src: &[u8]) -> Self;

    /// The scale factor as a float.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    fn scale() -> f32 {
        Self::SCALE_NUM as f32 / Self::SCALE_DEN as f32
    }
}

impl StorageScalar for f32 {
    const DATA_TYPE: StorageDataType = StorageDataType::Float32;
    const BYTES: usize = 4;
    const SCALE_NUM: u32 = 1;
    const SCALE_DEN: u32 = 1;
    const DISTANCE_TOLERANCE: f32 = 1e-5;

    fn from_f32(value: f32) -> Result<Self> {
        Ok(value)
    }

    fn to_f32(self) -> f32 {
        self
    }

    fn write_bytes(self, out: &mut [u8]) {
        out.copy_from_slice(&self.to_le_bytes());
    }

    fn read_bytes(src: &[u8]) -> Self {
        Self::from_le_bytes([src[0], src[1], src[2], src[3]])
    }
}

/// Quantizes a full vector, surfacing the first out-of-range element.
///
/// # Errors
///
/// Returns [`crate::Error::ValueOutOfRange`] for the first element the
/// storage type cannot represent.
pub fn quantize_vector<S: StorageScalar>(vector: &[f32]) -> Result<Vec<S>> {
    vector.iter().map(|&x| S::from_f32(x)).collect()
}

/// Dequantizes a stored vector back to `f32`.
#[must_use]
pub fn dequantize_vector<S: StorageScalar>(vector: &[S]) -> Vec<f32> {
    vector.iter().map(|&x| x.to_f32()).collect()
}
