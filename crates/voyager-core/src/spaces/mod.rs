//! Distance spaces and their per-storage kernels.
//!
//! A [`Space`] binds a metric to a concrete distance kernel at construction
//! time. Kernel selection is a small dispatch table keyed by the storage
//! scalar, the metric, and the vector dimensionality (divisibility by the
//! SIMD widths decides between exact and tail-handling variants), so the hot
//! path is a single indirect call with no per-call branching.
//!
//! Metrics:
//!
//! - **Euclidean**: squared L2, `Σ (a[i]-b[i])²`.
//! - **Inner product**: `1 − Σ a[i]·b[i]`, scale²-adjusted for quantized
//!   storage.
//! - **Cosine**: the index normalizes vectors before storage, so the stored
//!   form is inner-product distance over unit vectors.

mod quantized;
pub(crate) mod simd;

#[cfg(test)]
mod simd_tests;

use crate::storage::{Float8, StorageScalar, E4M3};
use serde::{Deserialize, Serialize};

/// Distance metric of an index, as carried in the serialization header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SpaceType {
    /// Squared L2 distance.
    Euclidean,
    /// Inner-product distance (`1 − a·b`).
    InnerProduct,
    /// Cosine distance; vectors are normalized on the input path.
    Cosine,
}

impl SpaceType {
    /// Wire encoding of this space.
    #[must_use]
    pub const fn to_wire(self) -> u8 {
        match self {
            Self::Euclidean => 0,
            Self::InnerProduct => 1,
            Self::Cosine => 2,
        }
    }

    /// Decodes a wire byte, returning `None` for unknown values.
    #[must_use]
    pub const fn from_wire(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(Self::Euclidean),
            1 => Some(Self::InnerProduct),
            2 => Some(Self::Cosine),
            _ => None,
        }
    }
}

/// A distance kernel over storage scalars.
pub type DistanceFn<S> = fn(&[S], &[S]) -> f32;

/// Storage scalars that have distance kernels.
///
/// Implemented for the three storage types; each picks its kernel variant
/// from the metric and the dimensionality.
pub trait DistanceKernels: StorageScalar {
    /// Selects the kernel for `space` at dimensionality `dims`.
    fn select_kernel(space: SpaceType, dims: usize) -> DistanceFn<Self>;
}

impl DistanceKernels for f32 {
    fn select_kernel(space: SpaceType, dims: usize) -> DistanceFn<Self> {
        match space {
            SpaceType::Euclidean => simd::select_euclidean(dims),
            SpaceType::InnerProduct | SpaceType::Cosine => simd::select_inner_product(dims),
        }
    }
}

impl DistanceKernels for Float8 {
    fn select_kernel(space: SpaceType, _dims: usize) -> DistanceFn<Self> {
        match space {
            SpaceType::Euclidean => quantized::euclidean_float8,
            SpaceType::InnerProduct | SpaceType::Cosine => quantized::inner_product_float8,
        }
    }
}

impl DistanceKernels for E4M3 {
    fn select_kernel(space: SpaceType, _dims: usize) -> DistanceFn<Self> {
        match space {
            SpaceType::Euclidean => quantized::euclidean_e4m3,
            SpaceType::InnerProduct | SpaceType::Cosine => quantized::inner_product_e4m3,
        }
    }
}

/// A metric bound to a concrete kernel for one storage type and
/// dimensionality.
#[derive(Clone, Copy)]
pub struct Space<S: DistanceKernels> {
    space_type: SpaceType,
    dims: usize,
    kernel: DistanceFn<S>,
}

impl<S: DistanceKernels> Space<S> {
    /// Builds the space, selecting the kernel once.
    #[must_use]
    pub fn new(space_type: SpaceType, dims: usize) -> Self {
        Self {
            space_type,
            dims,
            kernel: S::select_kernel(space_type, dims),
        }
    }

    /// The metric this space computes.
    #[must_use]
    pub const fn space_type(&self) -> SpaceType {
        self.space_type
    }

    /// Storage dimensionality (`D'`, including any augmented coordinate).
    #[must_use]
    pub const fn dims(&self) -> usize {
        self.dims
    }

    /// Distance between two stored vectors.
    #[inline]
    #[must_use]
    pub fn distance(&self, a: &[S], b: &[S]) -> f32 {
        debug_assert_eq!(a.len(), self.dims);
        debug_assert_eq!(b.len(), self.dims);
        (self.kernel)(a, b)
    }
}

impl<S: DistanceKernels> std::fmt::Debug for Space<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Space")
            .field("space_type", &self.space_type)
            .field("dims", &self.dims)
            .finish_non_exhaustive()
    }
}
