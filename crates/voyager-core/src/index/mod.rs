//! Untyped index façade.
//!
//! [`Index`] is the sealed sum over the three storage-typed indexes. The
//! constructor and the loaders pick the concrete [`TypedIndex`] once;
//! every operation afterwards dispatches through a single `match`, so the
//! inner search loops stay monomorphic.

mod params;
mod typed;

#[cfg(test)]
mod typed_tests;

pub use params::IndexParams;
pub use typed::TypedIndex;

use crate::error::{Error, Result};
use crate::metadata::Metadata;
use crate::spaces::SpaceType;
use crate::storage::{Float8, StorageDataType, E4M3};
use crate::streams::{FileInputStream, InputStream, OutputStream};
use std::path::Path;

/// An index over one of the three storage types.
pub enum Index {
    /// Vectors stored as `f32`.
    Float32(TypedIndex<f32>),
    /// Vectors stored as fixed-point signed bytes.
    Float8(TypedIndex<Float8>),
    /// Vectors stored as 8-bit E4M3 floats.
    E4M3(TypedIndex<E4M3>),
}

macro_rules! dispatch {
    ($self:expr, $inner:ident => $body:expr) => {
        match $self {
            Index::Float32($inner) => $body,
            Index::Float8($inner) => $body,
            Index::E4M3($inner) => $body,
        }
    };
}

impl Index {
    /// Creates an empty index with the given metric, dimensionality, and
    /// storage type.
    #[must_use]
    pub fn new(
        space: SpaceType,
        dims: usize,
        storage: StorageDataType,
        params: IndexParams,
    ) -> Self {
        tracing::info!(?space, dims, ?storage, "creating index");
        match storage {
            StorageDataType::Float32 => Self::Float32(TypedIndex::new(space, dims, params)),
            StorageDataType::Float8 => Self::Float8(TypedIndex::new(space, dims, params)),
            StorageDataType::E4M3 => Self::E4M3(TypedIndex::new(space, dims, params)),
        }
    }

    /// Loads an index from a stream bearing a versioned header.
    ///
    /// # Errors
    ///
    /// Fails for unsupported versions, corrupted bodies, or legacy files
    /// without a header (load those through
    /// [`Index::load_with_parameters`]).
    pub fn load(input: &mut dyn InputStream) -> Result<Self> {
        match Metadata::read(input)? {
            Some(metadata) => Self::load_typed(&metadata, input),
            None => Err(Error::Corruption(
                "file has no metadata header; to load a legacy index, supply the space, \
                 dimensionality, and storage type"
                    .into(),
            )),
        }
    }

    /// Loads an index from a stream, supplying the parameters legacy files
    /// lack. When a header *is* present it must agree with the supplied
    /// parameters.
    ///
    /// # Errors
    ///
    /// Fails for unsupported versions, corrupted bodies, or a parameter
    /// mismatch with the header.
    pub fn load_with_parameters(
        input: &mut dyn InputStream,
        space: SpaceType,
        dims: usize,
        storage: StorageDataType,
    ) -> Result<Self> {
        match Metadata::read(input)? {
            Some(metadata) => {
                if metadata.space != space
                    || metadata.num_dimensions != dims
                    || metadata.storage != storage
                {
                    return Err(Error::Corruption(format!(
                        "supplied parameters ({space:?}, {dims}, {}) do not match the file \
                         metadata ({:?}, {}, {})",
                        storage.name(),
                        metadata.space,
                        metadata.num_dimensions,
                        metadata.storage.name(),
                    )));
                }
                Self::load_typed(&metadata, input)
            }
            None => {
                tracing::info!(?space, dims, ?storage, "loading legacy index body");
                Ok(match storage {
                    StorageDataType::Float32 => {
                        Self::Float32(TypedIndex::load_legacy_body(space, dims, input)?)
                    }
                    StorageDataType::Float8 => {
                        Self::Float8(TypedIndex::load_legacy_body(space, dims, input)?)
                    }
                    StorageDataType::E4M3 => {
                        Self::E4M3(TypedIndex::load_legacy_body(space, dims, input)?)
                    }
                })
            }
        }
    }

    fn load_typed(metadata: &Metadata, input: &mut dyn InputStream) -> Result<Self> {
        tracing::info!(
            space = ?metadata.space,
            dims = metadata.num_dimensions,
            storage = ?metadata.storage,
            "loading index"
        );
        Ok(match metadata.storage {
            StorageDataType::Float32 => Self::Float32(TypedIndex::load_body(metadata, input)?),
            StorageDataType::Float8 => Self::Float8(TypedIndex::load_body(metadata, input)?),
            StorageDataType::E4M3 => Self::E4M3(TypedIndex::load_body(metadata, input)?),
        })
    }

    /// Loads an index from a file bearing a versioned header.
    ///
    /// # Errors
    ///
    /// See [`Index::load`].
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut input = FileInputStream::open(path)?;
        Self::load(&mut input)
    }

    // ========================================================================
    // Delegated operations
    // ========================================================================

    /// See [`TypedIndex::add_item`].
    ///
    /// # Errors
    ///
    /// See [`TypedIndex::add_item`].
    pub fn add_item(&self, vector: &[f32], id: Option<u64>) -> Result<u64> {
        dispatch!(self, inner => inner.add_item(vector, id))
    }

    /// See [`TypedIndex::add_items`].
    ///
    /// # Errors
    ///
    /// See [`TypedIndex::add_items`].
    pub fn add_items(
        &self,
        vectors: &[Vec<f32>],
        ids: Option<&[u64]>,
        num_threads: Option<usize>,
    ) -> Result<Vec<u64>> {
        dispatch!(self, inner => inner.add_items(vectors, ids, num_threads))
    }

    /// See [`TypedIndex::query`].
    ///
    /// # Errors
    ///
    /// See [`TypedIndex::query`].
    pub fn query(&self, vector: &[f32], k: usize, ef: Option<usize>) -> Result<(Vec<u64>, Vec<f32>)> {
        dispatch!(self, inner => inner.query(vector, k, ef))
    }

    /// See [`TypedIndex::query_batch`].
    ///
    /// # Errors
    ///
    /// See [`TypedIndex::query_batch`].
    pub fn query_batch(
        &self,
        queries: &[Vec<f32>],
        k: usize,
        num_threads: Option<usize>,
        ef: Option<usize>,
    ) -> Result<(Vec<Vec<u64>>, Vec<Vec<f32>>)> {
        dispatch!(self, inner => inner.query_batch(queries, k, num_threads, ef))
    }

    /// See [`TypedIndex::get_vector`].
    ///
    /// # Errors
    ///
    /// See [`TypedIndex::get_vector`].
    pub fn get_vector(&self, label: u64) -> Result<Vec<f32>> {
        dispatch!(self, inner => inner.get_vector(label))
    }

    /// See [`TypedIndex::get_distance`].
    ///
    /// # Errors
    ///
    /// See [`TypedIndex::get_distance`].
    pub fn get_distance(&self, a: &[f32], b: &[f32]) -> Result<f32> {
        dispatch!(self, inner => inner.get_distance(a, b))
    }

    /// See [`TypedIndex::mark_deleted`].
    ///
    /// # Errors
    ///
    /// See [`TypedIndex::mark_deleted`].
    pub fn mark_deleted(&self, label: u64) -> Result<()> {
        dispatch!(self, inner => inner.mark_deleted(label))
    }

    /// See [`TypedIndex::unmark_deleted`].
    ///
    /// # Errors
    ///
    /// See [`TypedIndex::unmark_deleted`].
    pub fn unmark_deleted(&self, label: u64) -> Result<()> {
        dispatch!(self, inner => inner.unmark_deleted(label))
    }

    /// See [`TypedIndex::resize`].
    ///
    /// # Errors
    ///
    /// See [`TypedIndex::resize`].
    pub fn resize(&self, new_size: usize) -> Result<()> {
        dispatch!(self, inner => inner.resize(new_size))
    }

    /// See [`TypedIndex::save`].
    ///
    /// # Errors
    ///
    /// See [`TypedIndex::save`].
    pub fn save(&self, out: &mut dyn OutputStream) -> Result<()> {
        dispatch!(self, inner => inner.save(out))
    }

    /// See [`TypedIndex::save_to_path`].
    ///
    /// # Errors
    ///
    /// See [`TypedIndex::save_to_path`].
    pub fn save_to_path<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        dispatch!(self, inner => inner.save_to_path(path))
    }

    /// Number of elements, tombstoned included.
    #[must_use]
    pub fn len(&self) -> usize {
        dispatch!(self, inner => inner.len())
    }

    /// Whether the index holds no elements.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        dispatch!(self, inner => inner.is_empty())
    }

    /// Current slot capacity.
    #[must_use]
    pub fn capacity(&self) -> usize {
        dispatch!(self, inner => inner.capacity())
    }

    /// External vector dimensionality.
    #[must_use]
    pub fn dims(&self) -> usize {
        dispatch!(self, inner => inner.dims())
    }

    /// The index's distance metric.
    #[must_use]
    pub fn space(&self) -> SpaceType {
        dispatch!(self, inner => inner.space())
    }

    /// The storage scalar type vectors are kept as.
    #[must_use]
    pub fn storage_data_type(&self) -> StorageDataType {
        dispatch!(self, inner => inner.storage_data_type())
    }

    /// Default search depth.
    #[must_use]
    pub fn ef(&self) -> usize {
        dispatch!(self, inner => inner.ef())
    }

    /// Replaces the default search depth.
    pub fn set_ef(&self, ef: usize) {
        dispatch!(self, inner => inner.set_ef(ef));
    }

    /// Whether `label` is present.
    #[must_use]
    pub fn contains(&self, label: u64) -> bool {
        dispatch!(self, inner => inner.contains(label))
    }

    /// All labels, in arbitrary order.
    #[must_use]
    pub fn ids(&self) -> Vec<u64> {
        dispatch!(self, inner => inner.ids())
    }

    /// Largest input norm observed so far.
    #[must_use]
    pub fn max_norm(&self) -> f32 {
        dispatch!(self, inner => inner.max_norm())
    }
}

impl std::fmt::Debug for Index {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Index")
            .field("space", &self.space())
            .field("storage", &self.storage_data_type())
            .field("dims", &self.dims())
            .field("len", &self.len())
            .finish_non_exhaustive()
    }
}
