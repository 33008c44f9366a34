//! Typed index façade over the graph core.
//!
//! `TypedIndex<S>` binds a space to one storage type so the whole hot path
//! is monomorphic. It owns the metric-specific input transforms (cosine
//! normalization, the order-preserving inner-product augmentation),
//! quantization, batch parallelism, and the grow-on-full retry loop.

use super::params::IndexParams;
use crate::error::{Error, Result};
use crate::hnsw::HnswGraph;
use crate::metadata::Metadata;
use crate::spaces::{DistanceKernels, Space, SpaceType};
use crate::storage::{dequantize_vector, quantize_vector, StorageDataType};
use crate::streams::{FileOutputStream, InputStream, OutputStream};
use rayon::prelude::*;
use std::path::Path;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

/// Epsilon added to norms before cosine normalization, so zero vectors
/// divide cleanly instead of producing NaN.
const NORMALIZATION_EPSILON: f32 = 1e-30;

/// Batches at or below `4 × threads` run single-threaded: pool setup costs
/// more than it saves.
const PARALLEL_BATCH_FACTOR: usize = 4;

/// An index bound to one storage type.
pub struct TypedIndex<S: DistanceKernels> {
    graph: HnswGraph<S>,
    space_type: SpaceType,
    /// External dimensionality `D`; storage may carry one more coordinate.
    dims: usize,
    /// Whether inner-product inputs get the order-preserving augmentation.
    use_transform: bool,
    /// Largest observed input norm, as f32 bits under a compare-exchange
    /// maximum.
    max_norm_bits: AtomicU32,
    /// Next auto-assigned label.
    next_label: AtomicU64,
}

impl<S: DistanceKernels> TypedIndex<S> {
    /// Creates an empty index.
    #[must_use]
    pub fn new(space_type: SpaceType, dims: usize, params: IndexParams) -> Self {
        let use_transform =
            space_type == SpaceType::InnerProduct && params.use_order_preserving_transform;
        let storage_dims = dims + usize::from(use_transform);
        Self {
            graph: HnswGraph::new(
                space_type,
                storage_dims,
                params.m,
                params.ef_construction,
                params.seed,
                params.max_elements.max(1),
                params.ef,
            ),
            space_type,
            dims,
            use_transform,
            max_norm_bits: AtomicU32::new(0.0f32.to_bits()),
            next_label: AtomicU64::new(0),
        }
    }

    // ========================================================================
    // Introspection
    // ========================================================================

    /// Number of elements, tombstoned included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.graph.len()
    }

    /// Whether the index holds no elements.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.graph.is_empty()
    }

    /// Current slot capacity.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.graph.capacity()
    }

    /// External vector dimensionality.
    #[must_use]
    pub const fn dims(&self) -> usize {
        self.dims
    }

    /// The index's distance metric.
    #[must_use]
    pub const fn space(&self) -> SpaceType {
        self.space_type
    }

    /// The storage scalar type vectors are kept as.
    #[must_use]
    pub fn storage_data_type(&self) -> StorageDataType {
        S::DATA_TYPE
    }

    /// Default search depth.
    #[must_use]
    pub fn ef(&self) -> usize {
        self.graph.ef()
    }

    /// Replaces the default search depth.
    pub fn set_ef(&self, ef: usize) {
        self.graph.set_ef(ef);
    }

    /// Graph connectivity parameter `M`.
    #[must_use]
    pub fn m(&self) -> usize {
        self.graph.m()
    }

    /// Construction-time search depth.
    #[must_use]
    pub fn ef_construction(&self) -> usize {
        self.graph.ef_construction()
    }

    /// Largest input norm observed so far.
    #[must_use]
    pub fn max_norm(&self) -> f32 {
        f32::from_bits(self.max_norm_bits.load(Ordering::Acquire))
    }

    /// Whether the order-preserving transform is active.
    #[must_use]
    pub const fn uses_order_preserving_transform(&self) -> bool {
        self.use_transform
    }

    /// Whether any element has ever been tombstoned.
    #[must_use]
    pub fn has_deletions(&self) -> bool {
        self.graph.has_deletions()
    }

    /// Whether `label` is present.
    #[must_use]
    pub fn contains(&self, label: u64) -> bool {
        self.graph.contains_label(label)
    }

    /// All labels, in arbitrary order.
    #[must_use]
    pub fn ids(&self) -> Vec<u64> {
        self.graph.labels()
    }

    // ========================================================================
    // Input path
    // ========================================================================

    fn check_dims(&self, vector: &[f32]) -> Result<()> {
        if vector.len() == self.dims {
            Ok(())
        } else {
            Err(Error::DimensionMismatch {
                expected: self.dims,
                actual: vector.len(),
            })
        }
    }

    fn l2_norm(vector: &[f32]) -> f32 {
        vector.iter().map(|&x| x * x).sum::<f32>().sqrt()
    }

    fn normalized(vector: &[f32]) -> Vec<f32> {
        let inv = 1.0 / (Self::l2_norm(vector) + NORMALIZATION_EPSILON);
        vector.iter().map(|&x| x * inv).collect()
    }

    /// Raises the running maximum norm, returning the post-update value.
    fn update_max_norm(&self, norm: f32) -> f32 {
        let mut current = self.max_norm_bits.load(Ordering::Acquire);
        loop {
            if norm <= f32::from_bits(current) {
                return f32::from_bits(current);
            }
            match self.max_norm_bits.compare_exchange_weak(
                current,
                norm.to_bits(),
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return norm,
                Err(observed) => current = observed,
            }
        }
    }

    /// Transforms and quantizes a vector for storage.
    fn prepare_stored(&self, vector: &[f32]) -> Result<Vec<S>> {
        self.check_dims(vector)?;
        match self.space_type {
            SpaceType::Cosine => quantize_vector(&Self::normalized(vector)),
            SpaceType::InnerProduct if self.use_transform => {
                let norm = Self::l2_norm(vector);
                let max_norm = self.update_max_norm(norm);
                // The augmented coordinate turns maximum-inner-product
                // ranking between stored vectors into nearest-neighbor
                // ranking on the augmented space.
                let extra_sq = max_norm.mul_add(max_norm, -(norm * norm));
                let extra = if extra_sq > 0.0 { extra_sq.sqrt() } else { 0.0 };
                let mut stored = quantize_vector::<S>(vector)?;
                stored.push(S::from_f32(extra)?);
                Ok(stored)
            }
            _ => quantize_vector(vector),
        }
    }

    /// Transforms and quantizes a query vector.
    fn prepare_query(&self, vector: &[f32]) -> Result<Vec<S>> {
        self.check_dims(vector)?;
        match self.space_type {
            SpaceType::Cosine => quantize_vector(&Self::normalized(vector)),
            SpaceType::InnerProduct if self.use_transform => {
                // Queries carry a zero extra coordinate: their inner product
                // against any stored vector is unchanged.
                let mut stored = quantize_vector::<S>(vector)?;
                stored.push(S::from_f32(0.0)?);
                Ok(stored)
            }
            _ => quantize_vector(vector),
        }
    }

    // ========================================================================
    // Mutation
    // ========================================================================

    /// Inserts one vector, auto-assigning a label when `id` is `None`.
    ///
    /// # Errors
    ///
    /// Fails on dimension mismatch or out-of-range values for the storage
    /// type. A full index is grown and retried internally.
    pub fn add_item(&self, vector: &[f32], id: Option<u64>) -> Result<u64> {
        let label = match id {
            Some(label) => {
                self.observe_label(label);
                label
            }
            None => self.next_label.fetch_add(1, Ordering::Relaxed),
        };
        let stored = self.prepare_stored(vector)?;
        self.insert_with_retry(stored, label)?;
        Ok(label)
    }

    /// Inserts a batch, optionally parallel.
    ///
    /// `ids` must match `vectors` in length when given; omitted ids are
    /// auto-assigned. `num_threads` of `None` or `Some(0)` uses all cores;
    /// batches no larger than `4 × threads` run single-threaded.
    ///
    /// # Errors
    ///
    /// Fails on label-count mismatch, dimension mismatch, or out-of-range
    /// values; the first failing element aborts the batch.
    pub fn add_items(
        &self,
        vectors: &[Vec<f32>],
        ids: Option<&[u64]>,
        num_threads: Option<usize>,
    ) -> Result<Vec<u64>> {
        if let Some(ids) = ids {
            if ids.len() != vectors.len() {
                return Err(Error::LabelMismatch {
                    labels: ids.len(),
                    vectors: vectors.len(),
                });
            }
        }
        let labels: Vec<u64> = match ids {
            Some(ids) => {
                for &id in ids {
                    self.observe_label(id);
                }
                ids.to_vec()
            }
            None => vectors
                .iter()
                .map(|_| self.next_label.fetch_add(1, Ordering::Relaxed))
                .collect(),
        };

        // Pre-grow once for the whole batch rather than discovering the
        // shortfall one IndexFull at a time.
        self.ensure_capacity(self.graph.len() + vectors.len())?;

        let threads = resolve_threads(num_threads);
        if threads <= 1 || vectors.len() <= threads * PARALLEL_BATCH_FACTOR {
            for (vector, &label) in vectors.iter().zip(labels.iter()) {
                let stored = self.prepare_stored(vector)?;
                self.insert_with_retry(stored, label)?;
            }
        } else {
            let pool = build_pool(threads)?;
            pool.install(|| {
                vectors
                    .par_iter()
                    .zip(labels.par_iter())
                    .try_for_each(|(vector, &label)| {
                        let stored = self.prepare_stored(vector)?;
                        self.insert_with_retry(stored, label)
                    })
            })?;
        }
        Ok(labels)
    }

    /// Tracks externally assigned labels so auto-assignment never collides.
    fn observe_label(&self, label: u64) {
        self.next_label
            .fetch_max(label.saturating_add(1), Ordering::Relaxed);
    }

    /// Inserts, growing the index and retrying on [`Error::IndexFull`].
    fn insert_with_retry(&self, stored: Vec<S>, label: u64) -> Result<()> {
        loop {
            match self.graph.insert(stored.clone(), label) {
                Err(Error::IndexFull { capacity }) => {
                    tracing::debug!(capacity, label, "index full; resizing and retrying");
                    self.ensure_capacity(capacity + 1)?;
                }
                other => return other,
            }
        }
    }

    /// Grows the index to at least `needed` slots, tolerating resize races.
    fn ensure_capacity(&self, needed: usize) -> Result<()> {
        loop {
            let current = self.graph.capacity();
            if current >= needed {
                return Ok(());
            }
            let target = needed.max(current.saturating_mul(2));
            match self.graph.resize(target) {
                Ok(()) => return Ok(()),
                // Another thread resized behind our back; re-read the
                // capacity and aim higher.
                Err(Error::IndexCannotBeShrunk { .. }) => {}
                Err(err) => return Err(err),
            }
        }
    }

    /// Manually grows the index.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IndexCannotBeShrunk`] when `new_size` is below the
    /// current capacity.
    pub fn resize(&self, new_size: usize) -> Result<()> {
        self.graph.resize(new_size)
    }

    /// Tombstones `label`.
    ///
    /// The vector stays in the graph as a transit node; recall degrades
    /// under heavy deletion and the only clean removal is a rebuild.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownLabel`] when `label` is absent.
    pub fn mark_deleted(&self, label: u64) -> Result<()> {
        self.graph.mark_deleted(label)
    }

    /// Clears the tombstone on `label`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownLabel`] when `label` is absent.
    pub fn unmark_deleted(&self, label: u64) -> Result<()> {
        self.graph.unmark_deleted(label)
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Returns the `k` nearest labels and their distances, ascending.
    ///
    /// `ef` overrides the default search depth and must be at least `k`.
    ///
    /// # Errors
    ///
    /// Fails on dimension mismatch, `ef < k`, or fewer than `k` reachable
    /// live elements.
    pub fn query(&self, vector: &[f32], k: usize, ef: Option<usize>) -> Result<(Vec<u64>, Vec<f32>)> {
        let stored = self.prepare_query(vector)?;
        let ef = ef.unwrap_or_else(|| self.graph.ef().max(k));
        let results = self.graph.search(&stored, k, ef)?;
        let mut labels = Vec::with_capacity(results.len());
        let mut distances = Vec::with_capacity(results.len());
        for (distance, label) in results {
            labels.push(label);
            distances.push(distance);
        }
        Ok((labels, distances))
    }

    /// Batch query, optionally parallel; same contract as
    /// [`TypedIndex::query`] per row.
    ///
    /// # Errors
    ///
    /// The first failing row aborts the batch.
    pub fn query_batch(
        &self,
        queries: &[Vec<f32>],
        k: usize,
        num_threads: Option<usize>,
        ef: Option<usize>,
    ) -> Result<(Vec<Vec<u64>>, Vec<Vec<f32>>)> {
        let threads = resolve_threads(num_threads);
        let rows: Vec<(Vec<u64>, Vec<f32>)> =
            if threads <= 1 || queries.len() <= threads * PARALLEL_BATCH_FACTOR {
                queries
                    .iter()
                    .map(|q| self.query(q, k, ef))
                    .collect::<Result<_>>()?
            } else {
                let pool = build_pool(threads)?;
                pool.install(|| {
                    queries
                        .par_iter()
                        .map(|q| self.query(q, k, ef))
                        .collect::<Result<_>>()
                })?
            };

        let mut labels = Vec::with_capacity(rows.len());
        let mut distances = Vec::with_capacity(rows.len());
        for (row_labels, row_distances) in rows {
            labels.push(row_labels);
            distances.push(row_distances);
        }
        Ok((labels, distances))
    }

    /// Dequantized stored vector for `label`.
    ///
    /// For cosine spaces this is the *normalized* vector, which differs
    /// from the input unless the input was already unit length. The
    /// order-preserving extra coordinate is stripped.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownLabel`] when `label` is absent.
    pub fn get_vector(&self, label: u64) -> Result<Vec<f32>> {
        let stored = self.graph.vector(label)?;
        let mut vector = dequantize_vector(&stored);
        vector.truncate(self.dims);
        Ok(vector)
    }

    /// Distance between two caller vectors under this index's metric,
    /// after the metric's input transform but before quantization.
    ///
    /// # Errors
    ///
    /// Fails on dimension mismatch.
    pub fn get_distance(&self, a: &[f32], b: &[f32]) -> Result<f32> {
        self.check_dims(a)?;
        self.check_dims(b)?;
        let space = Space::<f32>::new(self.space_type, self.dims);
        let distance = if self.space_type == SpaceType::Cosine {
            space.distance(&Self::normalized(a), &Self::normalized(b))
        } else {
            space.distance(a, b)
        };
        Ok(distance)
    }

    // ========================================================================
    // Persistence
    // ========================================================================

    /// Writes the versioned header and graph body.
    ///
    /// # Errors
    ///
    /// Surfaces stream failures.
    pub fn save(&self, out: &mut dyn OutputStream) -> Result<()> {
        let metadata = Metadata {
            num_dimensions: self.dims,
            space: self.space_type,
            storage: S::DATA_TYPE,
            max_norm: self.max_norm(),
            use_order_preserving_transform: self.use_transform,
        };
        metadata.write(out)?;
        self.graph.save(out)
    }

    /// Saves to a file path.
    ///
    /// # Errors
    ///
    /// Surfaces I/O failures.
    pub fn save_to_path<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let mut out = FileOutputStream::create(path)?;
        self.save(&mut out)?;
        out.flush()
    }

    /// Rebuilds a typed index from a parsed V1 header and the graph body
    /// that follows it on the stream.
    pub(super) fn load_body(metadata: &Metadata, input: &mut dyn InputStream) -> Result<Self> {
        debug_assert_eq!(metadata.storage, S::DATA_TYPE);
        let use_transform =
            metadata.space == SpaceType::InnerProduct && metadata.use_order_preserving_transform;
        let storage_dims = metadata.num_dimensions + usize::from(use_transform);
        let graph = HnswGraph::load(metadata.space, storage_dims, input)?;
        let next_label = graph
            .labels()
            .into_iter()
            .max()
            .map_or(0, |label| label.saturating_add(1));
        Ok(Self {
            graph,
            space_type: metadata.space,
            dims: metadata.num_dimensions,
            use_transform,
            max_norm_bits: AtomicU32::new(metadata.max_norm.to_bits()),
            next_label: AtomicU64::new(next_label),
        })
    }

    /// Rebuilds a typed index from a legacy V0 body: no header, so the
    /// space and dimensionality come from the caller and the transform is
    /// off (it post-dates the legacy format).
    pub(super) fn load_legacy_body(
        space_type: SpaceType,
        dims: usize,
        input: &mut dyn InputStream,
    ) -> Result<Self> {
        let graph = HnswGraph::load(space_type, dims, input)?;
        let next_label = graph
            .labels()
            .into_iter()
            .max()
            .map_or(0, |label| label.saturating_add(1));
        Ok(Self {
            graph,
            space_type,
            dims,
            use_transform: false,
            max_norm_bits: AtomicU32::new(0.0f32.to_bits()),
            next_label: AtomicU64::new(next_label),
        })
    }
}

/// Resolves a thread-count request against the machine.
fn resolve_threads(num_threads: Option<usize>) -> usize {
    match num_threads {
        Some(n) if n > 0 => n,
        _ => std::thread::available_parallelism().map_or(1, std::num::NonZeroUsize::get),
    }
}

/// Builds a dedicated rayon pool for one batch call.
fn build_pool(threads: usize) -> Result<rayon::ThreadPool> {
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build()
        .map_err(|err| Error::Io(std::io::Error::other(err)))
}
