//! Error types for the Voyager index core.
//!
//! This module provides a unified error type for all index operations,
//! designed for clean exposure through the language-binding layers.

use thiserror::Error;

/// Result type alias for Voyager operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during index construction, mutation, query, or I/O.
///
/// Each variant includes a descriptive error message suitable for end-users.
/// Error codes follow the pattern `VOYA-XXX` for easy debugging.
#[derive(Error, Debug)]
pub enum Error {
    /// Vector or matrix shape does not match the index dimensionality (VOYA-001).
    #[error("[VOYA-001] Vector dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Dimensionality the index was constructed with.
        expected: usize,
        /// Dimensionality of the offending input.
        actual: usize,
    },

    /// Input scalar cannot be represented by the chosen storage type (VOYA-002).
    #[error(
        "[VOYA-002] Value {value} cannot be stored as {storage}: \
         legal range is [{min}, {max}]"
    )]
    ValueOutOfRange {
        /// The offending input value.
        value: f32,
        /// Name of the storage data type.
        storage: &'static str,
        /// Smallest legal input.
        min: f32,
        /// Largest legal input.
        max: f32,
    },

    /// Batch label list length does not match the batch vector count (VOYA-003).
    #[error("[VOYA-003] Label count mismatch: {labels} labels for {vectors} vectors")]
    LabelMismatch {
        /// Number of labels provided.
        labels: usize,
        /// Number of vectors provided.
        vectors: usize,
    },

    /// Lookup or delete of a label that is not present in the index (VOYA-004).
    #[error("[VOYA-004] Label {0} is not present in this index")]
    UnknownLabel(u64),

    /// Slot allocation failed because the element array is full (VOYA-005).
    ///
    /// The typed index façade catches this internally, resizes, and retries;
    /// it only surfaces to callers driving the graph layer directly.
    #[error("[VOYA-005] Index is full: all {capacity} slots are in use")]
    IndexFull {
        /// Capacity at the time the allocation failed.
        capacity: usize,
    },

    /// Resize requested a capacity below the current one (VOYA-006).
    ///
    /// Also produced by the resize-race loop when another thread grew the
    /// index past the requested target first.
    #[error("[VOYA-006] Index cannot be shrunk: requested {requested}, current capacity {current}")]
    IndexCannotBeShrunk {
        /// Requested capacity.
        requested: usize,
        /// Capacity at the time of the request.
        current: usize,
    },

    /// Query requested a search depth smaller than the result count (VOYA-007).
    #[error("[VOYA-007] ef ({ef}) must be at least k ({k})")]
    EfTooSmall {
        /// Requested search depth.
        ef: usize,
        /// Requested result count.
        k: usize,
    },

    /// Fewer matching elements than requested results (VOYA-008).
    #[error(
        "[VOYA-008] Not enough elements to return {requested} results: \
         only {available} were found"
    )]
    NotEnoughElements {
        /// Requested result count.
        requested: usize,
        /// Number of results actually available.
        available: usize,
    },

    /// Broken invariant detected in the index (VOYA-009).
    ///
    /// Raised for distances below the tolerance band, mismatched on-disk
    /// fields, or neighbor lists referencing nonexistent slots. The index
    /// should be considered unusable and rebuilt from source vectors.
    #[error("[VOYA-009] Index corrupted: {0}")]
    Corruption(String),

    /// On-disk version not in the supported set (VOYA-010).
    #[error("[VOYA-010] Unsupported serialization version {version}: {}", version_hint(.version))]
    UnsupportedVersion {
        /// Version field read from the file header.
        version: i32,
    },

    /// Stream read or write moved fewer bytes than required (VOYA-011).
    #[error("[VOYA-011] Stream I/O failure: expected {expected} bytes, got {actual}")]
    StreamIo {
        /// Number of bytes requested.
        expected: usize,
        /// Number of bytes actually transferred.
        actual: usize,
    },

    /// Underlying I/O error (VOYA-012).
    #[error("[VOYA-012] IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Returns the error code (e.g., "VOYA-001").
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::DimensionMismatch { .. } => "VOYA-001",
            Self::ValueOutOfRange { .. } => "VOYA-002",
            Self::LabelMismatch { .. } => "VOYA-003",
            Self::UnknownLabel(_) => "VOYA-004",
            Self::IndexFull { .. } => "VOYA-005",
            Self::IndexCannotBeShrunk { .. } => "VOYA-006",
            Self::EfTooSmall { .. } => "VOYA-007",
            Self::NotEnoughElements { .. } => "VOYA-008",
            Self::Corruption(_) => "VOYA-009",
            Self::UnsupportedVersion { .. } => "VOYA-010",
            Self::StreamIo { .. } => "VOYA-011",
            Self::Io(_) => "VOYA-012",
        }
    }

    /// Returns true if this error is recoverable by the caller.
    ///
    /// Non-recoverable errors indicate a damaged index or file.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        !matches!(
            self,
            Self::Corruption(_) | Self::UnsupportedVersion { .. } | Self::StreamIo { .. }
        )
    }

    /// Builds a [`Error::Corruption`] annotated with the offending label.
    pub(crate) fn corruption_at(label: u64, detail: impl std::fmt::Display) -> Self {
        Self::Corruption(format!("label {label}: {detail}"))
    }
}

/// Versions below 20 are plausible future formats; anything higher is far
/// more likely to be a damaged file than a real release.
fn version_hint(version: &i32) -> &'static str {
    if *version < 20 {
        "this index may have been created with a newer version of the \
         library; upgrade the library to load it"
    } else {
        "the file is likely corrupted"
    }
}
