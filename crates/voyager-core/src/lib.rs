//! # Voyager core
//!
//! An in-memory approximate nearest-neighbor index over fixed-dimensionality
//! float vectors, built on a Hierarchical Navigable Small World graph.
//!
//! Clients insert `(id, vector)` pairs and retrieve the *k* closest ids to a
//! query vector under Euclidean, inner-product, or cosine distance. Vectors
//! may be stored as `f32`, fixed-point [`Float8`], or 8-bit [`E4M3`] floats,
//! and every index serializes to a versioned, byte-stable format shared
//! across the language bindings.
//!
//! ## Features
//!
//! - **Fast**: HNSW traversal with SIMD distance kernels selected per CPU
//!   and dimensionality
//! - **Compact**: optional 8-bit storage types cut memory 4× with bounded
//!   precision loss
//! - **Concurrent**: parallel insertion and querying over one shared index
//!
//! ## Quick start
//!
//! ```rust
//! use voyager_core::{Index, IndexParams, SpaceType, StorageDataType};
//!
//! let index = Index::new(
//!     SpaceType::Euclidean,
//!     2,
//!     StorageDataType::Float32,
//!     IndexParams::default(),
//! );
//!
//! index.add_item(&[1.0, 2.0], Some(7))?;
//! index.add_item(&[2.0, 3.0], Some(42))?;
//!
//! let (labels, distances) = index.query(&[1.0, 2.0], 1, None)?;
//! assert_eq!(labels, vec![7]);
//! assert_eq!(distances, vec![0.0]);
//! # Ok::<(), voyager_core::Error>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod error;
pub mod index;
pub mod spaces;
pub mod storage;
pub mod streams;

mod hnsw;
mod metadata;
mod visited;

#[cfg(test)]
mod metadata_tests;

pub use error::{Error, Result};
pub use index::{Index, IndexParams, TypedIndex};
pub use spaces::SpaceType;
pub use storage::{Float8, StorageDataType, E4M3};
pub use streams::{
    FileInputStream, FileOutputStream, InputStream, MemoryInputStream, MemoryOutputStream,
    OutputStream,
};
