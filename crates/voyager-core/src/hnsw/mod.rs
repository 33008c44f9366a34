//! HNSW (Hierarchical Navigable Small World) graph core.
//!
//! This module owns the multi-layer graph: the element arena, insertion with
//! heuristic neighbor pruning, layered best-first search, tombstone
//! deletion, grow-only resizing, and the byte-stable graph body
//! serialization. It operates on already-quantized storage vectors; the
//! typed index façade in [`crate::index`] owns the input/output transforms.
//!
//! # References
//!
//! - Paper: "Efficient and robust approximate nearest neighbor search using
//!   Hierarchical Navigable Small World graphs" (Malkov & Yashunin, 2016)
//! - arXiv: <https://arxiv.org/abs/1603.09320>

mod graph;
mod serialize;


pub(crate) use graph::HnswGraph;
