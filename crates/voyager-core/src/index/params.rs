//! Index construction parameters.

use serde::{Deserialize, Serialize};

/// Tunable parameters for index construction.
///
/// The defaults match the values the language bindings expose; raise `m`
/// and `ef_construction` for better recall at the cost of memory and
/// indexing time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexParams {
    /// Number of bidirectional links per element on layers ≥ 1; layer 0
    /// holds `2·m`.
    pub m: usize,
    /// Size of the dynamic candidate list during construction.
    /// Higher = better recall, slower indexing.
    pub ef_construction: usize,
    /// Default search depth, used when a query does not override it.
    pub ef: usize,
    /// Initial slot capacity. The index grows automatically when full, so
    /// this is a pre-allocation hint, not a limit.
    pub max_elements: usize,
    /// Seed for the level-draw PRNG; fixed seeds make single-threaded
    /// construction deterministic.
    pub seed: u64,
    /// Whether inner-product spaces augment vectors with the
    /// order-preserving extra coordinate. Ignored for other spaces.
    pub use_order_preserving_transform: bool,
}

impl Default for IndexParams {
    fn default() -> Self {
        Self {
            m: 12,
            ef_construction: 200,
            ef: 10,
            max_elements: 1,
            seed: 1,
            use_order_preserving_transform: true,
        }
    }
}
