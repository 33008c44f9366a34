//! HNSW graph structure and algorithms.
//!
//! The graph is an arena of element slots preallocated to `max_elements`.
//! Slot allocation is a compare-exchange on the element counter, so inserts
//! claim distinct slots without serializing on a structural lock; the outer
//! `RwLock` around the arena is only taken exclusively by `resize`.
//!
//! # Lock ordering
//!
//! `slots` (outer, read) → `labels` → `entry` → per-slot locks. Per-slot
//! locks are never nested: distances to other slots are computed against a
//! pre-fetched copy of the vector before a neighbor list is re-locked for
//! writing, which keeps back-edge pruning deadlock-free against concurrent
//! searches.

use crate::error::{Error, Result};
use crate::spaces::{DistanceKernels, Space, SpaceType};
use crate::visited::VisitedListPool;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

/// Dense slot index into the element arena.
pub(crate) type SlotId = u32;

/// Hard cap on the drawn level, matching the practical depth of the
/// geometric distribution for any sane `M`.
const MAX_LEVEL: usize = 15;

/// The (slot, layer) pair every search descends from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct EntryPoint {
    pub(crate) slot: SlotId,
    pub(crate) level: usize,
}

/// Search-heap entry: a slot at its distance from the query.
///
/// Ordered by distance under IEEE total ordering (so a NaN distance cannot
/// corrupt the heaps), with the slot id breaking ties. Max-heaps of
/// `Candidate` keep the worst result on top; `Reverse<Candidate>` min-heaps
/// keep the most promising frontier entry on top.
#[derive(Debug, Clone, Copy)]
struct Candidate {
    distance: f32,
    slot: SlotId,
}

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.distance.to_bits() == other.distance.to_bits() && self.slot == other.slot
    }
}

impl Eq for Candidate {}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.distance
            .total_cmp(&other.distance)
            .then_with(|| self.slot.cmp(&other.slot))
    }
}

/// One element of the arena.
#[derive(Debug, Default)]
pub(super) struct Slot<S> {
    pub(super) vector: Vec<S>,
    pub(super) label: u64,
    /// Highest layer this element participates in.
    pub(super) level: usize,
    /// Neighbor lists, one per layer in `0..=level`. Layer 0 holds up to
    /// `2·M` edges, the rest up to `M`.
    pub(super) links: Vec<Vec<SlotId>>,
    /// Tombstone: the slot stays reachable as a transit node but is never
    /// returned from a search.
    pub(super) deleted: bool,
}

/// Multi-layer navigable small world graph over storage vectors.
pub(crate) struct HnswGraph<S: DistanceKernels> {
    pub(super) space: Space<S>,
    pub(super) m: usize,
    pub(super) m0: usize,
    pub(super) ef_construction: usize,
    /// Level multiplier, `1 / ln(M)`.
    pub(super) mult: f64,
    pub(super) default_ef: AtomicUsize,
    /// Element arena. The outer lock is held shared by every operation and
    /// exclusively by `resize`, so queries never observe a torn arena.
    pub(super) slots: RwLock<Vec<RwLock<Slot<S>>>>,
    /// Number of occupied slots.
    pub(super) count: AtomicUsize,
    pub(super) entry: RwLock<Option<EntryPoint>>,
    pub(super) labels: RwLock<FxHashMap<u64, SlotId>>,
    pub(super) visited: VisitedListPool,
    /// xorshift64 state for level draws.
    pub(super) rng_state: AtomicU64,
    pub(super) has_deletions: AtomicBool,
}

impl<S: DistanceKernels> HnswGraph<S> {
    /// Creates an empty graph.
    ///
    /// `dims` is the storage dimensionality `D'`, including any augmented
    /// coordinate the façade appends.
    pub(crate) fn new(
        space_type: SpaceType,
        dims: usize,
        m: usize,
        ef_construction: usize,
        seed: u64,
        max_elements: usize,
        ef: usize,
    ) -> Self {
        let mut rng_state = seed ^ 0x5DEE_CE66_D1A4_B5B5;
        if rng_state == 0 {
            rng_state = 0x5DEE_CE66_D1A4_B5B5;
        }
        Self {
            space: Space::new(space_type, dims),
            m,
            m0: m * 2,
            ef_construction: ef_construction.max(m * 2),
            mult: 1.0 / (m as f64).ln(),
            default_ef: AtomicUsize::new(ef),
            slots: RwLock::new((0..max_elements).map(|_| RwLock::new(Slot::default())).collect()),
            count: AtomicUsize::new(0),
            entry: RwLock::new(None),
            labels: RwLock::new(FxHashMap::default()),
            visited: VisitedListPool::new(1, max_elements),
            rng_state: AtomicU64::new(rng_state),
            has_deletions: AtomicBool::new(false),
        }
    }

    /// Rebuilds a graph from deserialized parts.
    #[allow(clippy::too_many_arguments)]
    pub(super) fn from_parts(
        space: Space<S>,
        m: usize,
        m0: usize,
        ef_construction: usize,
        mult: f64,
        ef: usize,
        slots: Vec<RwLock<Slot<S>>>,
        labels: FxHashMap<u64, SlotId>,
        entry: Option<EntryPoint>,
        count: usize,
        has_deletions: bool,
    ) -> Self {
        let capacity = slots.len();
        Self {
            space,
            m,
            m0,
            ef_construction,
            mult,
            default_ef: AtomicUsize::new(ef),
            slots: RwLock::new(slots),
            count: AtomicUsize::new(count),
            entry: RwLock::new(entry),
            labels: RwLock::new(labels),
            visited: VisitedListPool::new(1, capacity),
            rng_state: AtomicU64::new(0x5DEE_CE66_D1A4_B5B5),
            has_deletions: AtomicBool::new(has_deletions),
        }
    }

    // ========================================================================
    // Introspection
    // ========================================================================

    /// Number of elements (live and tombstoned).
    pub(crate) fn len(&self) -> usize {
        self.count.load(Ordering::Acquire)
    }

    /// Whether the graph holds no elements.
    pub(crate) fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Current slot capacity.
    pub(crate) fn capacity(&self) -> usize {
        self.slots.read().len()
    }

    /// Default search depth.
    pub(crate) fn ef(&self) -> usize {
        self.default_ef.load(Ordering::Relaxed)
    }

    /// Replaces the default search depth.
    pub(crate) fn set_ef(&self, ef: usize) {
        self.default_ef.store(ef, Ordering::Relaxed);
    }

    pub(crate) fn m(&self) -> usize {
        self.m
    }

    pub(crate) fn ef_construction(&self) -> usize {
        self.ef_construction
    }

    /// Whether any element has ever been tombstoned.
    pub(crate) fn has_deletions(&self) -> bool {
        self.has_deletions.load(Ordering::Acquire)
    }

    /// Whether `label` is present (tombstoned or not).
    pub(crate) fn contains_label(&self, label: u64) -> bool {
        self.labels.read().contains_key(&label)
    }

    /// All labels currently in the graph, in arbitrary order.
    pub(crate) fn labels(&self) -> Vec<u64> {
        self.labels.read().keys().copied().collect()
    }

    // ========================================================================
    // Mutation
    // ========================================================================

    /// Inserts or replaces `label` with the given storage vector.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IndexFull`] when every slot is occupied; the façade
    /// treats that as a resize-and-retry signal.
    pub(crate) fn insert(&self, vector: Vec<S>, label: u64) -> Result<()> {
        enum Route {
            New(SlotId),
            Existing(SlotId),
        }

        debug_assert_eq!(vector.len(), self.space.dims());
        let state = self.slots.read();

        // Route by label while holding the label-map lock, so concurrent
        // inserts of the same label serialize here.
        let route = {
            let mut labels = self.labels.write();
            if let Some(&slot) = labels.get(&label) {
                Route::Existing(slot)
            } else {
                let slot = self.allocate_slot(state.len())?;
                labels.insert(label, slot);
                Route::New(slot)
            }
        };

        match route {
            Route::Existing(slot_id) => {
                // Overwrite in place at the same slot, then re-link as if
                // newly inserted at its original level.
                let level = {
                    let mut slot = state[slot_id as usize].write();
                    slot.vector.clone_from(&vector);
                    slot.level
                };
                self.connect(&state, slot_id, &vector, level);
            }
            Route::New(slot_id) => {
                let level = self.random_level();
                {
                    let mut slot = state[slot_id as usize].write();
                    slot.vector = vector.clone();
                    slot.label = label;
                    slot.level = level;
                    slot.links = vec![Vec::new(); level + 1];
                    slot.deleted = false;
                }
                self.connect(&state, slot_id, &vector, level);
            }
        }
        Ok(())
    }

    /// Claims the next free slot, or fails when the arena is full.
    fn allocate_slot(&self, capacity: usize) -> Result<SlotId> {
        loop {
            let current = self.count.load(Ordering::Acquire);
            if current >= capacity {
                return Err(Error::IndexFull { capacity });
            }
            if self
                .count
                .compare_exchange(current, current + 1, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                return Ok(current as SlotId);
            }
        }
    }

    /// Wires `slot_id` into every layer up to `level`.
    fn connect(&self, state: &[RwLock<Slot<S>>], slot_id: SlotId, query: &[S], level: usize) {
        let existing = *self.entry.read();
        let ep = match existing {
            Some(ep) => ep,
            None => {
                let mut entry = self.entry.write();
                match *entry {
                    Some(ep) => ep,
                    None => {
                        // First element: it is the graph.
                        *entry = Some(EntryPoint {
                            slot: slot_id,
                            level,
                        });
                        return;
                    }
                }
            }
        };

        // Greedy 1-NN descent through the layers above the new element.
        let mut cur = ep.slot;
        for layer in (level + 1..=ep.level).rev() {
            cur = self.greedy_closest(state, query, cur, layer);
        }

        // Candidate search and heuristic linking, top layer down.
        for layer in (0..=level.min(ep.level)).rev() {
            let candidates =
                self.search_layer(state, query, &[cur], self.ef_construction, layer, false);
            if let Some(&(_, closest)) = candidates.first() {
                cur = closest;
            }
            let cap = if layer == 0 { self.m0 } else { self.m };
            let selected = self.select_neighbors(state, candidates, cap, Some(slot_id));

            {
                let mut slot = state[slot_id as usize].write();
                slot.links[layer] = selected.iter().map(|&(_, id)| id).collect();
            }
            for &(_, neighbor) in &selected {
                self.link_back(state, neighbor, slot_id, layer);
            }
        }

        // Promote the entry point when the new element tops the hierarchy.
        if level > ep.level {
            let mut entry = self.entry.write();
            match *entry {
                // Someone else got there first with an equal-or-taller node.
                Some(current) if level <= current.level => {}
                _ => {
                    *entry = Some(EntryPoint {
                        slot: slot_id,
                        level,
                    });
                }
            }
        }
    }

    /// Adds a back-edge `from → to`, re-running the selection heuristic when
    /// the neighbor list overflows its cap.
    fn link_back(&self, state: &[RwLock<Slot<S>>], from: SlotId, to: SlotId, layer: usize) {
        let cap = if layer == 0 { self.m0 } else { self.m };
        {
            let mut slot = state[from as usize].write();
            let Some(links) = slot.links.get_mut(layer) else {
                return;
            };
            if links.contains(&to) {
                return;
            }
            if links.len() < cap {
                links.push(to);
                return;
            }
        }

        // Overflow: re-select over the full neighborhood including the new
        // element. All distances are computed against a pre-fetched copy of
        // the base vector so no per-slot lock is held while another is read.
        let (base_vector, current) = {
            let slot = state[from as usize].read();
            (slot.vector.clone(), slot.links[layer].clone())
        };
        let mut candidates: Vec<(f32, SlotId)> = current
            .into_iter()
            .chain(std::iter::once(to))
            .filter(|&id| id != from)
            .map(|id| (self.distance_to(state, &base_vector, id), id))
            .collect();
        candidates.sort_by(|a, b| a.0.total_cmp(&b.0));
        candidates.dedup_by_key(|c| c.1);

        let selected = self.select_neighbors(state, candidates, cap, Some(from));
        let links: Vec<SlotId> = selected.into_iter().map(|(_, id)| id).collect();
        if let Some(slot_links) = state[from as usize].write().links.get_mut(layer) {
            *slot_links = links;
        }
    }

    /// The "extend" neighbor heuristic: iterate candidates in ascending
    /// distance and keep one only if it is not closer to any already-kept
    /// neighbor than to the query. Diversifies edges and preserves
    /// long-range shortcuts.
    fn select_neighbors(
        &self,
        state: &[RwLock<Slot<S>>],
        candidates: Vec<(f32, SlotId)>,
        cap: usize,
        exclude: Option<SlotId>,
    ) -> Vec<(f32, SlotId)> {
        let mut filtered: Vec<(f32, SlotId)> = candidates
            .into_iter()
            .filter(|&(_, id)| Some(id) != exclude)
            .collect();
        if filtered.len() <= cap {
            return filtered;
        }

        let mut selected: Vec<(f32, SlotId)> = Vec::with_capacity(cap);
        let mut selected_vectors: Vec<Vec<S>> = Vec::with_capacity(cap);
        for (dist, id) in filtered.drain(..) {
            if selected.len() >= cap {
                break;
            }
            let vector = state[id as usize].read().vector.clone();
            let diverse = selected_vectors
                .iter()
                .all(|kept| self.space.distance(&vector, kept) >= dist);
            if diverse {
                selected.push((dist, id));
                selected_vectors.push(vector);
            }
        }
        selected
    }

    /// Toggles the tombstone on.
    ///
    /// The element stays reachable as a transit node; heavy deletion
    /// degrades recall and is not self-healing. Callers needing clean
    /// removal must rebuild the index.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownLabel`] when `label` is absent.
    pub(crate) fn mark_deleted(&self, label: u64) -> Result<()> {
        let state = self.slots.read();
        let slot_id = self.slot_of(label)?;
        state[slot_id as usize].write().deleted = true;
        self.has_deletions.store(true, Ordering::Release);
        Ok(())
    }

    /// Toggles the tombstone off.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownLabel`] when `label` is absent.
    pub(crate) fn unmark_deleted(&self, label: u64) -> Result<()> {
        let state = self.slots.read();
        let slot_id = self.slot_of(label)?;
        state[slot_id as usize].write().deleted = false;
        Ok(())
    }

    /// Grows the element arena and the visited-list pool.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IndexCannotBeShrunk`] when `new_capacity` is below
    /// the current capacity — including when a concurrent resize already
    /// grew past it.
    pub(crate) fn resize(&self, new_capacity: usize) -> Result<()> {
        let mut state = self.slots.write();
        let current = state.len();
        if new_capacity < current {
            return Err(Error::IndexCannotBeShrunk {
                requested: new_capacity,
                current,
            });
        }
        if new_capacity == current {
            return Ok(());
        }
        tracing::debug!(from = current, to = new_capacity, "resizing element arena");
        self.visited.grow(new_capacity);
        state.extend((current..new_capacity).map(|_| RwLock::new(Slot::default())));
        Ok(())
    }

    // ========================================================================
    // Search
    // ========================================================================

    /// Returns up to `k` `(distance, label)` pairs in ascending distance,
    /// skipping tombstoned elements.
    ///
    /// # Errors
    ///
    /// - [`Error::EfTooSmall`] when `ef < k`;
    /// - [`Error::NotEnoughElements`] when fewer than `k` live elements are
    ///   reachable;
    /// - [`Error::Corruption`] when a distance falls below the storage
    ///   type's tolerance band.
    pub(crate) fn search(&self, query: &[S], k: usize, ef: usize) -> Result<Vec<(f32, u64)>> {
        if ef < k {
            return Err(Error::EfTooSmall { ef, k });
        }
        let state = self.slots.read();
        let Some(ep) = *self.entry.read() else {
            return Err(Error::NotEnoughElements {
                requested: k,
                available: 0,
            });
        };

        let mut cur = ep.slot;
        for layer in (1..=ep.level).rev() {
            cur = self.greedy_closest(&state, query, cur, layer);
        }

        let found = self.search_layer(&state, query, &[cur], ef.max(k), 0, true);
        let mut results = Vec::with_capacity(k.min(found.len()));
        for (dist, id) in found.into_iter().take(k) {
            let label = state[id as usize].read().label;
            results.push((self.guard_distance(dist, label)?, label));
        }
        if results.len() < k {
            return Err(Error::NotEnoughElements {
                requested: k,
                available: results.len(),
            });
        }
        Ok(results)
    }

    /// Stored vector for `label`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownLabel`] when `label` is absent.
    pub(crate) fn vector(&self, label: u64) -> Result<Vec<S>> {
        let state = self.slots.read();
        let slot_id = self.slot_of(label)?;
        let vector = state[slot_id as usize].read().vector.clone();
        Ok(vector)
    }

    fn slot_of(&self, label: u64) -> Result<SlotId> {
        self.labels
            .read()
            .get(&label)
            .copied()
            .ok_or(Error::UnknownLabel(label))
    }

    /// Clamps floating-point noise to zero and rejects anything below the
    /// tolerance band as corruption.
    fn guard_distance(&self, distance: f32, label: u64) -> Result<f32> {
        if distance >= 0.0 {
            return Ok(distance);
        }
        // Inner-product distance is legitimately negative for large dot
        // products; it is clamped without a corruption check.
        if self.space.space_type() == SpaceType::InnerProduct {
            return Ok(0.0);
        }
        if distance >= -S::DISTANCE_TOLERANCE {
            return Ok(0.0);
        }
        Err(Error::corruption_at(
            label,
            format!(
                "distance {distance} below the -{} tolerance band",
                S::DISTANCE_TOLERANCE
            ),
        ))
    }

    /// Greedy 1-NN descent within one layer.
    fn greedy_closest(
        &self,
        state: &[RwLock<Slot<S>>],
        query: &[S],
        start: SlotId,
        layer: usize,
    ) -> SlotId {
        let mut best = start;
        let mut best_dist = self.distance_to(state, query, best);
        loop {
            let neighbors = {
                let slot = state[best as usize].read();
                slot.links.get(layer).cloned().unwrap_or_default()
            };
            let mut improved = false;
            for neighbor in neighbors {
                let dist = self.distance_to(state, query, neighbor);
                if dist < best_dist {
                    best = neighbor;
                    best_dist = dist;
                    improved = true;
                }
            }
            if !improved {
                return best;
            }
        }
    }

    /// Bounded best-first search within one layer.
    ///
    /// Returns `(distance, slot)` pairs in ascending distance. Tombstoned
    /// elements are traversed as transit nodes but excluded from the result
    /// side when `filter_deleted` is set.
    fn search_layer(
        &self,
        state: &[RwLock<Slot<S>>],
        query: &[S],
        entry_points: &[SlotId],
        ef: usize,
        layer: usize,
        filter_deleted: bool,
    ) -> Vec<(f32, SlotId)> {
        let skip_deleted = filter_deleted && self.has_deletions();
        let mut visited = self.visited.acquire();
        let mut frontier: BinaryHeap<Reverse<Candidate>> = BinaryHeap::new();
        let mut results: BinaryHeap<Candidate> = BinaryHeap::new();

        for &ep in entry_points {
            if !visited.insert(ep) {
                continue;
            }
            let candidate = Candidate {
                distance: self.distance_to(state, query, ep),
                slot: ep,
            };
            frontier.push(Reverse(candidate));
            if !(skip_deleted && state[ep as usize].read().deleted) {
                results.push(candidate);
            }
        }

        while let Some(Reverse(current)) = frontier.pop() {
            let worst = results.peek().map_or(f32::MAX, |c| c.distance);
            if current.distance > worst && results.len() >= ef {
                break;
            }

            let neighbors = {
                let guard = state[current.slot as usize].read();
                guard.links.get(layer).cloned().unwrap_or_default()
            };
            for neighbor in neighbors {
                if !visited.insert(neighbor) {
                    continue;
                }
                let candidate = Candidate {
                    distance: self.distance_to(state, query, neighbor),
                    slot: neighbor,
                };
                let worst = results.peek().map_or(f32::MAX, |c| c.distance);
                if results.len() < ef || candidate.distance < worst {
                    frontier.push(Reverse(candidate));
                    if !(skip_deleted && state[neighbor as usize].read().deleted) {
                        results.push(candidate);
                        if results.len() > ef {
                            results.pop();
                        }
                    }
                }
            }
        }

        let mut out: Vec<(f32, SlotId)> = results
            .into_iter()
            .map(|c| (c.distance, c.slot))
            .collect();
        out.sort_by(|a, b| a.0.total_cmp(&b.0));
        out
    }

    #[inline]
    fn distance_to(&self, state: &[RwLock<Slot<S>>], query: &[S], slot: SlotId) -> f32 {
        let guard = state[slot as usize].read();
        self.space.distance(query, &guard.vector)
    }

    /// Draws the layer for a new element from the geometric distribution
    /// with parameter `1/ln(M)`.
    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss
    )]
    fn random_level(&self) -> usize {
        // xorshift64; the state is never zero.
        let mut state = self.rng_state.load(Ordering::Relaxed);
        state ^= state << 13;
        state ^= state >> 7;
        state ^= state << 17;
        self.rng_state.store(state, Ordering::Relaxed);

        let uniform = (state as f64) / (u64::MAX as f64);
        let level = (-uniform.ln() * self.mult).floor() as usize;
        level.min(MAX_LEVEL)
    }
}
