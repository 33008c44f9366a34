//! Pool of visit-marker lists shared by all queries on an index.
//!
//! Each list is a vector of small version tags, one per slot. A query marks
//! a slot visited by writing the list's current version; resetting the list
//! for the next query is a single version increment, and a full memset only
//! happens when the version counter wraps. Lists are pooled behind a short
//! critical section, grow with the index, and never shrink.
//!
//! The pool handle is also how a long search is abandoned: dropping the
//! handle simply returns the list. Individual search steps are not
//! cancel-checked; queries are expected to complete quickly.

use parking_lot::Mutex;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicUsize, Ordering};

/// A versioned visit-marker list covering `capacity` slots.
pub(crate) struct VisitedList {
    tags: Vec<u16>,
    version: u16,
}

impl VisitedList {
    fn new(capacity: usize) -> Self {
        Self {
            tags: vec![0; capacity],
            version: 0,
        }
    }

    /// Starts a fresh traversal: every slot becomes unvisited.
    pub(crate) fn reset(&mut self) {
        self.version = self.version.wrapping_add(1);
        if self.version == 0 {
            // Version counter wrapped: wipe stale tags and restart at 1.
            self.tags.fill(0);
            self.version = 1;
        }
    }

    /// Marks `slot` visited, returning `true` if it was not visited before.
    #[inline]
    pub(crate) fn insert(&mut self, slot: u32) -> bool {
        let tag = &mut self.tags[slot as usize];
        if *tag == self.version {
            false
        } else {
            *tag = self.version;
            true
        }
    }

    /// Whether `slot` has been visited in the current traversal.
    #[inline]
    pub(crate) fn is_visited(&self, slot: u32) -> bool {
        self.tags[slot as usize] == self.version
    }

    fn grow(&mut self, capacity: usize) {
        if capacity > self.tags.len() {
            self.tags.resize(capacity, 0);
        }
    }
}

/// Lock-guarded pool of [`VisitedList`]s.
pub(crate) struct VisitedListPool {
    lists: Mutex<Vec<VisitedList>>,
    capacity: AtomicUsize,
}

impl VisitedListPool {
    /// Creates a pool with `initial_lists` lists covering `capacity` slots.
    pub(crate) fn new(initial_lists: usize, capacity: usize) -> Self {
        let lists = (0..initial_lists)
            .map(|_| VisitedList::new(capacity))
            .collect();
        Self {
            lists: Mutex::new(lists),
            capacity: AtomicUsize::new(capacity),
        }
    }

    /// Takes a list from the pool, allocating one if it is empty.
    ///
    /// The returned handle gives the list back on drop.
    pub(crate) fn acquire(&self) -> VisitedListHandle<'_> {
        let list = self.lists.lock().pop();
        let mut list =
            list.unwrap_or_else(|| VisitedList::new(self.capacity.load(Ordering::Acquire)));
        // A pooled list may predate the most recent resize.
        list.grow(self.capacity.load(Ordering::Acquire));
        list.reset();
        VisitedListHandle {
            pool: self,
            list: Some(list),
        }
    }

    /// Grows every list to cover `capacity` slots. The pool never shrinks.
    pub(crate) fn grow(&self, capacity: usize) {
        self.capacity.fetch_max(capacity, Ordering::AcqRel);
        let mut lists = self.lists.lock();
        for list in lists.iter_mut() {
            list.grow(capacity);
        }
    }

    #[cfg(test)]
    pub(crate) fn pooled_count(&self) -> usize {
        self.lists.lock().len()
    }
}

/// RAII handle to a pooled [`VisitedList`].
pub(crate) struct VisitedListHandle<'a> {
    pool: &'a VisitedListPool,
    list: Option<VisitedList>,
}

impl Deref for VisitedListHandle<'_> {
    type Target = VisitedList;

    fn deref(&self) -> &VisitedList {
        self.list.as_ref().expect("list present until drop")
    }
}

impl DerefMut for VisitedListHandle<'_> {
    fn deref_mut(&mut self) -> &mut VisitedList {
        self.list.as_mut().expect("list present until drop")
    }
}

impl Drop for VisitedListHandle<'_> {
    fn drop(&mut self) {
        if let Some(list) = self.list.take() {
            self.pool.lists.lock().push(list);
        }
    }
}
