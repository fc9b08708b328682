//! Retention log: an append-only sequence that pins host values against
//! reclamation.
//!
//! The map retains by logging instead of per-value reference counting:
//! every key and value that enters the table is pushed (and pinned) here,
//! removals never touch the log, and a periodic compaction rebuilds it from
//! the live entries. Between compactions the log over-retains by a bounded
//! factor; that is the price of O(1) mutations without refcounts.

use crate::value::HostValue;
use core::ops::Index;

/// Initial slot capacity; backing storage doubles on overflow.
const INITIAL_CAPACITY: usize = 16;

/// Append-only log of pinned handles.
///
/// Every pushed handle is pinned exactly once by this log and unpinned
/// exactly once when the log is dropped. Moving a log transfers the backing
/// storage without touching pins; cloning re-pins (see [`Clone`]).
pub struct RetentionLog<V: HostValue> {
    items: Vec<V>,
}

impl<V: HostValue> RetentionLog<V> {
    pub fn new() -> Self {
        Self {
            items: Vec::with_capacity(INITIAL_CAPACITY),
        }
    }

    /// Pin `value` and append it. Amortized O(1).
    pub fn push(&mut self, value: V) {
        value.pin();
        self.items.push(value);
    }

    /// Number of handles ever pushed since construction or the last
    /// compaction swap.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl<V: HostValue> Default for RetentionLog<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V: HostValue> Index<usize> for RetentionLog<V> {
    type Output = V;

    fn index(&self, i: usize) -> &V {
        &self.items[i]
    }
}

impl<V: HostValue> Clone for RetentionLog<V> {
    /// Independent log that pins its own copy of the sequence, so a cloned
    /// map never shares mutable log state with the original.
    fn clone(&self) -> Self {
        let items = self
            .items
            .iter()
            .map(|v| {
                v.pin();
                v.clone()
            })
            .collect();
        Self { items }
    }
}

impl<V: HostValue> Drop for RetentionLog<V> {
    fn drop(&mut self) {
        for v in &self.items {
            v.unpin();
        }
    }
}
