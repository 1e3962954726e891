//! FIFO load queue with duplicate suppression.
//!
//! Candidates are priority-sorted before insertion, so plain FIFO draining
//! preserves the hot-before-warm, closest-to-anchor-first ordering. A page
//! whose status changed after enqueue is skipped at pop time by the caller.

use std::collections::{HashSet, VecDeque};

/// Queue of page indices awaiting a load slot.
#[derive(Debug, Default)]
pub struct LoadQueue {
    order: VecDeque<usize>,
    queued: HashSet<usize>,
}

impl LoadQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue a page index. Returns `false` if it was already queued.
    pub fn push(&mut self, index: usize) -> bool {
        if !self.queued.insert(index) {
            return false;
        }
        self.order.push_back(index);
        true
    }

    /// Dequeue the next index in insertion order.
    pub fn pop(&mut self) -> Option<usize> {
        let index = self.order.pop_front()?;
        self.queued.remove(&index);
        Some(index)
    }

    /// Whether `index` is currently queued.
    pub fn contains(&self, index: usize) -> bool {
        self.queued.contains(&index)
    }

    /// Number of queued indices.
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Whether the queue is empty.
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Drop everything.
    pub fn clear(&mut self) {
        self.order.clear();
        self.queued.clear();
    }
}
