// src/core/relay/reorder.rs

//! A min-priority reorder buffer keyed by sequence number. Dispatch workers
//! register a unit before calling the backend and record its response when
//! the call returns; entries are released strictly in sequence order.

use super::request::Delivery;
use crate::core::protocol::RespFrame;
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};

/// A unit awaiting release, ordered so the smallest sequence sits at the
/// heap's head.
struct Pending {
    sequence: u64,
    delivery: Delivery,
}

impl PartialEq for Pending {
    fn eq(&self, other: &Self) -> bool {
        self.sequence == other.sequence
    }
}

impl Eq for Pending {}

impl PartialOrd for Pending {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Pending {
    // Reversed: `BinaryHeap` is a max-heap, the buffer needs a min-heap.
    fn cmp(&self, other: &Self) -> Ordering {
        other.sequence.cmp(&self.sequence)
    }
}

/// The reorder buffer. Never grows beyond the number of units
/// dispatched-but-undelivered; drained whenever the head unit has a response.
pub struct ReorderQueue {
    pending: BinaryHeap<Pending>,
    completed: HashMap<u64, RespFrame>,
}

impl ReorderQueue {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            pending: BinaryHeap::with_capacity(capacity),
            completed: HashMap::with_capacity(capacity),
        }
    }

    /// Tracks a unit's position before its backend call starts.
    pub fn register(&mut self, sequence: u64, delivery: Delivery) {
        self.pending.push(Pending { sequence, delivery });
    }

    /// Records a completed response and drains every releasable entry from
    /// the head. Draining stops at the first entry still awaiting a response:
    /// a unit that finished early must wait behind any earlier-sequenced unit
    /// still in flight. Scanning past it would break the ordering guarantee.
    pub fn complete(
        &mut self,
        sequence: u64,
        response: RespFrame,
    ) -> Vec<(Delivery, RespFrame)> {
        self.completed.insert(sequence, response);

        let mut ready = Vec::new();
        while let Some(head_seq) = self.pending.peek().map(|p| p.sequence) {
            let Some(response) = self.completed.remove(&head_seq) else {
                break;
            };
            if let Some(entry) = self.pending.pop() {
                ready.push((entry.delivery, response));
            }
        }
        ready
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
