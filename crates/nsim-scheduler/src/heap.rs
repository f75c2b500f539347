//! Binary heap scheduler
//!
//! `BinaryHeap` is a max-heap, so entries are wrapped with a reversed
//! ordering. Insert and remove-next are O(log n); arbitrary removal rebuilds
//! the heap and is O(n).

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use crate::{Entry, EventKey, Scheduler};

#[derive(Debug)]
struct MinEntry(Entry);

impl PartialEq for MinEntry {
    fn eq(&self, other: &Self) -> bool {
        self.0.key == other.0.key
    }
}

impl Eq for MinEntry {}

impl Ord for MinEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed: the smallest key sits on top.
        other.0.key.cmp(&self.0.key)
    }
}

impl PartialOrd for MinEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[derive(Debug, Default)]
pub struct HeapScheduler {
    heap: BinaryHeap<MinEntry>,
}

impl HeapScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        HeapScheduler {
            heap: BinaryHeap::with_capacity(capacity),
        }
    }
}

impl Scheduler for HeapScheduler {
    fn name(&self) -> &'static str {
        "HeapScheduler"
    }

    fn insert(&mut self, entry: Entry) {
        self.heap.push(MinEntry(entry));
    }

    fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    fn len(&self) -> usize {
        self.heap.len()
    }

    fn peek_next(&self) -> Option<&Entry> {
        self.heap.peek().map(|e| &e.0)
    }

    fn remove_next(&mut self) -> Option<Entry> {
        self.heap.pop().map(|e| e.0)
    }

    fn remove(&mut self, key: &EventKey) -> Option<Entry> {
        let mut found = None;
        let entries = std::mem::take(&mut self.heap).into_vec();
        let mut kept = Vec::with_capacity(entries.len());
        for entry in entries {
            if found.is_none() && entry.0.key == *key {
                found = Some(entry.0);
            } else {
                kept.push(entry);
            }
        }
        self.heap = BinaryHeap::from(kept);
        found
    }
}
