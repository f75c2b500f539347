//! Ordered-map scheduler, the default
//!
//! Backed by a `BTreeMap` keyed by [`EventKey`]. Every operation is
//! O(log n), including removal of an arbitrary entry.

use std::collections::BTreeMap;

use crate::{Entry, EventKey, Scheduler};

#[derive(Debug, Default)]
pub struct MapScheduler {
    entries: BTreeMap<EventKey, Entry>,
}

impl MapScheduler {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Scheduler for MapScheduler {
    fn name(&self) -> &'static str {
        "MapScheduler"
    }

    fn insert(&mut self, entry: Entry) {
        let previous = self.entries.insert(entry.key, entry);
        debug_assert!(previous.is_none(), "duplicate scheduler key");
    }

    fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn peek_next(&self) -> Option<&Entry> {
        self.entries.first_key_value().map(|(_, e)| e)
    }

    fn remove_next(&mut self) -> Option<Entry> {
        self.entries.pop_first().map(|(_, e)| e)
    }

    fn remove(&mut self, key: &EventKey) -> Option<Entry> {
        self.entries.remove(key)
    }
}
