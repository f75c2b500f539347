//! Sorted list scheduler
//!
//! Entries sit in a deque kept in key order. Insert is a binary search plus
//! an O(n) shift; taking the minimum is O(1).

use std::collections::VecDeque;

use crate::{Entry, EventKey, Scheduler};

#[derive(Debug, Default)]
pub struct ListScheduler {
    entries: VecDeque<Entry>,
}

impl ListScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    fn position(&self, key: &EventKey) -> Result<usize, usize> {
        self.entries.binary_search_by(|e| e.key.cmp(key))
    }
}

impl Scheduler for ListScheduler {
    fn name(&self) -> &'static str {
        "ListScheduler"
    }

    fn insert(&mut self, entry: Entry) {
        let at = match self.position(&entry.key) {
            Ok(i) | Err(i) => i,
        };
        self.entries.insert(at, entry);
    }

    fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn peek_next(&self) -> Option<&Entry> {
        self.entries.front()
    }

    fn remove_next(&mut self) -> Option<Entry> {
        self.entries.pop_front()
    }

    fn remove(&mut self, key: &EventKey) -> Option<Entry> {
        let at = self.position(key).ok()?;
        self.entries.remove(at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::conformance;

    #[test]
    fn test_conformance() {
        conformance::check_all(|| Box::new(ListScheduler::new()));
    }

    #[test]
    fn test_front_is_minimum() {
        let mut s = ListScheduler::new();
        s.insert(conformance::entry(9, 4));
        s.insert(conformance::entry(2, 5));
        assert_eq!(s.peek_next().map(|e| e.key.ts), Some(2));
        assert_eq!(s.name(), "ListScheduler");
    }
}
