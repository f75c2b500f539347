//! Scheduler abstraction
//!
//! A scheduler is a priority queue of [`Entry`] values ordered by
//! [`EventKey`]: virtual time first, then uid. Uids are handed out in
//! insertion order, so events sharing a timestamp come out FIFO.

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use nsim_core::EventImpl;

/// Ordering key of a queued event
///
/// Two keys compare by `(ts, uid)` only. The engine never hands out the same
/// uid twice, which makes the order total.
#[derive(Clone, Copy, Debug)]
pub struct EventKey {
    pub ts: i64,
    pub uid: u32,
    pub context: u32,
}

impl EventKey {
    #[inline]
    pub fn new(ts: i64, uid: u32, context: u32) -> Self {
        EventKey { ts, uid, context }
    }
}

impl PartialEq for EventKey {
    fn eq(&self, other: &Self) -> bool {
        self.ts == other.ts && self.uid == other.uid
    }
}

impl Eq for EventKey {}

impl Ord for EventKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.ts.cmp(&other.ts).then(self.uid.cmp(&other.uid))
    }
}

impl PartialOrd for EventKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// A queued event
#[derive(Clone)]
pub struct Entry {
    pub key: EventKey,
    pub event: Arc<EventImpl>,
}

impl Entry {
    pub fn new(key: EventKey, event: Arc<EventImpl>) -> Self {
        Entry { key, event }
    }
}

impl fmt::Debug for Entry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Entry(ts={}, uid={}, ctx={})",
            self.key.ts, self.key.uid, self.key.context
        )
    }
}

/// Priority queue of events
///
/// Implementations may differ in complexity but must agree on order:
/// [`Scheduler::remove_next`] always yields the entry with the smallest key.
pub trait Scheduler: Send {
    /// Short type name, e.g. `"MapScheduler"`
    fn name(&self) -> &'static str;

    fn insert(&mut self, entry: Entry);

    fn is_empty(&self) -> bool;

    fn len(&self) -> usize;

    /// Smallest entry, `None` when empty
    fn peek_next(&self) -> Option<&Entry>;

    /// Remove and return the smallest entry, `None` when empty
    fn remove_next(&mut self) -> Option<Entry>;

    /// Remove the entry with `key`, if queued
    fn remove(&mut self, key: &EventKey) -> Option<Entry>;
}

/// Move every entry of `from` into `to`, preserving keys
///
/// Returns the number of entries moved.
pub fn transfer(from: &mut dyn Scheduler, to: &mut dyn Scheduler) -> usize {
    let mut moved = 0;
    while let Some(entry) = from.remove_next() {
        to.insert(entry);
        moved += 1;
    }
    moved
}
