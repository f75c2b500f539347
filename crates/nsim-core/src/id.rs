//! Identity types for scheduled events
//!
//! An [`EventId`] is the caller's handle to a scheduled event: the event's
//! timestamp, context and uid, plus a weak pointer to the event itself.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Weak};

use crate::{EventImpl, Time};

/// Context value meaning "not tied to any simulated entity"
pub const NO_CONTEXT: u32 = 0xffff_ffff;

/// Uid of the null handle
pub const INVALID_UID: u32 = 0;
/// Uid shared by all destroy-time events
pub const DESTROY_UID: u32 = 2;
/// First uid handed to regular events
pub const FIRST_UID: u32 = 4;

/// Handle to a scheduled event
///
/// The handle does not keep the event alive. Once the engine has run or
/// dropped the event, the handle reports it as expired.
#[derive(Clone, Default)]
pub struct EventId {
    event: Weak<EventImpl>,
    ts: i64,
    context: u32,
    uid: u32,
}

impl EventId {
    pub fn new(event: &Arc<EventImpl>, ts: i64, context: u32, uid: u32) -> Self {
        EventId {
            event: Arc::downgrade(event),
            ts,
            context,
            uid,
        }
    }

    /// Handle that refers to nothing
    #[inline]
    pub fn null() -> Self {
        Self::default()
    }

    #[inline]
    pub fn is_null(&self) -> bool {
        self.uid == INVALID_UID
    }

    /// Timestamp in ticks
    #[inline]
    pub fn ts(&self) -> i64 {
        self.ts
    }

    #[inline]
    pub fn time(&self) -> Time {
        Time::from_step(self.ts)
    }

    #[inline]
    pub fn context(&self) -> u32 {
        self.context
    }

    #[inline]
    pub fn uid(&self) -> u32 {
        self.uid
    }

    /// The handle names a destroy-time event
    #[inline]
    pub fn is_destroy(&self) -> bool {
        self.uid == DESTROY_UID
    }

    /// The event, if anything still holds it
    pub fn peek_event(&self) -> Option<Arc<EventImpl>> {
        self.event.upgrade()
    }

    /// Mark the event cancelled. It stays queued but will not run.
    pub fn cancel(&self) {
        if let Some(event) = self.event.upgrade() {
            event.cancel();
        }
    }

    /// The event will never run: null, dropped, cancelled or already run
    ///
    /// The engine's own check also uses virtual time; this is the part that
    /// needs only the handle.
    pub fn is_expired(&self) -> bool {
        match self.event.upgrade() {
            None => true,
            Some(event) => event.is_cancelled() || event.is_consumed(),
        }
    }

    #[inline]
    pub fn is_running(&self) -> bool {
        !self.is_expired()
    }
}

impl PartialEq for EventId {
    fn eq(&self, other: &Self) -> bool {
        Weak::ptr_eq(&self.event, &other.event)
            && self.ts == other.ts
            && self.context == other.context
            && self.uid == other.uid
    }
}

impl Eq for EventId {}

impl Hash for EventId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.ts.hash(state);
        self.context.hash(state);
        self.uid.hash(state);
    }
}

impl fmt::Debug for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_null() {
            return f.write_str("Event(null)");
        }
        if self.context == NO_CONTEXT {
            write!(f, "Event(uid={}, ts={}, ctx=-)", self.uid, self.ts)
        } else {
            write!(f, "Event(uid={}, ts={}, ctx={})", self.uid, self.ts, self.context)
        }
    }
}
