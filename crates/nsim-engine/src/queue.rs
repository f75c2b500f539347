//! Bookkeeping shared by the engine implementations
//!
//! [`EventQueue`] is the state an engine keeps behind its lock: the
//! scheduler, the destroy list, the virtual clock and the uid counter. It
//! never runs events; callers pop entries and invoke them with the lock
//! released.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use nsim_core::{EventId, EventImpl, Time, DESTROY_UID, FIRST_UID, NO_CONTEXT};
use nsim_scheduler::{transfer, Entry, EventKey, Scheduler};

use crate::SimulatorState;

pub(crate) struct EventQueue {
    pub events: Box<dyn Scheduler>,
    destroy_events: VecDeque<(EventId, Arc<EventImpl>)>,
    next_uid: u32,
    pub current_ts: i64,
    pub current_uid: u32,
    pub current_context: u32,
    /// Events inserted and not yet dispatched or removed
    pub unscheduled: usize,
    pub event_count: u64,
    pub phase: SimulatorState,
    pub running: bool,
    pub destroying: bool,
}

impl EventQueue {
    pub fn new(events: Box<dyn Scheduler>) -> Self {
        EventQueue {
            events,
            destroy_events: VecDeque::new(),
            next_uid: FIRST_UID,
            current_ts: 0,
            current_uid: 0,
            current_context: NO_CONTEXT,
            unscheduled: 0,
            event_count: 0,
            phase: SimulatorState::NotStarted,
            running: false,
            destroying: false,
        }
    }

    pub fn now(&self) -> Time {
        Time::from_step(self.current_ts)
    }

    fn take_uid(&mut self) -> u32 {
        let uid = self.next_uid;
        self.next_uid = match uid.checked_add(1) {
            Some(next) => next,
            None => panic!("event uid space exhausted"),
        };
        uid
    }

    fn assert_alive(&self, op: &str) {
        if self.phase == SimulatorState::Destroyed {
            panic!("{op}: the simulator has been destroyed");
        }
    }

    /// Insert at an absolute timestamp
    pub fn insert(&mut self, ts: i64, context: u32, event: Arc<EventImpl>) -> EventId {
        self.assert_alive("schedule");
        let uid = self.take_uid();
        let id = EventId::new(&event, ts, context, uid);
        self.events.insert(Entry::new(EventKey::new(ts, uid, context), event));
        self.unscheduled += 1;
        id
    }

    pub fn insert_destroy(&mut self, event: Arc<EventImpl>) -> EventId {
        self.assert_alive("schedule_destroy");
        let id = EventId::new(&event, self.current_ts, self.current_context, DESTROY_UID);
        self.destroy_events.push_back((id.clone(), event));
        id
    }

    pub fn pop_destroy(&mut self) -> Option<Arc<EventImpl>> {
        self.destroy_events.pop_front().map(|(_, event)| event)
    }

    /// Pop the next entry and advance the clock to it
    pub fn dispatch_next(&mut self) -> Option<Entry> {
        let entry = self.events.remove_next()?;
        assert!(
            entry.key.ts >= self.current_ts,
            "event at {} dequeued behind the clock at {}",
            entry.key.ts,
            self.current_ts
        );
        self.unscheduled -= 1;
        self.current_ts = entry.key.ts;
        self.current_uid = entry.key.uid;
        self.current_context = entry.key.context;
        self.event_count += 1;
        Some(entry)
    }

    /// `event` must be `id.peek_event()`, upgraded by the caller before
    /// taking the lock so the last strong reference is never dropped under it.
    pub fn is_expired(&self, id: &EventId, event: Option<&Arc<EventImpl>>) -> bool {
        let Some(event) = event else {
            return true;
        };
        if event.is_cancelled() {
            return true;
        }
        if id.is_destroy() {
            return !self.destroy_events.iter().any(|(queued, _)| queued == id);
        }
        id.ts() < self.current_ts || (id.ts() == self.current_ts && id.uid() <= self.current_uid)
    }

    pub fn delay_left(&self, id: &EventId, event: Option<&Arc<EventImpl>>) -> Time {
        if self.is_expired(id, event) {
            Time::ZERO
        } else {
            Time::from_step(id.ts().wrapping_sub(self.current_ts))
        }
    }

    pub fn remove(&mut self, id: &EventId) -> Option<Entry> {
        let entry = self.events.remove(&EventKey::new(id.ts(), id.uid(), id.context()))?;
        self.unscheduled -= 1;
        Some(entry)
    }

    pub fn is_finished(&self, stopped: bool) -> bool {
        self.events.is_empty() || stopped
    }

    /// Swap in a new scheduler; returns the old one, now empty
    pub fn replace_scheduler(&mut self, mut scheduler: Box<dyn Scheduler>) -> Box<dyn Scheduler> {
        transfer(self.events.as_mut(), scheduler.as_mut());
        std::mem::replace(&mut self.events, scheduler)
    }

    /// Empty the scheduler, handing the entries back so they can be dropped
    /// outside the lock
    pub fn drain(&mut self) -> Vec<Entry> {
        let mut drained = Vec::with_capacity(self.events.len());
        while let Some(entry) = self.events.remove_next() {
            drained.push(entry);
        }
        self.unscheduled = 0;
        drained
    }
}

/// Engine state that wraps an [`EventQueue`]
pub(crate) trait QueueState {
    fn queue(&mut self) -> &mut EventQueue;

    /// Extra setup when `run` starts, under the same lock that flips the
    /// engine to running
    fn on_run_enter(&mut self) {}

    /// Extra cleanup when `run` exits, normally or by unwinding
    fn on_run_exit(&mut self) {}
}

/// Marks the engine running for the life of the guard
///
/// Dropping it puts the engine back in a consistent state even if an event
/// panicked mid-run.
pub(crate) struct RunGuard<'a, S: QueueState> {
    state: &'a Mutex<S>,
}

impl<'a, S: QueueState> RunGuard<'a, S> {
    pub fn enter(state: &'a Mutex<S>) -> Self {
        let mut st = state.lock();
        let queue = st.queue();
        assert!(!queue.running, "run: called from inside a running simulation");
        assert!(
            queue.phase != SimulatorState::Destroyed,
            "run: the simulator has been destroyed"
        );
        queue.running = true;
        queue.phase = SimulatorState::Running;
        debug!(pending = queue.unscheduled, now = %queue.now(), "simulation run starting");
        st.on_run_enter();
        drop(st);
        RunGuard { state }
    }
}

impl<S: QueueState> Drop for RunGuard<'_, S> {
    fn drop(&mut self) {
        let mut st = self.state.lock();
        st.on_run_exit();
        let queue = st.queue();
        queue.running = false;
        if queue.phase == SimulatorState::Running {
            queue.phase = SimulatorState::Stopped;
        }
    }
}

/// Run every destroy-time event, including ones queued while draining,
/// then drop whatever is left in the scheduler
pub(crate) fn destroy<S: QueueState>(state: &Mutex<S>) {
    {
        let mut st = state.lock();
        let queue = st.queue();
        if queue.phase == SimulatorState::Destroyed {
            return;
        }
        assert!(!queue.running, "destroy: called while the simulation is running");
        queue.destroying = true;
    }

    let mut drained = 0usize;
    loop {
        let next = state.lock().queue().pop_destroy();
        let Some(event) = next else { break };
        event.invoke();
        drained += 1;
    }

    let leftover = {
        let mut st = state.lock();
        let queue = st.queue();
        queue.destroying = false;
        queue.phase = SimulatorState::Destroyed;
        queue.drain()
    };
    debug!(drained, dropped = leftover.len(), "simulator destroyed");
    drop(leftover);
}

#[cfg(test)]
mod tests {
    use super::*;
    use nsim_core::make_event;
    use nsim_scheduler::MapScheduler;

    fn queue() -> EventQueue {
        EventQueue::new(Box::new(MapScheduler::new()))
    }

    #[test]
    fn test_uids_start_after_reserved_range() {
        let mut q = queue();
        let a = q.insert(0, 1, make_event(|| {}));
        let b = q.insert(0, 1, make_event(|| {}));
        assert_eq!(a.uid(), FIRST_UID);
        assert_eq!(b.uid(), FIRST_UID + 1);
        assert_eq!(q.unscheduled, 2);
    }

    #[test]
    fn test_dispatch_advances_clock() {
        let mut q = queue();
        let event = make_event(|| {});
        let id = q.insert(50, 9, event.clone());

        assert!(!q.is_expired(&id, Some(&event)));
        assert_eq!(q.delay_left(&id, Some(&event)), Time::from_step(50));

        let entry = q.dispatch_next().unwrap();
        assert_eq!(entry.key.uid, id.uid());
        assert_eq!(q.current_ts, 50);
        assert_eq!(q.current_context, 9);
        assert_eq!(q.event_count, 1);

        // The event being dispatched counts as expired.
        assert!(q.is_expired(&id, Some(&event)));
        assert_eq!(q.delay_left(&id, Some(&event)), Time::ZERO);
    }

    #[test]
    fn test_destroy_event_expiry() {
        let mut q = queue();
        let event = make_event(|| {});
        let id = q.insert_destroy(event.clone());

        assert!(id.is_destroy());
        assert!(!q.is_expired(&id, Some(&event)));

        q.pop_destroy();
        assert!(q.is_expired(&id, Some(&event)));
    }

    #[test]
    fn test_remove_and_drain() {
        let mut q = queue();
        let a = q.insert(10, 0, make_event(|| {}));
        q.insert(20, 0, make_event(|| {}));

        assert!(q.remove(&a).is_some());
        assert!(q.remove(&a).is_none());
        assert_eq!(q.unscheduled, 1);

        assert_eq!(q.drain().len(), 1);
        assert_eq!(q.unscheduled, 0);
        assert!(q.is_finished(false));
    }

    #[test]
    #[should_panic(expected = "has been destroyed")]
    fn test_insert_after_destroy_panics() {
        let mut q = queue();
        q.phase = SimulatorState::Destroyed;
        q.insert(0, 0, make_event(|| {}));
    }
}
