//! Default single-threaded engine
//!
//! Events run back to back in virtual time with no relation to the wall
//! clock. Other threads may enqueue through `schedule_with_context`; the
//! dispatch loop itself runs on whichever thread calls `run`.

use std::any::Any;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, trace};

use nsim_core::{EventId, EventImpl, Time};
use nsim_scheduler::{Entry, MapScheduler, Scheduler};

use crate::queue::{self, EventQueue, QueueState, RunGuard};
use crate::{SimulatorImpl, SimulatorState};

struct State {
    queue: EventQueue,
    stop: bool,
    /// Absolute tick before which `run` must return
    stop_at: Option<i64>,
}

pub struct DefaultSimulatorImpl {
    state: Mutex<State>,
}

impl DefaultSimulatorImpl {
    /// Engine backed by a [`MapScheduler`]
    pub fn new() -> Self {
        Self::with_scheduler(Box::new(MapScheduler::new()))
    }

    pub fn with_scheduler(scheduler: Box<dyn Scheduler>) -> Self {
        DefaultSimulatorImpl {
            state: Mutex::new(State {
                queue: EventQueue::new(scheduler),
                stop: false,
                stop_at: None,
            }),
        }
    }

    /// Events queued and not yet dispatched or removed
    pub fn pending(&self) -> usize {
        self.state.lock().queue.unscheduled
    }

    fn next_event(&self) -> Option<Entry> {
        let mut st = self.state.lock();
        if st.stop {
            return None;
        }
        let next_ts = st.queue.events.peek_next()?.key.ts;
        if st.stop_at.is_some_and(|limit| next_ts >= limit) {
            return None;
        }
        st.queue.dispatch_next()
    }
}

impl Default for DefaultSimulatorImpl {
    fn default() -> Self {
        Self::new()
    }
}

impl QueueState for State {
    fn queue(&mut self) -> &mut EventQueue {
        &mut self.queue
    }

    fn on_run_exit(&mut self) {
        self.stop_at = None;
    }
}

impl SimulatorImpl for DefaultSimulatorImpl {
    fn name(&self) -> &'static str {
        "DefaultSimulatorImpl"
    }

    fn schedule(&self, delay: Time, event: Arc<EventImpl>) -> EventId {
        assert!(delay.is_positive(), "schedule: negative delay {delay}");
        let mut st = self.state.lock();
        let ts = st.queue.current_ts.wrapping_add(delay.step());
        let context = st.queue.current_context;
        st.queue.insert(ts, context, event)
    }

    fn schedule_with_context(&self, context: u32, delay: Time, event: Arc<EventImpl>) {
        assert!(delay.is_positive(), "schedule_with_context: negative delay {delay}");
        let mut st = self.state.lock();
        let ts = st.queue.current_ts.wrapping_add(delay.step());
        st.queue.insert(ts, context, event);
    }

    fn schedule_now(&self, event: Arc<EventImpl>) -> EventId {
        self.schedule(Time::ZERO, event)
    }

    fn schedule_destroy(&self, event: Arc<EventImpl>) -> EventId {
        self.state.lock().queue.insert_destroy(event)
    }

    fn remove(&self, id: &EventId) {
        if id.is_destroy() {
            panic!("remove: destroy-time events cannot be removed, cancel them instead");
        }
        let event = id.peek_event();
        let removed = {
            let mut st = self.state.lock();
            if st.queue.is_expired(id, event.as_ref()) {
                return;
            }
            st.queue.remove(id)
        };
        if let Some(entry) = removed {
            entry.event.cancel();
        }
    }

    fn cancel(&self, id: &EventId) {
        let event = id.peek_event();
        let expired = {
            let st = self.state.lock();
            if id.is_destroy() && st.queue.destroying {
                panic!("cancel: destroy-time events are being drained");
            }
            st.queue.is_expired(id, event.as_ref())
        };
        if !expired {
            id.cancel();
        }
    }

    fn is_expired(&self, id: &EventId) -> bool {
        let event = id.peek_event();
        let st = self.state.lock();
        st.queue.is_expired(id, event.as_ref())
    }

    fn run(&self) {
        let _guard = RunGuard::enter(&self.state);
        self.state.lock().stop = false;

        let mut processed = 0u64;
        while let Some(entry) = self.next_event() {
            trace!(ts = entry.key.ts, context = entry.key.context, uid = entry.key.uid, "dispatch");
            entry.event.invoke();
            processed += 1;
        }

        debug!(processed, now = %self.now(), "simulation run finished");
    }

    fn stop(&self) {
        self.state.lock().stop = true;
    }

    fn stop_at(&self, delay: Time) {
        assert!(delay.is_positive(), "stop_at: negative delay {delay}");
        let mut st = self.state.lock();
        let limit = st.queue.current_ts.wrapping_add(delay.step());
        // The earliest pending stop time wins.
        st.stop_at = Some(st.stop_at.map_or(limit, |current| current.min(limit)));
    }

    fn now(&self) -> Time {
        self.state.lock().queue.now()
    }

    fn delay_left(&self, id: &EventId) -> Time {
        let event = id.peek_event();
        let st = self.state.lock();
        st.queue.delay_left(id, event.as_ref())
    }

    fn context(&self) -> u32 {
        self.state.lock().queue.current_context
    }

    fn is_finished(&self) -> bool {
        let st = self.state.lock();
        st.queue.is_finished(st.stop)
    }

    fn event_count(&self) -> u64 {
        self.state.lock().queue.event_count
    }

    fn set_scheduler(&self, scheduler: Box<dyn Scheduler>) {
        let name = scheduler.name();
        let old = self.state.lock().queue.replace_scheduler(scheduler);
        debug!(from = old.name(), to = name, "scheduler replaced");
    }

    fn destroy(&self) {
        queue::destroy(&self.state);
    }

    fn state(&self) -> SimulatorState {
        self.state.lock().queue.phase
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
