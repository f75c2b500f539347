//! Realtime engine
//!
//! Dispatches each event no earlier than its virtual timestamp maps to on the
//! wall clock. `run` keeps waiting for new events until `stop` is called, so
//! other threads can feed the simulation through `schedule_with_context` or
//! the `schedule_realtime*` family.

use std::any::Any;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, ThreadId};

use parking_lot::{Condvar, Mutex};
use tracing::{debug, trace, warn};

use nsim_core::{make_event, EventId, EventImpl, Time};
use nsim_scheduler::{Entry, Scheduler};

use crate::config::{SimulatorConfig, SynchronizationMode};
use crate::queue::{self, EventQueue, QueueState, RunGuard};
use crate::synchronizer::WallClockSynchronizer;
use crate::{SimulatorImpl, SimulatorState};

struct State {
    queue: EventQueue,
    synchronizer: WallClockSynchronizer,
    /// Thread executing `run`, if any
    loop_thread: Option<ThreadId>,
    stop: Arc<AtomicBool>,
}

impl State {
    /// The wall clock mapped to virtual time, which only advances while the
    /// loop runs
    fn realtime_ticks(&self) -> i64 {
        if self.loop_thread.is_some() {
            self.synchronizer.current_ticks()
        } else {
            self.queue.current_ts
        }
    }
}

impl QueueState for State {
    fn queue(&mut self) -> &mut EventQueue {
        &mut self.queue
    }

    fn on_run_enter(&mut self) {
        // Cleared under the same lock `stop` takes, so a stop issued once the
        // engine reports running is never lost.
        self.stop.store(false, Ordering::Release);
        self.loop_thread = Some(thread::current().id());
        let origin = self.queue.current_ts;
        self.synchronizer.set_origin(origin);
    }

    fn on_run_exit(&mut self) {
        self.loop_thread = None;
    }
}

pub struct RealtimeSimulatorImpl {
    state: Mutex<State>,
    wake: Condvar,
    stop: Arc<AtomicBool>,
    mode: SynchronizationMode,
    hard_limit: Time,
}

impl RealtimeSimulatorImpl {
    /// Best-effort engine backed by a [`MapScheduler`](nsim_scheduler::MapScheduler)
    pub fn new() -> Self {
        Self::with_config(&SimulatorConfig::realtime())
    }

    pub fn with_config(config: &SimulatorConfig) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        RealtimeSimulatorImpl {
            state: Mutex::new(State {
                queue: EventQueue::new(config.scheduler.build()),
                synchronizer: WallClockSynchronizer::new(),
                loop_thread: None,
                stop: stop.clone(),
            }),
            wake: Condvar::new(),
            stop,
            mode: config.synchronization_mode,
            hard_limit: config.hard_limit,
        }
    }

    pub fn with_scheduler(scheduler: Box<dyn Scheduler>) -> Self {
        let sim = Self::new();
        sim.set_scheduler(scheduler);
        sim
    }

    pub fn synchronization_mode(&self) -> SynchronizationMode {
        self.mode
    }

    pub fn hard_limit(&self) -> Time {
        self.hard_limit
    }

    /// Virtual time matching the wall clock right now; plain `now()` while
    /// `run` is not executing
    pub fn realtime_now(&self) -> Time {
        let st = self.state.lock();
        Time::from_step(st.realtime_ticks())
    }

    /// Queue at `realtime_now() + delay` in the current context
    pub fn schedule_realtime(&self, delay: Time, event: Arc<EventImpl>) -> EventId {
        let context = self.context();
        self.enqueue_realtime(context, delay, event)
    }

    pub fn schedule_realtime_with_context(&self, context: u32, delay: Time, event: Arc<EventImpl>) {
        self.enqueue_realtime(context, delay, event);
    }

    pub fn schedule_realtime_now(&self, event: Arc<EventImpl>) -> EventId {
        self.schedule_realtime(Time::ZERO, event)
    }

    pub fn schedule_realtime_now_with_context(&self, context: u32, event: Arc<EventImpl>) {
        self.enqueue_realtime(context, Time::ZERO, event);
    }

    fn enqueue_realtime(&self, context: u32, delay: Time, event: Arc<EventImpl>) -> EventId {
        assert!(delay.is_positive(), "schedule_realtime: negative delay {delay}");
        let id = {
            let mut st = self.state.lock();
            let mut ts = st.realtime_ticks().wrapping_add(delay.step());
            if ts < st.queue.current_ts {
                warn!(
                    requested = %Time::from_step(ts),
                    now = %st.queue.now(),
                    "realtime event falls behind the simulation clock, clamping"
                );
                ts = st.queue.current_ts;
            }
            st.queue.insert(ts, context, event)
        };
        self.wake.notify_all();
        id
    }

    /// Insert at the timestamp `ts_of` computes under the lock. `None` for
    /// `context` keeps the current one.
    fn enqueue(
        &self,
        ts_of: impl FnOnce(&State) -> i64,
        context: Option<u32>,
        event: Arc<EventImpl>,
    ) -> EventId {
        let id = {
            let mut st = self.state.lock();
            let ts = ts_of(&st);
            let context = context.unwrap_or(st.queue.current_context);
            st.queue.insert(ts, context, event)
        };
        self.wake.notify_all();
        id
    }

    /// Block until the next event is due, then pop it. `None` once stopped.
    fn wait_next(&self) -> Option<Entry> {
        let mut st = self.state.lock();
        loop {
            if self.stop.load(Ordering::Acquire) {
                return None;
            }
            let Some(ts) = st.queue.events.peek_next().map(|e| e.key.ts) else {
                self.wake.wait(&mut st);
                continue;
            };

            let wait = st.synchronizer.time_until(ts);
            if !wait.is_zero() {
                self.wake.wait_for(&mut st, wait);
                continue;
            }

            let late = st.synchronizer.current_ticks().wrapping_sub(ts);
            if self.mode == SynchronizationMode::HardLimit && late > self.hard_limit.step() {
                panic!(
                    "realtime hard limit exceeded: event at {} dispatched {} late (limit {})",
                    Time::from_step(ts),
                    Time::from_step(late),
                    self.hard_limit
                );
            }
            return st.queue.dispatch_next();
        }
    }
}

impl Default for RealtimeSimulatorImpl {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatorImpl for RealtimeSimulatorImpl {
    fn name(&self) -> &'static str {
        "RealtimeSimulatorImpl"
    }

    fn schedule(&self, delay: Time, event: Arc<EventImpl>) -> EventId {
        assert!(delay.is_positive(), "schedule: negative delay {delay}");
        self.enqueue(
            |st| st.queue.current_ts.wrapping_add(delay.step()),
            None,
            event,
        )
    }

    /// From the loop thread, or while not running, this stamps relative to
    /// virtual now. From any other thread during `run` it stamps relative to
    /// the wall clock.
    fn schedule_with_context(&self, context: u32, delay: Time, event: Arc<EventImpl>) {
        assert!(delay.is_positive(), "schedule_with_context: negative delay {delay}");
        let me = thread::current().id();
        self.enqueue(
            |st| {
                let foreign = st.loop_thread.is_some_and(|t| t != me);
                let base = if foreign {
                    st.synchronizer.current_ticks().max(st.queue.current_ts)
                } else {
                    st.queue.current_ts
                };
                base.wrapping_add(delay.step())
            },
            Some(context),
            event,
        );
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

        let mut processed = 0u64;
        while let Some(entry) = self.wait_next() {
            trace!(ts = entry.key.ts, context = entry.key.context, uid = entry.key.uid, "dispatch");
            entry.event.invoke();
            processed += 1;
        }

        debug!(processed, now = %self.now(), "realtime run finished");
    }

    fn stop(&self) {
        // Under the lock so a waiting loop cannot miss the wakeup.
        let _st = self.state.lock();
        self.stop.store(true, Ordering::Release);
        self.wake.notify_all();
    }

    fn stop_at(&self, delay: Time) {
        assert!(delay.is_positive(), "stop_at: negative delay {delay}");
        let flag = self.stop.clone();
        self.schedule(delay, make_event(move || flag.store(true, Ordering::Release)));
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
        st.queue.is_finished(self.stop.load(Ordering::Acquire))
    }

    fn event_count(&self) -> u64 {
        self.state.lock().queue.event_count
    }

    fn set_scheduler(&self, scheduler: Box<dyn Scheduler>) {
        let name = scheduler.name();
        let old = self.state.lock().queue.replace_scheduler(scheduler);
        self.wake.notify_all();
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
