//! Simulator engine abstraction
//!
//! A [`SimulatorImpl`] owns a scheduler and the virtual clock, and drives the
//! dispatch loop. Every method takes `&self`: implementations keep their
//! state behind a lock that is released while an event body runs, so event
//! bodies can call back into the engine.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use nsim_core::{EventId, EventImpl, Time};
use nsim_scheduler::Scheduler;

/// Lifecycle of an engine
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SimulatorState {
    /// Built, `run` never called
    NotStarted,
    /// Inside `run`
    Running,
    /// `run` returned at least once
    Stopped,
    /// `destroy` completed; the engine accepts no more events
    Destroyed,
}

impl fmt::Display for SimulatorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SimulatorState::NotStarted => "not-started",
            SimulatorState::Running => "running",
            SimulatorState::Stopped => "stopped",
            SimulatorState::Destroyed => "destroyed",
        };
        f.write_str(s)
    }
}

/// Discrete-event engine
///
/// # Panics
/// Methods panic on programmer errors: negative delays, calling `run` from
/// inside an event, scheduling on a destroyed engine, removing a destroy-time
/// event, or cancelling one while the destroy list is being drained.
pub trait SimulatorImpl: Send + Sync {
    /// Type name, e.g. `"DefaultSimulatorImpl"`
    fn name(&self) -> &'static str;

    /// Queue `event` at `now + delay` in the current context
    fn schedule(&self, delay: Time, event: Arc<EventImpl>) -> EventId;

    /// Queue `event` at `now + delay` in `context`
    ///
    /// Safe to call from any thread; it only enqueues.
    fn schedule_with_context(&self, context: u32, delay: Time, event: Arc<EventImpl>);

    /// Queue `event` at `now`, after everything already due at `now`
    fn schedule_now(&self, event: Arc<EventImpl>) -> EventId;

    /// Queue `event` for [`destroy`](Self::destroy). `run` never executes it.
    fn schedule_destroy(&self, event: Arc<EventImpl>) -> EventId;

    /// Take a pending event out of the queue
    fn remove(&self, id: &EventId);

    /// Mark a pending event so it is skipped when its time comes
    fn cancel(&self, id: &EventId);

    fn is_expired(&self, id: &EventId) -> bool;

    /// Dispatch events until the queue drains or a stop condition holds
    fn run(&self);

    /// Make the current event the last one `run` dispatches
    fn stop(&self);

    /// Stop `run` before the first event due at or after `now + delay`
    fn stop_at(&self, delay: Time);

    fn now(&self) -> Time;

    /// Time until the event fires, zero if it is expired
    fn delay_left(&self, id: &EventId) -> Time;

    fn maximum_simulation_time(&self) -> Time {
        Time::MAX
    }

    /// Context of the event being dispatched
    fn context(&self) -> u32;

    /// Rank of this engine in a distributed run; always 0 here
    fn system_id(&self) -> u32 {
        0
    }

    /// No more events will run without outside help
    fn is_finished(&self) -> bool;

    /// Number of events dispatched so far
    fn event_count(&self) -> u64;

    /// Replace the scheduler, moving every queued event into the new one
    fn set_scheduler(&self, scheduler: Box<dyn Scheduler>);

    /// Run destroy-time events, then drop everything still queued
    fn destroy(&self);

    fn state(&self) -> SimulatorState;

    fn as_any(&self) -> &dyn Any;
}
