//! Global simulator facade
//!
//! Process-wide access to one lazily built [`SimulatorImpl`]. The first call
//! that needs an engine builds it from the configuration given to
//! [`Simulator::configure`], or from `NSIM_GLOBAL_VALUE`, or from defaults.
//! [`Simulator::destroy`] tears it down; the next call builds a fresh one, so
//! one process can run several simulations back to back.
//!
//! ```no_run
//! use nsim_core::Time;
//! use nsim_engine::Simulator;
//!
//! Simulator::schedule(Time::seconds(1.0), || println!("at {}", Simulator::now()));
//! Simulator::run();
//! Simulator::destroy();
//! ```

use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::debug;

use nsim_core::{make_event, make_event_with, Callable, EventId, EventImpl, Time};
use nsim_scheduler::SchedulerType;

use crate::{RealtimeSimulatorImpl, SimulatorConfig, SimulatorImpl};

static IMPL: RwLock<Option<Arc<dyn SimulatorImpl>>> = parking_lot::const_rwlock(None);
static CONFIG: Mutex<Option<SimulatorConfig>> = parking_lot::const_mutex(None);

/// Static entry points onto the global engine
pub struct Simulator;

impl Simulator {
    /// Choose the engine the facade builds on first use
    ///
    /// # Panics
    /// If the engine already exists.
    pub fn configure(config: SimulatorConfig) {
        let slot = IMPL.read();
        assert!(
            slot.is_none(),
            "configure: the simulator implementation is already in use"
        );
        *CONFIG.lock() = Some(config);
    }

    /// Install a caller-built engine
    ///
    /// # Panics
    /// If the engine already exists.
    pub fn set_implementation(engine: Arc<dyn SimulatorImpl>) {
        let mut slot = IMPL.write();
        assert!(
            slot.is_none(),
            "set_implementation: the simulator implementation is already in use"
        );
        debug!(implementation = engine.name(), "simulator implementation installed");
        *slot = Some(engine);
    }

    /// The global engine, built on first use
    pub fn implementation() -> Arc<dyn SimulatorImpl> {
        if let Some(engine) = IMPL.read().as_ref() {
            return engine.clone();
        }

        let mut slot = IMPL.write();
        if let Some(engine) = slot.as_ref() {
            return engine.clone();
        }
        let configured = CONFIG.lock().clone();
        let config = match configured {
            Some(config) => config,
            None => SimulatorConfig::from_env()
                .unwrap_or_else(|err| panic!("invalid simulator configuration: {err}")),
        };
        let engine = config.build();
        debug!(
            implementation = engine.name(),
            scheduler = %config.scheduler,
            "simulator implementation created"
        );
        *slot = Some(engine.clone());
        engine
    }

    /// The global engine if one exists, without building it
    fn peek() -> Option<Arc<dyn SimulatorImpl>> {
        IMPL.read().clone()
    }

    pub fn schedule<F>(delay: Time, f: F) -> EventId
    where
        F: FnOnce() + Send + 'static,
    {
        Self::schedule_event(delay, make_event(f))
    }

    /// Schedule `f(args...)`; `args` is a tuple of up to six values
    pub fn schedule_with<F, Args>(delay: Time, f: F, args: Args) -> EventId
    where
        F: Callable<Args>,
        Args: Send + 'static,
    {
        Self::schedule_event(delay, make_event_with(f, args))
    }

    pub fn schedule_event(delay: Time, event: Arc<EventImpl>) -> EventId {
        Self::implementation().schedule(delay, event)
    }

    pub fn schedule_now<F>(f: F) -> EventId
    where
        F: FnOnce() + Send + 'static,
    {
        Self::schedule_now_event(make_event(f))
    }

    pub fn schedule_now_event(event: Arc<EventImpl>) -> EventId {
        Self::implementation().schedule_now(event)
    }

    /// Schedule in another context; safe from any thread
    pub fn schedule_with_context<F>(context: u32, delay: Time, f: F)
    where
        F: FnOnce() + Send + 'static,
    {
        Self::schedule_with_context_event(context, delay, make_event(f));
    }

    pub fn schedule_with_context_event(context: u32, delay: Time, event: Arc<EventImpl>) {
        Self::implementation().schedule_with_context(context, delay, event);
    }

    pub fn schedule_destroy<F>(f: F) -> EventId
    where
        F: FnOnce() + Send + 'static,
    {
        Self::schedule_destroy_event(make_event(f))
    }

    pub fn schedule_destroy_event(event: Arc<EventImpl>) -> EventId {
        Self::implementation().schedule_destroy(event)
    }

    /// No-op when no engine exists
    pub fn cancel(id: &EventId) {
        if let Some(engine) = Self::peek() {
            engine.cancel(id);
        }
    }

    /// No-op when no engine exists
    pub fn remove(id: &EventId) {
        if let Some(engine) = Self::peek() {
            engine.remove(id);
        }
    }

    /// Always true when no engine exists
    pub fn is_expired(id: &EventId) -> bool {
        match Self::peek() {
            Some(engine) => engine.is_expired(id),
            None => true,
        }
    }

    pub fn delay_left(id: &EventId) -> Time {
        match Self::peek() {
            Some(engine) => engine.delay_left(id),
            None => Time::ZERO,
        }
    }

    pub fn now() -> Time {
        Self::implementation().now()
    }

    pub fn maximum_simulation_time() -> Time {
        Self::implementation().maximum_simulation_time()
    }

    pub fn context() -> u32 {
        Self::implementation().context()
    }

    pub fn system_id() -> u32 {
        Self::implementation().system_id()
    }

    pub fn is_finished() -> bool {
        Self::implementation().is_finished()
    }

    pub fn event_count() -> u64 {
        Self::implementation().event_count()
    }

    pub fn run() {
        Self::implementation().run();
    }

    pub fn stop() {
        Self::implementation().stop();
    }

    pub fn stop_at(delay: Time) {
        Self::implementation().stop_at(delay);
    }

    pub fn set_scheduler(scheduler: SchedulerType) {
        Self::implementation().set_scheduler(scheduler.build());
    }

    /// Run destroy-time events and drop the engine
    ///
    /// The engine stays installed while its destroy-time events run, so they
    /// can still query the facade.
    pub fn destroy() {
        let Some(engine) = Self::peek() else {
            return;
        };
        engine.destroy();
        *IMPL.write() = None;
        debug!(implementation = engine.name(), "simulator implementation released");
    }

    /// # Panics
    /// If the global engine is not a [`RealtimeSimulatorImpl`].
    pub fn schedule_realtime<F>(delay: Time, f: F) -> EventId
    where
        F: FnOnce() + Send + 'static,
    {
        with_realtime("schedule_realtime", |rt| rt.schedule_realtime(delay, make_event(f)))
    }

    pub fn schedule_realtime_now<F>(f: F) -> EventId
    where
        F: FnOnce() + Send + 'static,
    {
        with_realtime("schedule_realtime_now", |rt| rt.schedule_realtime_now(make_event(f)))
    }

    pub fn schedule_realtime_with_context<F>(context: u32, delay: Time, f: F)
    where
        F: FnOnce() + Send + 'static,
    {
        with_realtime("schedule_realtime_with_context", |rt| {
            rt.schedule_realtime_with_context(context, delay, make_event(f))
        });
    }

    pub fn realtime_now() -> Time {
        with_realtime("realtime_now", |rt| rt.realtime_now())
    }
}

fn with_realtime<R>(op: &str, f: impl FnOnce(&RealtimeSimulatorImpl) -> R) -> R {
    let engine = Simulator::implementation();
    match engine.as_any().downcast_ref::<RealtimeSimulatorImpl>() {
        Some(rt) => f(rt),
        None => panic!("{op}: requires RealtimeSimulatorImpl, found {}", engine.name()),
    }
}

/// Current virtual time of the global engine
pub fn now() -> Time {
    Simulator::now()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{DefaultSimulatorImpl, SimulatorState};
    use serial_test::serial;
    use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

    fn init_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_test_writer()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .try_init();
    }

    fn same(a: &Arc<dyn SimulatorImpl>, b: &Arc<dyn SimulatorImpl>) -> bool {
        Arc::as_ptr(a) as *const () == Arc::as_ptr(b) as *const ()
    }

    fn reset() {
        init_tracing();
        Simulator::destroy();
        Simulator::configure(SimulatorConfig::default());
    }

    #[test]
    #[serial]
    fn test_events_run_in_order() {
        reset();
        let seen = Arc::new(Mutex::new(Vec::new()));
        for (secs, tag) in [(5.0, 'a'), (3.0, 'b'), (3.0, 'c'), (1.0, 'd')] {
            let seen = seen.clone();
            Simulator::schedule(Time::seconds(secs), move || {
                seen.lock().push((tag, now()));
            });
        }

        Simulator::run();

        assert_eq!(
            *seen.lock(),
            vec![
                ('d', Time::seconds(1.0)),
                ('b', Time::seconds(3.0)),
                ('c', Time::seconds(3.0)),
                ('a', Time::seconds(5.0)),
            ]
        );
        assert!(Simulator::is_finished());
        assert_eq!(Simulator::event_count(), 4);
        Simulator::destroy();
    }

    #[test]
    #[serial]
    fn test_schedule_with_arguments() {
        reset();
        let total = Arc::new(AtomicU64::new(0));
        Simulator::schedule_with(
            Time::millis(1),
            |total: Arc<AtomicU64>, a: u64, b: u64| {
                total.fetch_add(a * b, Ordering::SeqCst);
            },
            (total.clone(), 6u64, 7u64),
        );

        Simulator::run();
        assert_eq!(total.load(Ordering::SeqCst), 42);
        Simulator::destroy();
    }

    #[test]
    #[serial]
    fn test_cancel_and_delay_left() {
        reset();
        let hit = Arc::new(AtomicBool::new(false));
        let h = hit.clone();
        let id = Simulator::schedule(Time::seconds(2.0), move || h.store(true, Ordering::SeqCst));

        assert_eq!(Simulator::delay_left(&id), Time::seconds(2.0));
        Simulator::cancel(&id);
        Simulator::cancel(&id);
        assert!(Simulator::is_expired(&id));
        assert_eq!(Simulator::delay_left(&id), Time::ZERO);

        Simulator::run();
        assert!(!hit.load(Ordering::SeqCst));
        Simulator::destroy();
    }

    #[test]
    #[serial]
    fn test_stop_at() {
        reset();
        let fired = Arc::new(Mutex::new(Vec::new()));
        for secs in [3.0, 7.0] {
            let fired = fired.clone();
            Simulator::schedule(Time::seconds(secs), move || fired.lock().push(secs));
        }
        Simulator::stop_at(Time::seconds(5.0));
        Simulator::run();

        assert_eq!(*fired.lock(), vec![3.0]);
        assert!(!Simulator::is_finished());
        Simulator::destroy();
    }

    #[test]
    #[serial]
    fn test_destroy_then_rebuild() {
        reset();
        let ran = Arc::new(AtomicBool::new(false));
        let r = ran.clone();
        Simulator::schedule(Time::seconds(1.0), || {});
        Simulator::schedule_destroy(move || {
            // The facade still answers while destroy-time events run.
            assert_eq!(now(), Time::seconds(1.0));
            r.store(true, Ordering::SeqCst);
        });
        Simulator::run();

        let first = Simulator::implementation();
        Simulator::destroy();
        assert!(ran.load(Ordering::SeqCst));
        assert_eq!(first.state(), SimulatorState::Destroyed);

        assert_eq!(Simulator::now(), Time::ZERO);
        let second = Simulator::implementation();
        assert!(!same(&first, &second));
        assert_eq!(second.state(), SimulatorState::NotStarted);
        Simulator::destroy();
    }

    #[test]
    #[serial]
    fn test_stale_handles_after_destroy() {
        reset();
        let id = Simulator::schedule(Time::seconds(1.0), || panic!("never runs"));
        Simulator::destroy();

        assert!(Simulator::is_expired(&id));
        Simulator::cancel(&id);
        Simulator::remove(&id);
        assert_eq!(Simulator::delay_left(&id), Time::ZERO);
        assert!(Simulator::is_expired(&EventId::null()));
    }

    #[test]
    #[serial]
    fn test_configured_scheduler_and_swap() {
        reset();
        Simulator::configure(SimulatorConfig::parse("SchedulerType=CalendarScheduler").unwrap());

        let seen = Arc::new(Mutex::new(Vec::new()));
        for ms in [30i64, 10, 20] {
            let seen = seen.clone();
            Simulator::schedule(Time::millis(ms), move || seen.lock().push(ms));
        }
        Simulator::set_scheduler(SchedulerType::Heap);
        Simulator::run();

        assert_eq!(*seen.lock(), vec![10, 20, 30]);
        assert_eq!(Simulator::implementation().name(), "DefaultSimulatorImpl");
        Simulator::destroy();
    }

    #[test]
    #[serial]
    fn test_context_from_event() {
        reset();
        let seen = Arc::new(AtomicU64::new(0));
        let s = seen.clone();
        Simulator::schedule_with_context(12, Time::ZERO, move || {
            s.store(u64::from(Simulator::context()), Ordering::SeqCst);
        });
        Simulator::run();

        assert_eq!(seen.load(Ordering::SeqCst), 12);
        assert_eq!(Simulator::system_id(), 0);
        assert_eq!(Simulator::maximum_simulation_time(), Time::MAX);
        Simulator::destroy();
    }

    #[test]
    #[serial]
    fn test_set_implementation() {
        reset();
        let engine: Arc<dyn SimulatorImpl> = Arc::new(DefaultSimulatorImpl::new());
        Simulator::set_implementation(engine.clone());

        Simulator::schedule_now(|| {});
        assert!(same(&Simulator::implementation(), &engine));
        Simulator::destroy();
    }

    #[test]
    #[serial]
    #[should_panic(expected = "already in use")]
    fn test_set_implementation_after_use_is_fatal() {
        reset();
        Simulator::now();
        Simulator::set_implementation(Arc::new(DefaultSimulatorImpl::new()));
    }

    #[test]
    #[serial]
    #[should_panic(expected = "requires RealtimeSimulatorImpl")]
    fn test_realtime_helpers_need_realtime_engine() {
        reset();
        Simulator::realtime_now();
    }

    #[test]
    #[serial]
    fn test_realtime_facade() {
        reset();
        Simulator::configure(SimulatorConfig::realtime());

        let hit = Arc::new(AtomicBool::new(false));
        let h = hit.clone();
        Simulator::schedule_realtime(Time::millis(2), move || {
            h.store(true, Ordering::SeqCst);
            Simulator::stop();
        });
        Simulator::run();

        assert!(hit.load(Ordering::SeqCst));
        assert!(Simulator::realtime_now() >= Time::millis(2));
        Simulator::destroy();
    }
}
