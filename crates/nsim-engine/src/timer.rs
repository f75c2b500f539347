//! Timer - reschedulable one-shot on the global simulator
//!
//! A [`Timer`] remembers a callback and a delay, so the same expiry can be
//! armed again and again. It can be suspended, keeping the delay that was
//! left, and resumed later. What happens to a pending expiry when the timer
//! is dropped is set by its [`DestroyPolicy`].

use std::fmt;
use std::sync::Arc;

use nsim_core::{EventId, Time};

use crate::Simulator;

/// What dropping a [`Timer`] does to its pending expiry
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum DestroyPolicy {
    /// Cancel the pending event
    CancelOnDestroy,
    /// Remove the pending event from the queue
    RemoveOnDestroy,
    /// Panic if the timer is still running
    #[default]
    CheckOnDestroy,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TimerState {
    Running,
    Expired,
    Suspended,
}

impl fmt::Display for TimerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TimerState::Running => "running",
            TimerState::Expired => "expired",
            TimerState::Suspended => "suspended",
        };
        f.write_str(s)
    }
}

type TimerCallback = Arc<dyn Fn() + Send + Sync>;

pub struct Timer {
    policy: DestroyPolicy,
    callback: TimerCallback,
    delay: Time,
    /// Delay left when suspended
    delay_left: Time,
    suspended: bool,
    event: EventId,
}

impl Timer {
    /// Timer with the [`CheckOnDestroy`](DestroyPolicy::CheckOnDestroy) policy
    pub fn new<F>(f: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        Self::with_policy(DestroyPolicy::default(), f)
    }

    pub fn with_policy<F>(policy: DestroyPolicy, f: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        Timer {
            policy,
            callback: Arc::new(f),
            delay: Time::ZERO,
            delay_left: Time::ZERO,
            suspended: false,
            event: EventId::null(),
        }
    }

    /// Replace the callback used by later expiries
    pub fn set_function<F>(&mut self, f: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.callback = Arc::new(f);
    }

    pub fn policy(&self) -> DestroyPolicy {
        self.policy
    }

    /// Delay used by [`schedule`](Self::schedule)
    pub fn set_delay(&mut self, delay: Time) {
        self.delay = delay;
    }

    pub fn delay(&self) -> Time {
        self.delay
    }

    /// Time until expiry: zero when expired, the saved remainder when
    /// suspended
    pub fn delay_left(&self) -> Time {
        match self.state() {
            TimerState::Running => Simulator::delay_left(&self.event),
            TimerState::Expired => Time::ZERO,
            TimerState::Suspended => self.delay_left,
        }
    }

    /// Arm the timer with its configured delay
    pub fn schedule(&mut self) {
        self.schedule_in(self.delay);
    }

    /// Arm the timer to expire after `delay`
    ///
    /// # Panics
    /// If the timer is already running.
    pub fn schedule_in(&mut self, delay: Time) {
        assert!(
            Simulator::is_expired(&self.event),
            "timer: still running while re-scheduling"
        );
        let callback = self.callback.clone();
        self.event = Simulator::schedule(delay, move || callback());
    }

    pub fn cancel(&mut self) {
        Simulator::cancel(&self.event);
    }

    pub fn remove(&mut self) {
        Simulator::remove(&self.event);
    }

    pub fn is_expired(&self) -> bool {
        !self.suspended && Simulator::is_expired(&self.event)
    }

    pub fn is_running(&self) -> bool {
        !self.suspended && !Simulator::is_expired(&self.event)
    }

    pub fn is_suspended(&self) -> bool {
        self.suspended
    }

    pub fn state(&self) -> TimerState {
        if self.suspended {
            TimerState::Suspended
        } else if Simulator::is_expired(&self.event) {
            TimerState::Expired
        } else {
            TimerState::Running
        }
    }

    /// Pull the pending expiry out of the queue, remembering the delay left
    ///
    /// # Panics
    /// If the timer is not running.
    pub fn suspend(&mut self) {
        assert!(self.is_running(), "timer: suspend called on a timer that is not running");
        self.delay_left = Simulator::delay_left(&self.event);
        Simulator::remove(&self.event);
        self.suspended = true;
    }

    /// Re-arm with the delay saved by [`suspend`](Self::suspend)
    ///
    /// # Panics
    /// If the timer is not suspended.
    pub fn resume(&mut self) {
        assert!(self.suspended, "timer: resume called on a timer that is not suspended");
        let callback = self.callback.clone();
        self.event = Simulator::schedule(self.delay_left, move || callback());
        self.suspended = false;
    }
}

impl fmt::Debug for Timer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Timer")
            .field("policy", &self.policy)
            .field("delay", &self.delay)
            .field("suspended", &self.suspended)
            .field("event", &self.event)
            .finish()
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        match self.policy {
            DestroyPolicy::CancelOnDestroy => Simulator::cancel(&self.event),
            DestroyPolicy::RemoveOnDestroy => Simulator::remove(&self.event),
            DestroyPolicy::CheckOnDestroy => {
                if self.is_running() && !std::thread::panicking() {
                    panic!("timer: still running while being destroyed");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SimulatorConfig;
    use parking_lot::Mutex;
    use serial_test::serial;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn reset() {
        Simulator::destroy();
        Simulator::configure(SimulatorConfig::default());
    }

    fn counter() -> (Arc<AtomicUsize>, impl Fn() + Send + Sync + 'static) {
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        (count, move || {
            c.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    #[serial]
    fn test_schedule_and_expire() {
        reset();
        let (count, f) = counter();
        let mut timer = Timer::new(f);
        timer.set_delay(Time::seconds(2.0));
        assert_eq!(timer.state(), TimerState::Expired);

        timer.schedule();
        assert_eq!(timer.state(), TimerState::Running);
        assert_eq!(timer.delay_left(), Time::seconds(2.0));

        Simulator::run();
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(timer.is_expired());
        assert_eq!(timer.delay_left(), Time::ZERO);

        // Expired timers re-arm with the same callback.
        timer.schedule_in(Time::seconds(1.0));
        Simulator::run();
        assert_eq!(count.load(Ordering::SeqCst), 2);
        assert_eq!(Simulator::now(), Time::seconds(3.0));
        Simulator::destroy();
    }

    #[test]
    #[serial]
    fn test_suspend_resume() {
        reset();
        let fired_at = Arc::new(Mutex::new(None));
        let f = fired_at.clone();
        let timer = Arc::new(Mutex::new(Timer::new(move || {
            *f.lock() = Some(Simulator::now());
        })));
        timer.lock().schedule_in(Time::seconds(10.0));

        let t = timer.clone();
        Simulator::schedule(Time::seconds(4.0), move || t.lock().suspend());
        let t = timer.clone();
        Simulator::schedule(Time::seconds(20.0), move || {
            assert_eq!(t.lock().delay_left(), Time::seconds(6.0));
            assert!(t.lock().is_suspended());
            t.lock().resume();
        });

        Simulator::run();
        assert_eq!(*fired_at.lock(), Some(Time::seconds(26.0)));
        assert_eq!(timer.lock().state(), TimerState::Expired);
        Simulator::destroy();
    }

    #[test]
    #[serial]
    fn test_cancel_and_remove() {
        reset();
        let (count, f) = counter();
        let mut timer = Timer::new(f);
        timer.schedule_in(Time::seconds(1.0));
        timer.cancel();
        assert!(timer.is_expired());

        timer.schedule_in(Time::seconds(1.0));
        timer.remove();
        assert!(timer.is_expired());

        Simulator::run();
        assert_eq!(count.load(Ordering::SeqCst), 0);
        Simulator::destroy();
    }

    #[test]
    #[serial]
    fn test_drop_policies() {
        reset();
        let (count, f) = counter();
        let mut cancelled = Timer::with_policy(DestroyPolicy::CancelOnDestroy, f);
        cancelled.schedule_in(Time::seconds(1.0));
        drop(cancelled);

        let (removed_count, g) = counter();
        let mut removed = Timer::with_policy(DestroyPolicy::RemoveOnDestroy, g);
        removed.schedule_in(Time::seconds(1.0));
        drop(removed);

        Simulator::run();
        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert_eq!(removed_count.load(Ordering::SeqCst), 0);
        // The cancelled expiry is still dequeued; the removed one is gone.
        assert_eq!(Simulator::event_count(), 1);
        Simulator::destroy();
    }

    #[test]
    #[serial]
    #[should_panic(expected = "still running while being destroyed")]
    fn test_check_on_destroy_panics_when_running() {
        reset();
        let mut timer = Timer::new(|| {});
        timer.schedule_in(Time::seconds(1.0));
        drop(timer);
    }

    #[test]
    #[serial]
    #[should_panic(expected = "still running while re-scheduling")]
    fn test_reschedule_while_running_panics() {
        reset();
        let mut timer = Timer::with_policy(DestroyPolicy::CancelOnDestroy, || {});
        timer.schedule_in(Time::seconds(1.0));
        timer.schedule_in(Time::seconds(2.0));
    }

    #[test]
    #[serial]
    fn test_set_function_applies_to_later_expiries() {
        reset();
        let (first, f) = counter();
        let (second, g) = counter();
        let mut timer = Timer::new(f);
        timer.schedule_in(Time::seconds(1.0));

        // The pending expiry keeps the callback it was armed with.
        timer.set_function(g);
        Simulator::run();
        assert_eq!(first.load(Ordering::SeqCst), 1);
        assert_eq!(second.load(Ordering::SeqCst), 0);

        timer.schedule_in(Time::seconds(1.0));
        Simulator::run();
        assert_eq!(first.load(Ordering::SeqCst), 1);
        assert_eq!(second.load(Ordering::SeqCst), 1);
        Simulator::destroy();
    }
}
