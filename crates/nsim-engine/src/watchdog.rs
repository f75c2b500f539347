//! Watchdog - deadline that pings push later
//!
//! Each [`ping`](Watchdog::ping) moves the deadline to `now + delay` if that
//! is later than the current one. Only one expiry event is ever queued: when
//! it fires before the deadline it re-arms itself for the remainder, so the
//! callback runs once, at the latest deadline requested.

use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use nsim_core::{EventId, Time};

use crate::Simulator;

type WatchdogCallback = Arc<dyn Fn() + Send + Sync>;

struct Inner {
    end: Time,
    event: EventId,
    callback: WatchdogCallback,
}

pub struct Watchdog {
    inner: Arc<Mutex<Inner>>,
}

impl Watchdog {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        Watchdog {
            inner: Arc::new(Mutex::new(Inner {
                end: Time::ZERO,
                event: EventId::null(),
                callback: Arc::new(f),
            })),
        }
    }

    /// Replace the callback run on expiry
    pub fn set_function<F>(&mut self, f: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.inner.lock().callback = Arc::new(f);
    }

    /// Require another ping within `delay`
    pub fn ping(&self, delay: Time) {
        let now = Simulator::now();
        let mut inner = self.inner.lock();
        inner.end = inner.end.max(now + delay);
        if Simulator::is_expired(&inner.event) {
            let remaining = inner.end - now;
            inner.event = schedule_expire(Arc::downgrade(&self.inner), remaining);
        }
    }

    /// Deadline currently in force
    pub fn deadline(&self) -> Time {
        self.inner.lock().end
    }

    /// A deadline is pending
    pub fn is_running(&self) -> bool {
        !Simulator::is_expired(&self.inner.lock().event)
    }
}

fn schedule_expire(inner: Weak<Mutex<Inner>>, delay: Time) -> EventId {
    Simulator::schedule(delay, move || expire(inner))
}

fn expire(inner: Weak<Mutex<Inner>>) {
    let Some(strong) = inner.upgrade() else {
        return;
    };
    let now = Simulator::now();
    let callback = {
        let mut guard = strong.lock();
        if guard.end != now {
            let remaining = guard.end - now;
            guard.event = schedule_expire(inner, remaining);
            return;
        }
        guard.callback.clone()
    };
    callback();
}

impl Drop for Watchdog {
    fn drop(&mut self) {
        let event = self.inner.lock().event.clone();
        Simulator::cancel(&event);
    }
}
