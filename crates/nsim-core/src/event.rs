//! Events - deferred calls owned by the engine
//!
//! An [`EventImpl`] wraps a one-shot callback plus a cancellation flag. While
//! an event is queued the scheduler holds the only strong reference; handles
//! ([`EventId`](crate::EventId)) point at it weakly.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

type Callback = Box<dyn FnOnce() + Send + 'static>;

/// A schedulable unit of work
pub struct EventImpl {
    cancelled: AtomicBool,
    callback: Mutex<Option<Callback>>,
}

impl EventImpl {
    pub fn new<F>(f: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        EventImpl {
            cancelled: AtomicBool::new(false),
            callback: Mutex::new(Some(Box::new(f))),
        }
    }

    /// Run the callback unless the event was cancelled. The callback runs at
    /// most once and without any internal lock held, so it may freely touch
    /// its own event.
    pub fn invoke(&self) {
        if self.is_cancelled() {
            return;
        }
        let callback = self.callback.lock().take();
        if let Some(callback) = callback {
            callback();
        }
    }

    #[inline]
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// The callback has already run
    pub fn is_consumed(&self) -> bool {
        self.callback.lock().is_none()
    }
}

impl fmt::Debug for EventImpl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventImpl")
            .field("cancelled", &self.is_cancelled())
            .field("consumed", &self.is_consumed())
            .finish()
    }
}

/// Wrap a closure in an event
pub fn make_event<F>(f: F) -> Arc<EventImpl>
where
    F: FnOnce() + Send + 'static,
{
    Arc::new(EventImpl::new(f))
}

/// Something callable with a tuple of bound arguments
pub trait Callable<Args>: Send + 'static {
    fn call(self, args: Args);
}

macro_rules! impl_callable {
    ($($arg:ident),*) => {
        impl<Func, $($arg),*> Callable<($($arg,)*)> for Func
        where
            Func: FnOnce($($arg),*) + Send + 'static,
        {
            #[allow(non_snake_case)]
            fn call(self, args: ($($arg,)*)) {
                let ($($arg,)*) = args;
                self($($arg),*)
            }
        }
    };
}

impl_callable!();
impl_callable!(A1);
impl_callable!(A1, A2);
impl_callable!(A1, A2, A3);
impl_callable!(A1, A2, A3, A4);
impl_callable!(A1, A2, A3, A4, A5);
impl_callable!(A1, A2, A3, A4, A5, A6);

/// Wrap a function and up to six arguments in an event. The arguments are
/// moved in now, so later changes by the caller are not seen at invocation.
pub fn make_event_with<F, Args>(f: F, args: Args) -> Arc<EventImpl>
where
    F: Callable<Args>,
    Args: Send + 'static,
{
    make_event(move || f.call(args))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_invoke_runs_once() {
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        let event = make_event(move || {
            c.fetch_add(1, Ordering::SeqCst);
        });

        assert!(!event.is_consumed());
        event.invoke();
        event.invoke();

        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(event.is_consumed());
    }

    #[test]
    fn test_cancelled_event_does_not_run() {
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        let event = make_event(move || {
            c.fetch_add(1, Ordering::SeqCst);
        });

        event.cancel();
        event.invoke();

        assert!(event.is_cancelled());
        assert!(!event.is_consumed());
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_arguments_are_bound_by_value() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut value = 1;
        let event = make_event_with(
            {
                let seen = seen.clone();
                move |v: i32, label: &'static str| seen.lock().push((v, label))
            },
            (value, "first"),
        );
        value = 2;

        event.invoke();

        assert_eq!(value, 2);
        assert_eq!(*seen.lock(), vec![(1, "first")]);
    }

    #[test]
    fn test_six_arguments() {
        let total = Arc::new(AtomicUsize::new(0));
        let t = total.clone();
        let event = make_event_with(
            move |a: usize, b: usize, c: usize, d: usize, e: usize, f: usize| {
                t.store(a + b + c + d + e + f, Ordering::SeqCst);
            },
            (1, 2, 3, 4, 5, 6),
        );

        event.invoke();
        assert_eq!(total.load(Ordering::SeqCst), 21);
    }

    #[test]
    fn test_zero_argument_function() {
        let hit = Arc::new(AtomicBool::new(false));
        let h = hit.clone();
        let event = make_event_with(move || h.store(true, Ordering::SeqCst), ());

        event.invoke();
        assert!(hit.load(Ordering::SeqCst));
    }
}
