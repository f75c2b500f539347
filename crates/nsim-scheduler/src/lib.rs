//! nsim scheduler - event priority queues
//!
//! Every implementation of [`Scheduler`] yields events in `(time, uid)`
//! order. They differ only in cost profile:
//! - [`ListScheduler`]: sorted deque, cheap for tiny queues
//! - [`MapScheduler`]: ordered tree, the default
//! - [`HeapScheduler`]: binary heap
//! - [`CalendarScheduler`]: bucketed calendar queue
//!
//! [`SchedulerType`] picks one by name at runtime.

pub mod calendar;
pub mod heap;
pub mod list;
pub mod map;
pub mod scheduler;

pub use calendar::CalendarScheduler;
pub use heap::HeapScheduler;
pub use list::ListScheduler;
pub use map::MapScheduler;
pub use scheduler::*;

use std::fmt;
use std::str::FromStr;

use nsim_core::{NsimError, NsimResult};

/// Selector for a scheduler implementation
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum SchedulerType {
    List,
    #[default]
    Map,
    Heap,
    Calendar,
}

impl SchedulerType {
    pub const ALL: [SchedulerType; 4] = [
        SchedulerType::List,
        SchedulerType::Map,
        SchedulerType::Heap,
        SchedulerType::Calendar,
    ];

    pub fn build(self) -> Box<dyn Scheduler> {
        match self {
            SchedulerType::List => Box::new(ListScheduler::new()),
            SchedulerType::Map => Box::new(MapScheduler::new()),
            SchedulerType::Heap => Box::new(HeapScheduler::new()),
            SchedulerType::Calendar => Box::new(CalendarScheduler::new()),
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            SchedulerType::List => "ListScheduler",
            SchedulerType::Map => "MapScheduler",
            SchedulerType::Heap => "HeapScheduler",
            SchedulerType::Calendar => "CalendarScheduler",
        }
    }
}

impl fmt::Display for SchedulerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SchedulerType {
    type Err = NsimError;

    /// Accepts `MapScheduler`, `nsim::MapScheduler` or the short form `map`
    fn from_str(s: &str) -> NsimResult<Self> {
        let name = s.trim();
        let name = name.strip_prefix("nsim::").unwrap_or(name);
        SchedulerType::ALL
            .into_iter()
            .find(|t| {
                t.name() == name
                    || t.name()
                        .strip_suffix("Scheduler")
                        .is_some_and(|short| short.eq_ignore_ascii_case(name))
            })
            .ok_or_else(|| NsimError::UnknownScheduler(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nsim_core::make_event;
    use proptest::prelude::*;

    fn drain(s: &mut dyn Scheduler) -> Vec<(i64, u32)> {
        std::iter::from_fn(|| s.remove_next())
            .map(|e| (e.key.ts, e.key.uid))
            .collect()
    }

    #[test]
    fn test_parse_names() {
        assert_eq!("MapScheduler".parse::<SchedulerType>().unwrap(), SchedulerType::Map);
        assert_eq!(
            "nsim::CalendarScheduler".parse::<SchedulerType>().unwrap(),
            SchedulerType::Calendar
        );
        assert_eq!("heap".parse::<SchedulerType>().unwrap(), SchedulerType::Heap);
        assert_eq!(
            "FancyScheduler".parse::<SchedulerType>(),
            Err(NsimError::UnknownScheduler("FancyScheduler".into()))
        );
    }

    #[test]
    fn test_build_reports_name() {
        for t in SchedulerType::ALL {
            assert_eq!(t.build().name(), t.name());
            assert_eq!(t.to_string().parse::<SchedulerType>().unwrap(), t);
        }
        assert_eq!(SchedulerType::default(), SchedulerType::Map);
    }

    #[test]
    fn test_transfer_between_types() {
        let mut from = SchedulerType::Heap.build();
        for (uid, ts) in [(4, 5), (5, 3), (6, 3), (7, 1)] {
            from.insert(Entry::new(EventKey::new(ts, uid, 0), make_event(|| {})));
        }

        let mut to = SchedulerType::Calendar.build();
        assert_eq!(transfer(from.as_mut(), to.as_mut()), 4);
        assert!(from.is_empty());
        assert_eq!(drain(to.as_mut()), vec![(1, 7), (3, 5), (3, 6), (5, 4)]);
    }

    proptest! {
        #[test]
        fn prop_all_types_agree(times in prop::collection::vec(-1_000i64..1_000, 0..200)) {
            let mut expected: Vec<(i64, u32)> = times
                .iter()
                .enumerate()
                .map(|(i, &ts)| (ts, i as u32 + 4))
                .collect();
            expected.sort();

            for t in SchedulerType::ALL {
                let mut s = t.build();
                for (i, &ts) in times.iter().enumerate() {
                    s.insert(Entry::new(EventKey::new(ts, i as u32 + 4, 0), make_event(|| {})));
                }
                prop_assert_eq!(s.len(), times.len());
                prop_assert_eq!(drain(s.as_mut()), expected.clone());
            }
        }

        #[test]
        fn prop_swap_midway_preserves_order(
            times in prop::collection::vec(0i64..10_000, 1..200),
            split in 0usize..200,
        ) {
            let split = split.min(times.len());
            let mut expected: Vec<(i64, u32)> = times
                .iter()
                .enumerate()
                .map(|(i, &ts)| (ts, i as u32 + 4))
                .collect();
            expected.sort();

            let mut first = SchedulerType::Map.build();
            for (i, &ts) in times[..split].iter().enumerate() {
                first.insert(Entry::new(EventKey::new(ts, i as u32 + 4, 0), make_event(|| {})));
            }
            let mut second = SchedulerType::Calendar.build();
            transfer(first.as_mut(), second.as_mut());
            for (i, &ts) in times.iter().enumerate().skip(split) {
                second.insert(Entry::new(EventKey::new(ts, i as u32 + 4, 0), make_event(|| {})));
            }

            prop_assert_eq!(drain(second.as_mut()), expected);
        }
    }
}
