//! nsim test harness - seeded scenarios across engines and schedulers
//!
//! This crate provides:
//! - Random schedules replayable from a seed
//! - Ordering, tie-break, cancellation and context checks on the dispatch log
//! - Scheduler swap checks

pub mod scenario;

pub use scenario::*;
