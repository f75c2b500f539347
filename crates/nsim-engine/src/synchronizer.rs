//! Wall-clock synchronizer for the realtime engine
//!
//! Maps the monotonic OS clock onto virtual ticks: at `set_origin` the wall
//! clock is pinned to a virtual timestamp, and every later reading is that
//! timestamp plus the real time elapsed since.

use std::time::{Duration, Instant};

use nsim_core::Time;

#[derive(Debug, Clone)]
pub struct WallClockSynchronizer {
    /// Real instant matching `virtual_origin`
    origin: Instant,
    virtual_origin: i64,
}

impl WallClockSynchronizer {
    pub fn new() -> Self {
        WallClockSynchronizer {
            origin: Instant::now(),
            virtual_origin: 0,
        }
    }

    /// Pin the current real instant to virtual tick `ts`
    pub fn set_origin(&mut self, ts: i64) {
        self.origin = Instant::now();
        self.virtual_origin = ts;
    }

    /// Real time elapsed since the origin
    pub fn elapsed(&self) -> Duration {
        self.origin.elapsed()
    }

    /// Virtual tick matching the current real instant
    pub fn current_ticks(&self) -> i64 {
        self.virtual_origin
            .wrapping_add(Time::from(self.elapsed()).step())
    }

    /// Real time left until virtual tick `ts` comes due, zero if it already has
    pub fn time_until(&self, ts: i64) -> Duration {
        Time::from_step(ts.wrapping_sub(self.current_ticks())).to_duration()
    }
}

impl Default for WallClockSynchronizer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_origin_offsets_readings() {
        let mut sync = WallClockSynchronizer::new();
        sync.set_origin(Time::seconds(10.0).step());

        let now = sync.current_ticks();
        assert!(now >= Time::seconds(10.0).step());
        assert!(now < Time::seconds(11.0).step());
    }

    #[test]
    fn test_readings_advance_with_real_time() {
        let sync = WallClockSynchronizer::new();
        let before = sync.current_ticks();
        std::thread::sleep(Duration::from_millis(5));
        let after = sync.current_ticks();

        assert!(after - before >= Time::millis(5).step());
    }

    #[test]
    fn test_time_until() {
        let mut sync = WallClockSynchronizer::new();
        sync.set_origin(0);

        assert_eq!(sync.time_until(-5), Duration::ZERO);
        let wait = sync.time_until(Time::seconds(1.0).step());
        assert!(wait > Duration::from_millis(900));
        assert!(wait <= Duration::from_secs(1));
    }
}
