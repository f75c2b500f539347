//! Virtual time for nsim
//!
//! A [`Time`] is a signed 64-bit count of ticks. What one tick means is a
//! process-wide setting, [`Time::set_resolution`], nanoseconds by default.
//! Changing the resolution never rescales existing values: a `Time` built
//! before the change keeps its tick count and is read back in the new unit.

use std::fmt;
use std::ops::{Add, AddAssign, Div, Mul, Neg, Sub, SubAssign};
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::OnceLock;
use std::time::Duration;

use parking_lot::RwLock;
use tracing::{debug, warn};

use crate::{Int64x64, NsimError, NsimResult};

const FS_PER_SECOND: i128 = 1_000_000_000_000_000;

/// Units a [`Time`] can be built from or read back in
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TimeUnit {
    Year,
    Day,
    Hour,
    Minute,
    Second,
    Milli,
    Micro,
    Nano,
    Pico,
    Femto,
}

impl TimeUnit {
    pub const ALL: [TimeUnit; 10] = [
        TimeUnit::Year,
        TimeUnit::Day,
        TimeUnit::Hour,
        TimeUnit::Minute,
        TimeUnit::Second,
        TimeUnit::Milli,
        TimeUnit::Micro,
        TimeUnit::Nano,
        TimeUnit::Pico,
        TimeUnit::Femto,
    ];

    /// Length of one unit in femtoseconds. A year is 365 days.
    pub const fn femtos(self) -> i128 {
        match self {
            TimeUnit::Year => 365 * 86_400 * FS_PER_SECOND,
            TimeUnit::Day => 86_400 * FS_PER_SECOND,
            TimeUnit::Hour => 3_600 * FS_PER_SECOND,
            TimeUnit::Minute => 60 * FS_PER_SECOND,
            TimeUnit::Second => FS_PER_SECOND,
            TimeUnit::Milli => 1_000_000_000_000,
            TimeUnit::Micro => 1_000_000_000,
            TimeUnit::Nano => 1_000_000,
            TimeUnit::Pico => 1_000,
            TimeUnit::Femto => 1,
        }
    }

    pub const fn suffix(self) -> &'static str {
        match self {
            TimeUnit::Year => "y",
            TimeUnit::Day => "d",
            TimeUnit::Hour => "h",
            TimeUnit::Minute => "min",
            TimeUnit::Second => "s",
            TimeUnit::Milli => "ms",
            TimeUnit::Micro => "us",
            TimeUnit::Nano => "ns",
            TimeUnit::Pico => "ps",
            TimeUnit::Femto => "fs",
        }
    }

    #[inline]
    fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for TimeUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.suffix())
    }
}

impl FromStr for TimeUnit {
    type Err = NsimError;

    fn from_str(s: &str) -> NsimResult<Self> {
        TimeUnit::ALL
            .into_iter()
            .find(|unit| unit.suffix() == s)
            .ok_or_else(|| NsimError::UnknownTimeUnit(s.to_string()))
    }
}

// ============================================================================
// Resolution table
// ============================================================================

/// How to move between one unit and the current tick
#[derive(Clone, Copy, Debug)]
struct Conversion {
    /// ticks -> unit multiplies (the unit is finer than a tick)
    to_mul: bool,
    /// unit -> ticks multiplies (the unit is at least one tick)
    from_mul: bool,
    /// Ratio between the larger and the smaller of unit and tick,
    /// saturated to `i64::MAX`
    factor: i64,
    factor_hp: Int64x64,
}

impl Conversion {
    fn between(unit: TimeUnit, tick: TimeUnit) -> Self {
        let (unit_fs, tick_fs) = (unit.femtos(), tick.femtos());
        let coarse = unit_fs >= tick_fs;
        let ratio = if coarse { unit_fs / tick_fs } else { tick_fs / unit_fs };
        let factor = i64::try_from(ratio).unwrap_or(i64::MAX);

        Conversion {
            to_mul: !coarse,
            from_mul: coarse,
            factor,
            factor_hp: Int64x64::from_int(factor),
        }
    }
}

#[derive(Clone, Debug)]
struct Resolution {
    unit: TimeUnit,
    table: [Conversion; 10],
}

impl Resolution {
    fn new(unit: TimeUnit) -> Self {
        Resolution {
            unit,
            table: TimeUnit::ALL.map(|u| Conversion::between(u, unit)),
        }
    }
}

static RESOLUTION: OnceLock<RwLock<Resolution>> = OnceLock::new();
static RESOLUTION_USED: AtomicBool = AtomicBool::new(false);

fn resolution() -> &'static RwLock<Resolution> {
    RESOLUTION.get_or_init(|| RwLock::new(Resolution::new(TimeUnit::Nano)))
}

fn conversion(unit: TimeUnit) -> Conversion {
    RESOLUTION_USED.store(true, Ordering::Relaxed);
    resolution().read().table[unit.index()]
}

// ============================================================================
// Time
// ============================================================================

/// Simulated time, a signed tick count
///
/// Arithmetic wraps on overflow.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Time(i64);

impl Time {
    pub const ZERO: Time = Time(0);
    pub const MAX: Time = Time(i64::MAX);
    pub const MIN: Time = Time(i64::MIN);

    /// Select the unit of one tick for the whole process
    ///
    /// Values created before the call keep their raw tick count. A warning
    /// is logged when the table has already been used to build or read a
    /// value, since those values silently change meaning.
    pub fn set_resolution(unit: TimeUnit) {
        let mut current = resolution().write();
        if current.unit != unit && RESOLUTION_USED.load(Ordering::Relaxed) {
            warn!(
                from = %current.unit,
                to = %unit,
                "time resolution changed after times were created; existing values are not rescaled"
            );
        }
        *current = Resolution::new(unit);
        debug!(resolution = %unit, "time resolution set");
    }

    /// Unit of one tick
    pub fn resolution() -> TimeUnit {
        resolution().read().unit
    }

    #[inline]
    pub const fn from_step(ticks: i64) -> Self {
        Time(ticks)
    }

    #[inline]
    pub const fn step(self) -> i64 {
        self.0
    }

    /// Build from an integer count of `unit`. Units finer than a tick are
    /// truncated toward zero.
    pub fn from_integer(value: i64, unit: TimeUnit) -> Self {
        let conv = conversion(unit);
        if conv.from_mul {
            Time(value.wrapping_mul(conv.factor))
        } else {
            Time(value / conv.factor)
        }
    }

    /// Build from a fixed-point count of `unit`, rounding to the nearest tick
    pub fn from_high_precision(value: Int64x64, unit: TimeUnit) -> Self {
        let conv = conversion(unit);
        let ticks = if conv.from_mul {
            value * conv.factor_hp
        } else {
            value / conv.factor_hp
        };
        Time(ticks.round())
    }

    pub fn from_double(value: f64, unit: TimeUnit) -> Self {
        Self::from_high_precision(Int64x64::from_f64(value), unit)
    }

    /// Whole units, truncated toward zero
    pub fn to_integer(self, unit: TimeUnit) -> i64 {
        let conv = conversion(unit);
        if conv.to_mul {
            self.0.wrapping_mul(conv.factor)
        } else {
            self.0 / conv.factor
        }
    }

    pub fn to_high_precision(self, unit: TimeUnit) -> Int64x64 {
        let conv = conversion(unit);
        let ticks = Int64x64::from_int(self.0);
        if conv.to_mul {
            ticks * conv.factor_hp
        } else {
            ticks / conv.factor_hp
        }
    }

    pub fn to_double(self, unit: TimeUnit) -> f64 {
        self.to_high_precision(unit).to_f64()
    }

    pub fn years(value: f64) -> Self {
        Self::from_double(value, TimeUnit::Year)
    }

    pub fn days(value: f64) -> Self {
        Self::from_double(value, TimeUnit::Day)
    }

    pub fn hours(value: f64) -> Self {
        Self::from_double(value, TimeUnit::Hour)
    }

    pub fn minutes(value: f64) -> Self {
        Self::from_double(value, TimeUnit::Minute)
    }

    pub fn seconds(value: f64) -> Self {
        Self::from_double(value, TimeUnit::Second)
    }

    pub fn millis(value: i64) -> Self {
        Self::from_integer(value, TimeUnit::Milli)
    }

    pub fn micros(value: i64) -> Self {
        Self::from_integer(value, TimeUnit::Micro)
    }

    pub fn nanos(value: i64) -> Self {
        Self::from_integer(value, TimeUnit::Nano)
    }

    pub fn picos(value: i64) -> Self {
        Self::from_integer(value, TimeUnit::Pico)
    }

    pub fn femtos(value: i64) -> Self {
        Self::from_integer(value, TimeUnit::Femto)
    }

    pub fn as_years(self) -> f64 {
        self.to_double(TimeUnit::Year)
    }

    pub fn as_days(self) -> f64 {
        self.to_double(TimeUnit::Day)
    }

    pub fn as_hours(self) -> f64 {
        self.to_double(TimeUnit::Hour)
    }

    pub fn as_minutes(self) -> f64 {
        self.to_double(TimeUnit::Minute)
    }

    pub fn as_seconds(self) -> f64 {
        self.to_double(TimeUnit::Second)
    }

    pub fn as_millis(self) -> i64 {
        self.to_integer(TimeUnit::Milli)
    }

    pub fn as_micros(self) -> i64 {
        self.to_integer(TimeUnit::Micro)
    }

    pub fn as_nanos(self) -> i64 {
        self.to_integer(TimeUnit::Nano)
    }

    pub fn as_picos(self) -> i64 {
        self.to_integer(TimeUnit::Pico)
    }

    pub fn as_femtos(self) -> i64 {
        self.to_integer(TimeUnit::Femto)
    }

    #[inline]
    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    /// `>= 0`
    #[inline]
    pub const fn is_positive(self) -> bool {
        self.0 >= 0
    }

    /// `<= 0`
    #[inline]
    pub const fn is_negative(self) -> bool {
        self.0 <= 0
    }

    #[inline]
    pub const fn is_strictly_positive(self) -> bool {
        self.0 > 0
    }

    #[inline]
    pub const fn is_strictly_negative(self) -> bool {
        self.0 < 0
    }

    #[inline]
    pub const fn abs(self) -> Self {
        Time(self.0.wrapping_abs())
    }

    /// Display in a fixed unit instead of raw ticks, e.g. `+1.5s`
    pub fn display_as(self, unit: TimeUnit) -> TimeWithUnit {
        TimeWithUnit { time: self, unit }
    }

    /// Non-negative times map to a `Duration` via nanoseconds; negative
    /// times clamp to zero.
    pub fn to_duration(self) -> Duration {
        let nanos = self.as_nanos();
        if nanos <= 0 {
            Duration::ZERO
        } else {
            Duration::from_nanos(nanos as u64)
        }
    }
}

impl From<Duration> for Time {
    fn from(duration: Duration) -> Self {
        let nanos = i64::try_from(duration.as_nanos()).unwrap_or(i64::MAX);
        Time::from_integer(nanos, TimeUnit::Nano)
    }
}

impl Add for Time {
    type Output = Time;

    #[inline]
    fn add(self, rhs: Time) -> Time {
        Time(self.0.wrapping_add(rhs.0))
    }
}

impl Sub for Time {
    type Output = Time;

    #[inline]
    fn sub(self, rhs: Time) -> Time {
        Time(self.0.wrapping_sub(rhs.0))
    }
}

impl AddAssign for Time {
    #[inline]
    fn add_assign(&mut self, rhs: Time) {
        self.0 = self.0.wrapping_add(rhs.0);
    }
}

impl SubAssign for Time {
    #[inline]
    fn sub_assign(&mut self, rhs: Time) {
        self.0 = self.0.wrapping_sub(rhs.0);
    }
}

impl Mul<i64> for Time {
    type Output = Time;

    #[inline]
    fn mul(self, rhs: i64) -> Time {
        Time(self.0.wrapping_mul(rhs))
    }
}

impl Mul<Time> for i64 {
    type Output = Time;

    #[inline]
    fn mul(self, rhs: Time) -> Time {
        Time(self.wrapping_mul(rhs.0))
    }
}

impl Div<i64> for Time {
    type Output = Time;

    #[inline]
    fn div(self, rhs: i64) -> Time {
        Time(self.0.wrapping_div(rhs))
    }
}

/// Ratio of two times
impl Div for Time {
    type Output = i64;

    #[inline]
    fn div(self, rhs: Time) -> i64 {
        self.0.wrapping_div(rhs.0)
    }
}

impl Neg for Time {
    type Output = Time;

    #[inline]
    fn neg(self) -> Time {
        Time(self.0.wrapping_neg())
    }
}

impl fmt::Display for Time {
    /// Raw ticks with the resolution suffix, e.g. `+1500000000ns`
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:+}{}", self.0, Time::resolution())
    }
}

impl fmt::Debug for Time {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Time({self})")
    }
}

impl FromStr for Time {
    type Err = NsimError;

    /// Parse `<number>[unit]`, e.g. `1.5ms`, `10s` or `250`. A bare number is
    /// in seconds.
    fn from_str(s: &str) -> NsimResult<Self> {
        let s = s.trim();
        let number = s.trim_end_matches(|c: char| c.is_ascii_alphabetic());
        let suffix = &s[number.len()..];

        let unit = if suffix.is_empty() {
            TimeUnit::Second
        } else {
            suffix.parse()?
        };

        if let Ok(value) = number.parse::<i64>() {
            return Ok(Time::from_integer(value, unit));
        }
        number
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .map(|v| Time::from_double(v, unit))
            .ok_or_else(|| NsimError::InvalidTimeValue(s.to_string()))
    }
}

/// A [`Time`] paired with the unit it should be printed in
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TimeWithUnit {
    pub time: Time,
    pub unit: TimeUnit,
}

impl fmt::Display for TimeWithUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = self.time.to_high_precision(self.unit);
        match f.precision() {
            Some(p) => write!(f, "{value:.p$}{}", self.unit),
            None => write!(f, "{value}{}", self.unit),
        }
    }
}
