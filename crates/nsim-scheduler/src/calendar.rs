//! Calendar queue scheduler
//!
//! Time is cut into "days" of `width` ticks and day `d` lives in bucket
//! `d % buckets`, each bucket kept sorted. Finding the minimum walks the
//! buckets starting from the day of the last dequeued event; when a full
//! "year" turns up nothing it falls back to comparing bucket heads directly.
//!
//! The bucket count doubles when the population exceeds twice the bucket
//! count and halves when it drops under half. On every resize the bucket
//! width is re-estimated from the gaps between the earliest events.

use std::collections::VecDeque;

use tracing::debug;

use crate::{Entry, EventKey, Scheduler};

const MIN_BUCKETS: usize = 2;
const WIDTH_SAMPLE: usize = 25;

#[derive(Debug)]
pub struct CalendarScheduler {
    buckets: Vec<VecDeque<Entry>>,
    width: u128,
    len: usize,
    /// Lower bound on every queued timestamp
    last_prio: i64,
}

/// Timestamp shifted onto `0..2^64` so days never go negative
#[inline]
fn shifted(ts: i64) -> u128 {
    (ts as i128 - i64::MIN as i128) as u128
}

impl CalendarScheduler {
    pub fn new() -> Self {
        CalendarScheduler {
            buckets: vec![VecDeque::new(); MIN_BUCKETS],
            width: 1,
            len: 0,
            last_prio: i64::MIN,
        }
    }

    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    /// Width of one day, in ticks
    pub fn bucket_width(&self) -> u128 {
        self.width
    }

    #[inline]
    fn day(&self, ts: i64) -> u128 {
        shifted(ts) / self.width
    }

    #[inline]
    fn bucket_of(&self, ts: i64) -> usize {
        (self.day(ts) % self.buckets.len() as u128) as usize
    }

    fn insert_sorted(&mut self, entry: Entry) {
        let i = self.bucket_of(entry.key.ts);
        let bucket = &mut self.buckets[i];
        let at = match bucket.binary_search_by(|e| e.key.cmp(&entry.key)) {
            Ok(i) | Err(i) => i,
        };
        bucket.insert(at, entry);
    }

    /// Bucket holding the smallest entry
    fn locate(&self) -> Option<usize> {
        if self.len == 0 {
            return None;
        }

        let n = self.buckets.len();
        let mut day = self.day(self.last_prio);
        for _ in 0..n {
            let i = (day % n as u128) as usize;
            if let Some(front) = self.buckets[i].front() {
                if self.day(front.key.ts) == day {
                    return Some(i);
                }
            }
            day += 1;
        }

        // Nothing within a year of the cursor: compare heads directly.
        self.buckets
            .iter()
            .enumerate()
            .filter_map(|(i, b)| b.front().map(|e| (e.key, i)))
            .min_by(|a, b| a.0.cmp(&b.0))
            .map(|(_, i)| i)
    }

    fn estimate_width(&self) -> u128 {
        let mut sample: Vec<i64> = self
            .buckets
            .iter()
            .flat_map(|b| b.iter().map(|e| e.key.ts))
            .collect();
        if sample.len() > WIDTH_SAMPLE {
            sample.select_nth_unstable(WIDTH_SAMPLE - 1);
            sample.truncate(WIDTH_SAMPLE);
        }
        sample.sort_unstable();

        if sample.len() < 2 {
            return 1;
        }

        let gaps: Vec<u128> = sample
            .windows(2)
            .map(|w| (w[1] as i128 - w[0] as i128) as u128)
            .collect();
        let average = gaps.iter().sum::<u128>() / gaps.len() as u128;

        // Drop outliers before averaging again.
        let (sum, count) = gaps
            .iter()
            .filter(|&&g| g <= 2 * average)
            .fold((0u128, 0u128), |(s, c), g| (s + g, c + 1));
        let average = if count == 0 { average } else { sum / count };

        (3 * average).max(1)
    }

    fn resize(&mut self, buckets: usize) {
        let width = self.estimate_width();
        let old = std::mem::replace(&mut self.buckets, vec![VecDeque::new(); buckets]);
        self.width = width;
        for entry in old.into_iter().flatten() {
            self.insert_sorted(entry);
        }
        debug!(buckets, width = %width, events = self.len, "calendar queue resized");
    }
}

impl Default for CalendarScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler for CalendarScheduler {
    fn name(&self) -> &'static str {
        "CalendarScheduler"
    }

    fn insert(&mut self, entry: Entry) {
        if entry.key.ts < self.last_prio {
            self.last_prio = entry.key.ts;
        }
        self.insert_sorted(entry);
        self.len += 1;

        if self.len > 2 * self.buckets.len() {
            self.resize(2 * self.buckets.len());
        }
    }

    fn is_empty(&self) -> bool {
        self.len == 0
    }

    fn len(&self) -> usize {
        self.len
    }

    fn peek_next(&self) -> Option<&Entry> {
        let i = self.locate()?;
        self.buckets[i].front()
    }

    fn remove_next(&mut self) -> Option<Entry> {
        let i = self.locate()?;
        let entry = self.buckets[i].pop_front()?;
        self.len -= 1;
        self.last_prio = entry.key.ts;

        let n = self.buckets.len();
        if n > MIN_BUCKETS && self.len < n / 2 {
            self.resize(n / 2);
        }
        Some(entry)
    }

    fn remove(&mut self, key: &EventKey) -> Option<Entry> {
        let i = self.bucket_of(key.ts);
        let bucket = &mut self.buckets[i];
        let at = bucket.binary_search_by(|e| e.key.cmp(key)).ok()?;
        let entry = bucket.remove(at)?;
        self.len -= 1;

        let n = self.buckets.len();
        if n > MIN_BUCKETS && self.len < n / 2 {
            self.resize(n / 2);
        }
        Some(entry)
    }
}
