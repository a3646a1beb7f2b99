#![doc = include_str!("../README.md")]

use std::{fmt::Debug, time::Duration};

use log::{debug, trace, warn};

pub use crate::clock::{Clock, ManualClock, SystemClock};
pub use crate::error::{Error, Result};
pub use crate::sync::SyncCounter;

mod clock;
mod error;
mod sync;

/// Construction parameters of a [`Counter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    /// Longest window the counter must answer for.
    pub history: Duration,
    /// Width of one bucket. Truncated to whole milliseconds.
    pub bucket: Duration,
}

impl Config {
    /// Config keeping `history` in buckets `bucket` wide.
    pub fn new(history: Duration, bucket: Duration) -> Self {
        Self { history, bucket }
    }

    /// Replace the history length.
    pub fn with_history(mut self, history: Duration) -> Self {
        self.history = history;
        self
    }

    /// Replace the bucket width.
    pub fn with_bucket(mut self, bucket: Duration) -> Self {
        self.bucket = bucket;
        self
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            history: Duration::from_secs(300),
            bucket: Duration::from_secs(1),
        }
    }
}

#[derive(Default, Clone, Copy)]
struct Bucket {
    start: u64,
    count: i64,
}

/// A counter answering "how many events happened in the last X milliseconds?".
///
/// Events are not stored individually: they are summed into fixed-width,
/// time-aligned buckets kept in a ring buffer allocated once at construction.
/// `cursor` points at the most recently written bucket. Recording either adds
/// to that bucket or rolls over into the next slot, which is always the oldest
/// one. Querying walks backwards from the cursor until it meets a bucket older
/// than the requested window.
///
/// ## Internal structure
///
/// For instance, 5 seconds of history with 1 second buckets, after events at
/// `t = 12.3s`, `t = 13.1s`, `t = 13.8s` and `t = 16.2s`:
/// ```text
///                                           cursor
///                                             v
///   ----------   ----------   ----------   ----------   ----------
///   |  0, 0  |   |12000, 1|   |13000, 2|   |16000, 1|   |  0, 0  |
///   ----------   ----------   ----------   ----------   ----------
/// index  0            1            2            3            4
/// ```
/// Seconds 14 and 15 saw no events so no slot was spent on them. A query over
/// the last 3 seconds at `t = 16.5s` sums slot 3 and stops at slot 2, whose
/// start (13000) is older than `16500 - 3000`.
///
/// Buckets never written keep a start time of `0`, which only works with a
/// clock reporting times far from zero. See [`Clock`].
///
/// `record*` take `&mut self`: one writer at a time. Use [`SyncCounter`] to
/// share a counter between threads.
pub struct Counter<C = SystemClock> {
    buckets: Box<[Bucket]>,
    cursor: usize,
    bucket_ms: u64,
    history_ms: u64,
    clock: C,
}

impl<C> Debug for Counter<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let len = self.buckets.len();
        // Newest first.
        let data = (0..len)
            .map(|offset| {
                let bucket = &self.buckets[(self.cursor + len - offset) % len];
                (bucket.start, bucket.count)
            })
            .collect::<Vec<_>>();

        f.debug_struct("Counter")
            .field("buckets", &data)
            .field("cursor", &self.cursor)
            .field("bucket_ms", &self.bucket_ms)
            .field("history_ms", &self.history_ms)
            .finish()
    }
}

impl Default for Counter<SystemClock> {
    fn default() -> Self {
        let config = Config::default();
        let bucket_ms = as_millis(config.bucket);
        let bucket_count = (as_millis(config.history) / bucket_ms) as usize;
        Self::from_parts(
            vec![Bucket::default(); bucket_count].into_boxed_slice(),
            bucket_ms,
            SystemClock,
        )
    }
}

impl Counter<SystemClock> {
    /// Create a counter driven by the system clock.
    pub fn new(config: Config) -> Result<Self> {
        Self::with_clock(config, SystemClock)
    }
}

impl<C: Clock> Counter<C> {
    /// Create a counter reading time from `clock`.
    ///
    /// The bucket width is truncated to whole milliseconds and must not be
    /// zero. The history is rounded down to a multiple of the bucket width and
    /// must be at least 2 ms once rounded.
    pub fn with_clock(config: Config, clock: C) -> Result<Self> {
        let bucket_ms = as_millis(config.bucket);
        if bucket_ms == 0 {
            return Err(Error::config(format!(
                "bucket duration {:?} is shorter than 1ms",
                config.bucket
            )));
        }

        let requested_ms = as_millis(config.history);
        let bucket_count = requested_ms / bucket_ms;
        let history_ms = bucket_count * bucket_ms;
        if history_ms < 2 {
            return Err(Error::config(format!(
                "history {:?} with {}ms buckets leaves {}ms of history, need at least 2ms",
                config.history, bucket_ms, history_ms
            )));
        }
        let bucket_count = usize::try_from(bucket_count)
            .map_err(|_| Error::config(format!("{} buckets do not fit in memory", bucket_count)))?;
        let buckets = allocate(bucket_count)?;

        if history_ms != requested_ms {
            debug!(
                "history truncated from {}ms to {}ms to fit {}ms buckets",
                requested_ms, history_ms, bucket_ms
            );
        }
        debug!(
            "counter created, buckets: {}, bucket: {}ms, history: {}ms",
            bucket_count, bucket_ms, history_ms
        );

        Ok(Self::from_parts(buckets, bucket_ms, clock))
    }

    /// Record a single event now.
    #[inline]
    pub fn record(&mut self) {
        self.record_many(1);
    }

    /// Record `count` events now.
    ///
    /// `count` is added as is: zero and negative values are accepted.
    #[inline]
    pub fn record_many(&mut self, count: i64) {
        let now = self.clock.now_millis();
        self.record_at(now, count);
    }

    /// Number of events recorded in the last `window`, bucket-aligned.
    ///
    /// The answer covers whole buckets only, so it may include up to one bucket
    /// width of events older than `window`.
    #[inline]
    pub fn query(&self, window: Duration) -> Result<i64> {
        self.query_at(self.clock.now_millis(), window)
    }

    /// The time source this counter reads.
    pub fn clock(&self) -> &C {
        &self.clock
    }
}

impl<C> Counter<C> {
    fn from_parts(buckets: Box<[Bucket]>, bucket_ms: u64, clock: C) -> Self {
        Self {
            history_ms: bucket_ms * buckets.len() as u64,
            buckets,
            cursor: 0,
            bucket_ms,
            clock,
        }
    }

    /// Record `count` events at `now` (milliseconds).
    #[inline]
    pub fn record_at(&mut self, now: u64, count: i64) {
        let bucket = &mut self.buckets[self.cursor];
        // A clock stepping back lands in the current bucket.
        if now.saturating_sub(bucket.start) < self.bucket_ms {
            bucket.count = bucket.count.wrapping_add(count);
            return;
        }
        self.rollover(now, count);
    }

    #[cold]
    fn rollover(&mut self, now: u64, count: i64) {
        self.cursor = (self.cursor + 1) % self.buckets.len();
        let start = now - now % self.bucket_ms;
        trace!("rollover to bucket {}, start: {}", self.cursor, start);

        // Whatever the slot held is at least one revolution old.
        self.buckets[self.cursor] = Bucket { start, count };
    }

    /// Number of events recorded in buckets starting at or after `now - window`.
    pub fn query_at(&self, now: u64, window: Duration) -> Result<i64> {
        if window > self.history() {
            return Err(Error::InvalidArgument {
                requested: window,
                history: self.history(),
            });
        }
        let window_start = now.saturating_sub(as_millis(window));

        let len = self.buckets.len();
        let mut index = self.cursor;
        let mut newer = u64::MAX;
        let mut ordered = true;
        let mut total: i64 = 0;
        for _ in 0..len {
            let bucket = &self.buckets[index];
            if bucket.start < window_start {
                return Ok(total);
            }
            ordered &= bucket.start < newer;
            newer = bucket.start;
            total = total.wrapping_add(bucket.count);
            index = if index == 0 { len - 1 } else { index - 1 };
        }

        // Every slot is inside the window. That is legitimate only when the
        // ring holds `len` buckets strictly ordered in time.
        if ordered {
            return Ok(total);
        }
        warn!(
            "bucket ring out of order, cursor: {}, buckets: {:?}",
            self.cursor,
            self.buckets.iter().map(|b| b.start).collect::<Vec<_>>()
        );
        Err(Error::InternalInvariant {
            cursor: self.cursor,
            bucket_count: len,
        })
    }

    /// Number of slots in the ring.
    #[inline]
    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    /// Width of one bucket, whole milliseconds.
    #[inline]
    pub fn bucket_duration(&self) -> Duration {
        Duration::from_millis(self.bucket_ms)
    }

    /// Longest window [`Counter::query`] accepts.
    #[inline]
    pub fn history(&self) -> Duration {
        Duration::from_millis(self.history_ms)
    }
}

// Zeroed ring, or `InvalidConfig` when it cannot be allocated.
fn allocate(bucket_count: usize) -> Result<Box<[Bucket]>> {
    let mut buckets = Vec::new();
    buckets.try_reserve_exact(bucket_count).map_err(|e| {
        Error::config(format!("{} buckets do not fit in memory: {}", bucket_count, e))
    })?;
    buckets.resize(bucket_count, Bucket::default());
    Ok(buckets.into_boxed_slice())
}

#[inline]
fn as_millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}
