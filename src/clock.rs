//! Time sources for the counter.
//!
//! Every timestamp handled by this crate is a `u64` count of milliseconds.
//! Buckets that were never written carry a start time of `0`, and the counter
//! relies on that sentinel being older than any query window. A clock must
//! therefore report values far from zero: Unix-epoch milliseconds (what
//! [`SystemClock`] returns) are fine, an uptime counter starting at zero is not.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// A source of "now", in milliseconds.
///
/// The clock should be monotonic enough for `now - bucket_start` to make sense.
/// Going backwards is tolerated but degrades accuracy.
pub trait Clock {
    /// Current time in milliseconds.
    fn now_millis(&self) -> u64;
}

/// Wall clock, milliseconds since the Unix epoch.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    #[inline]
    fn now_millis(&self) -> u64 {
        let since_epoch = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        u64::try_from(since_epoch.as_millis()).unwrap_or(u64::MAX)
    }
}

/// A clock that only moves when told to.
///
/// Useful for simulations and tests. It is `Sync`, so it can be shared through
/// an `Arc` with a counter living on another thread.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    /// Clock stopped at `now_millis`.
    pub fn new(now_millis: u64) -> Self {
        Self {
            now: AtomicU64::new(now_millis),
        }
    }

    /// Jump to `now_millis`, backwards or forwards.
    pub fn set(&self, now_millis: u64) {
        self.now.store(now_millis, Ordering::Release);
    }

    /// Move forward by `by`, saturating at `u64::MAX`.
    pub fn advance(&self, by: Duration) {
        let by = u64::try_from(by.as_millis()).unwrap_or(u64::MAX);
        let mut now = self.now.load(Ordering::Acquire);
        loop {
            match self.now.compare_exchange_weak(
                now,
                now.saturating_add(by),
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return,
                Err(actual) => now = actual,
            }
        }
    }
}

impl Clock for ManualClock {
    #[inline]
    fn now_millis(&self) -> u64 {
        self.now.load(Ordering::Acquire)
    }
}

impl<C: Clock + ?Sized> Clock for &C {
    #[inline]
    fn now_millis(&self) -> u64 {
        (**self).now_millis()
    }
}

impl<C: Clock + ?Sized> Clock for Arc<C> {
    #[inline]
    fn now_millis(&self) -> u64 {
        (**self).now_millis()
    }
}
