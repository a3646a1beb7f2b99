use std::fmt::Debug;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::clock::{Clock, SystemClock};
use crate::{Config, Counter, Result};

/// A [`Counter`] behind a single lock, shareable between threads.
///
/// Recording and querying both take the lock, so every operation sees a
/// consistent ring. Wrap it in an `Arc` to hand it to several threads.
pub struct SyncCounter<C = SystemClock> {
    inner: Mutex<Counter<C>>,
}

impl SyncCounter<SystemClock> {
    /// Create a shared counter driven by the system clock.
    pub fn new(config: Config) -> Result<Self> {
        Counter::new(config).map(Self::from)
    }
}

impl<C: Clock> SyncCounter<C> {
    /// Create a shared counter reading time from `clock`.
    pub fn with_clock(config: Config, clock: C) -> Result<Self> {
        Counter::with_clock(config, clock).map(Self::from)
    }

    /// Record a single event.
    #[inline]
    pub fn record(&self) {
        self.lock().record();
    }

    /// Record `count` events at once.
    #[inline]
    pub fn record_many(&self, count: i64) {
        self.lock().record_many(count);
    }

    /// Number of events recorded in the last `window`.
    #[inline]
    pub fn query(&self, window: Duration) -> Result<i64> {
        self.lock().query(window)
    }

    /// Take the counter back out of the lock.
    pub fn into_inner(self) -> Counter<C> {
        self.inner
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
    }

    // Buckets are plain integers and a panicking writer cannot leave the ring
    // half-rotated, so a poisoned lock still guards a usable counter.
    #[inline]
    fn lock(&self) -> MutexGuard<'_, Counter<C>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<C> From<Counter<C>> for SyncCounter<C> {
    fn from(counter: Counter<C>) -> Self {
        Self {
            inner: Mutex::new(counter),
        }
    }
}

impl<C: Clock> Debug for SyncCounter<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncCounter")
            .field("inner", &*self.lock())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, thread};

    use super::*;
    use crate::clock::ManualClock;

    const T0: u64 = 1_700_000_000_000;

    #[test]
    fn test_parallel() {
        for _ in 0..100 {
            let clock = Arc::new(ManualClock::new(T0));
            let counter =
                SyncCounter::with_clock(Config::default(), Arc::clone(&clock)).unwrap();
            let counter = Arc::new(counter);

            const THREAD_NUMBER: usize = 4;
            const PER_THREAD: usize = 250;

            let ths: Vec<_> = (0..THREAD_NUMBER)
                .map(|_| {
                    let counter = Arc::clone(&counter);
                    thread::spawn(move || {
                        for _ in 0..PER_THREAD {
                            counter.record();
                        }
                    })
                })
                .collect();

            for th in ths {
                th.join().unwrap();
            }

            assert_eq!(
                counter.query(Duration::from_secs(1)).unwrap(),
                (THREAD_NUMBER * PER_THREAD) as i64
            );
        }
    }

    #[test]
    fn test_parallel_across_buckets() {
        let clock = Arc::new(ManualClock::new(T0));
        let config = Config::new(Duration::from_secs(10), Duration::from_secs(1));
        let counter = Arc::new(SyncCounter::with_clock(config, Arc::clone(&clock)).unwrap());

        for _ in 0..3 {
            let ths: Vec<_> = (0..2)
                .map(|_| {
                    let counter = Arc::clone(&counter);
                    thread::spawn(move || counter.record_many(5))
                })
                .collect();
            for th in ths {
                th.join().unwrap();
            }
            clock.advance(Duration::from_secs(1));
        }

        // Three buckets of 10, the clock now sits in an empty fourth window.
        assert_eq!(counter.query(Duration::from_secs(10)).unwrap(), 30);
        assert_eq!(counter.query(Duration::from_secs(2)).unwrap(), 20);
    }

    #[test]
    fn test_errors_pass_through() {
        let counter = SyncCounter::with_clock(Config::default(), ManualClock::new(T0)).unwrap();
        assert!(counter.query(Duration::from_secs(301)).is_err());

        let err = SyncCounter::with_clock(
            Config::default().with_bucket(Duration::ZERO),
            ManualClock::new(T0),
        )
        .unwrap_err();
        assert!(matches!(err, crate::Error::InvalidConfig(_)));
    }

    #[test]
    fn test_into_inner_keeps_state() {
        let counter = SyncCounter::with_clock(Config::default(), ManualClock::new(T0)).unwrap();
        counter.record_many(7);
        let counter = counter.into_inner();
        assert_eq!(counter.query(Duration::from_secs(1)).unwrap(), 7);
    }
}
