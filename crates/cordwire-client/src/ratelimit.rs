//! Per-route admission control driven by server quota headers.
//!
//! The limiter only knows what previous responses told it. Routes it has no
//! record for are assumed safe; a record whose quota is used up makes the next
//! request wait until the server's reset time.

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use tracing::{debug, trace};

/// Wall-clock source for reset-time comparisons.
pub trait Clock: Send + Sync {
    fn now(&self) -> SystemTime;
}

/// The real system clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> SystemTime {
        SystemTime::now()
    }
}

/// Last known quota for one route.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitRecord {
    pub remaining: u32,
    pub total: u32,
    pub reset_at: SystemTime,
}

/// Default number of routes the limiter remembers.
pub const DEFAULT_CACHE_SIZE: usize = 100;

/// Reactive per-route rate limiter with a bounded, refresh-ordered cache.
pub struct RateLimiter {
    records: HashMap<String, RateLimitRecord>,
    /// Routes ordered from least to most recently refreshed.
    order: VecDeque<String>,
    capacity: usize,
    clock: Arc<dyn Clock>,
}

impl RateLimiter {
    pub fn new(capacity: usize) -> Self {
        Self::with_clock(capacity, Arc::new(SystemClock))
    }

    pub fn with_clock(capacity: usize, clock: Arc<dyn Clock>) -> Self {
        Self {
            records: HashMap::new(),
            order: VecDeque::new(),
            capacity: capacity.max(1),
            clock,
        }
    }

    /// Admit one request on `route`, suspending through `wait` when the route's
    /// quota is exhausted and its window has not reset yet.
    ///
    /// The call that spends the last slot (1 to 0) goes through at once; the
    /// one after it waits for the reset.
    pub async fn acquire<W, F>(&mut self, route: &str, wait: W)
    where
        W: FnOnce(Duration) -> F,
        F: Future<Output = ()>,
    {
        let now = self.clock.now();
        let Some(record) = self.records.get_mut(route) else {
            trace!(route, "no quota information, admitting");
            return;
        };

        if record.remaining > 0 {
            record.remaining -= 1;
            debug!(
                route,
                remaining = record.remaining,
                total = record.total,
                "quota acquired"
            );
            if record.remaining == 0 && record.reset_at <= now {
                debug!(route, "quota consumed after reset time, dropping stale record");
                self.evict(route);
            }
            return;
        }

        if record.reset_at <= now {
            debug!(route, "quota record outdated, dropping");
            self.evict(route);
            return;
        }

        let delay = record
            .reset_at
            .duration_since(now)
            .unwrap_or(Duration::ZERO);
        debug!(route, ?delay, "quota exhausted, waiting for reset");
        wait(delay).await;

        // The window has ended; whatever we knew about it no longer holds.
        self.evict(route);
    }

    /// Record quota information from a response.
    pub fn refresh(&mut self, route: &str, remaining: u32, total: u32, reset_at: SystemTime) {
        trace!(route, remaining, total, "quota refreshed");
        let record = RateLimitRecord {
            remaining,
            total,
            reset_at,
        };

        if self.records.insert(route.to_string(), record).is_some() {
            self.order.retain(|r| r != route);
        }
        self.order.push_back(route.to_string());

        while self.order.len() > self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                debug!(route = %oldest, "quota cache full, dropping oldest route");
                self.records.remove(&oldest);
            }
        }
    }

    pub fn record(&self, route: &str) -> Option<&RateLimitRecord> {
        self.records.get(route)
    }

    pub fn remaining(&self, route: &str) -> Option<u32> {
        self.records.get(route).map(|r| r.remaining)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn evict(&mut self, route: &str) {
        self.records.remove(route);
        self.order.retain(|r| r != route);
    }
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("routes", &self.records.len())
            .field("capacity", &self.capacity)
            .finish()
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_SIZE)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Clock that only moves when told to.
    #[derive(Debug)]
    pub(crate) struct ManualClock(Mutex<SystemTime>);

    impl ManualClock {
        pub(crate) fn at(secs: u64) -> Arc<Self> {
            Arc::new(Self(Mutex::new(
                SystemTime::UNIX_EPOCH + Duration::from_secs(secs),
            )))
        }

        pub(crate) fn advance(&self, by: Duration) {
            *self.0.lock().unwrap() += by;
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> SystemTime {
            *self.0.lock().unwrap()
        }
    }

    const T0: u64 = 1_500_000_000;

    fn at(secs: u64) -> SystemTime {
        SystemTime::UNIX_EPOCH + Duration::from_secs(secs)
    }

    /// Runs `acquire`, returning the delay it asked to wait for, if any.
    async fn acquire(limiter: &mut RateLimiter, route: &str) -> Option<Duration> {
        let waited = Mutex::new(None);
        limiter
            .acquire(route, |d| {
                *waited.lock().unwrap() = Some(d);
                std::future::ready(())
            })
            .await;
        waited.into_inner().unwrap()
    }

    #[tokio::test]
    async fn unknown_route_is_admitted() {
        let mut limiter = RateLimiter::with_clock(10, ManualClock::at(T0));
        assert_eq!(acquire(&mut limiter, "GET /gateway").await, None);
        assert!(limiter.is_empty());
    }

    #[tokio::test]
    async fn acquire_decrements_once_per_call() {
        let mut limiter = RateLimiter::with_clock(10, ManualClock::at(T0));
        limiter.refresh("r", 3, 5, at(T0 + 10));

        assert_eq!(acquire(&mut limiter, "r").await, None);
        assert_eq!(limiter.remaining("r"), Some(2));
        assert_eq!(acquire(&mut limiter, "r").await, None);
        assert_eq!(limiter.remaining("r"), Some(1));
    }

    #[tokio::test]
    async fn exhausted_route_blocks_until_reset() {
        let mut limiter = RateLimiter::with_clock(10, ManualClock::at(T0));
        limiter.refresh("r", 1, 5, at(T0 + 2));

        // Takes the last slot without waiting.
        assert_eq!(acquire(&mut limiter, "r").await, None);
        assert_eq!(limiter.remaining("r"), Some(0));

        // The next one waits out the window, then the record is gone.
        assert_eq!(acquire(&mut limiter, "r").await, Some(Duration::from_secs(2)));
        assert!(limiter.record("r").is_none());
        assert_eq!(acquire(&mut limiter, "r").await, None);
    }

    #[tokio::test]
    async fn stale_exhausted_record_is_dropped_without_waiting() {
        let clock = ManualClock::at(T0);
        let mut limiter = RateLimiter::with_clock(10, clock.clone());
        limiter.refresh("r", 0, 5, at(T0 + 1));
        clock.advance(Duration::from_secs(5));

        assert_eq!(acquire(&mut limiter, "r").await, None);
        assert!(limiter.record("r").is_none());
    }

    #[tokio::test]
    async fn consumed_after_reset_is_evicted_immediately() {
        let clock = ManualClock::at(T0);
        let mut limiter = RateLimiter::with_clock(10, clock.clone());
        limiter.refresh("r", 1, 5, at(T0 + 1));
        clock.advance(Duration::from_secs(3));

        assert_eq!(acquire(&mut limiter, "r").await, None);
        assert!(limiter.record("r").is_none());
    }

    #[test]
    fn capacity_evicts_least_recently_refreshed() {
        let mut limiter = RateLimiter::with_clock(3, ManualClock::at(T0));
        limiter.refresh("a", 5, 5, at(T0 + 10));
        limiter.refresh("b", 5, 5, at(T0 + 10));
        limiter.refresh("c", 5, 5, at(T0 + 10));
        limiter.refresh("d", 5, 5, at(T0 + 10));

        assert_eq!(limiter.len(), 3);
        assert!(limiter.record("a").is_none());
        assert!(limiter.record("d").is_some());
    }

    #[test]
    fn refresh_moves_route_to_back_of_order() {
        let mut limiter = RateLimiter::with_clock(3, ManualClock::at(T0));
        limiter.refresh("a", 5, 5, at(T0 + 10));
        limiter.refresh("b", 5, 5, at(T0 + 10));
        limiter.refresh("c", 5, 5, at(T0 + 10));
        limiter.refresh("a", 4, 5, at(T0 + 10));
        limiter.refresh("d", 5, 5, at(T0 + 10));

        assert_eq!(limiter.len(), 3);
        assert!(limiter.record("b").is_none());
        assert_eq!(limiter.remaining("a"), Some(4));
    }

    #[test]
    fn cache_never_exceeds_capacity() {
        let mut limiter = RateLimiter::with_clock(5, ManualClock::at(T0));
        for i in 0..50 {
            limiter.refresh(&format!("route-{i}"), 1, 1, at(T0 + 10));
            assert!(limiter.len() <= 5);
        }
        assert!(limiter.record("route-44").is_none());
        assert!(limiter.record("route-45").is_some());
    }
}
