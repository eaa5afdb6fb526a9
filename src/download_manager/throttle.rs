//! Request rate limiting for media downloads.
//!
//! Every request, retries included, passes through one shared gate so the
//! aggregate request rate never exceeds the configured ceiling regardless of
//! how many fetches are in flight.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Trait for request throttling.
#[async_trait]
pub trait RequestThrottle: Send + Sync {
    /// Wait until one more request may be issued.
    async fn acquire(&self);

    /// Requests granted so far and the time spent waiting for them.
    async fn get_stats(&self) -> ThrottleStats;
}

/// Current throttle statistics.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ThrottleStats {
    /// Requests let through so far
    pub granted: u64,
    /// Accumulated time callers spent waiting
    pub total_wait: Duration,
}

/// Configured request rate.
#[derive(Debug, Clone, PartialEq)]
pub enum RateLimit {
    Off,
    /// At most one request per `interval`.
    Interval(Duration),
    /// Up to `burst` back-to-back requests, refilled one per `interval`.
    Bucket { interval: Duration, burst: u32 },
}

impl RateLimit {
    /// Spacing between requests in the steady state.
    pub fn interval(&self) -> Duration {
        match self {
            RateLimit::Off => Duration::ZERO,
            RateLimit::Interval(interval) | RateLimit::Bucket { interval, .. } => *interval,
        }
    }

    pub fn build(&self) -> Arc<dyn RequestThrottle> {
        match self {
            RateLimit::Off => Arc::new(NoOpThrottle),
            RateLimit::Interval(interval) if interval.is_zero() => Arc::new(NoOpThrottle),
            RateLimit::Interval(interval) => Arc::new(IntervalThrottle::new(*interval)),
            RateLimit::Bucket { interval, .. } if interval.is_zero() => Arc::new(NoOpThrottle),
            RateLimit::Bucket { interval, burst } if *burst <= 1 => {
                Arc::new(IntervalThrottle::new(*interval))
            }
            RateLimit::Bucket { interval, burst } => {
                Arc::new(TokenBucketThrottle::new(*interval, *burst))
            }
        }
    }
}

impl Default for RateLimit {
    fn default() -> Self {
        RateLimit::Interval(Duration::from_secs(2))
    }
}

#[derive(Debug, Default)]
struct IntervalState {
    next_slot: Option<Instant>,
    stats: ThrottleStats,
}

/// Fixed-interval gate: requests are spaced at least `interval` apart.
///
/// Callers reserve the next free slot under the lock and sleep outside it, so
/// concurrent callers queue up in arrival order.
pub struct IntervalThrottle {
    interval: Duration,
    state: Mutex<IntervalState>,
}

impl IntervalThrottle {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            state: Mutex::new(IntervalState::default()),
        }
    }
}

#[async_trait]
impl RequestThrottle for IntervalThrottle {
    async fn acquire(&self) {
        let slot = {
            let mut state = self.state.lock().await;
            let now = Instant::now();
            let slot = match state.next_slot {
                Some(next) if next > now => next,
                _ => now,
            };
            state.next_slot = Some(slot + self.interval);
            state.stats.granted += 1;
            state.stats.total_wait += slot - now;
            slot
        };
        tokio::time::sleep_until(slot).await;
    }

    async fn get_stats(&self) -> ThrottleStats {
        self.state.lock().await.stats.clone()
    }
}

#[derive(Debug)]
struct BucketState {
    /// May go negative: each unit below zero is one queued reservation.
    tokens: f64,
    last_refill: Instant,
    stats: ThrottleStats,
}

/// Token bucket of `burst` capacity refilled at one token per `interval`.
pub struct TokenBucketThrottle {
    interval: Duration,
    capacity: f64,
    state: Mutex<BucketState>,
}

impl TokenBucketThrottle {
    pub fn new(interval: Duration, burst: u32) -> Self {
        let capacity = f64::from(burst.max(1));
        Self {
            interval,
            capacity,
            state: Mutex::new(BucketState {
                tokens: capacity,
                last_refill: Instant::now(),
                stats: ThrottleStats::default(),
            }),
        }
    }

    fn refill(&self, state: &mut BucketState, now: Instant) {
        let elapsed = now.saturating_duration_since(state.last_refill);
        let gained = elapsed.as_secs_f64() / self.interval.as_secs_f64();
        state.tokens = (state.tokens + gained).min(self.capacity);
        state.last_refill = now;
    }
}

#[async_trait]
impl RequestThrottle for TokenBucketThrottle {
    async fn acquire(&self) {
        let wait = {
            let mut state = self.state.lock().await;
            let now = Instant::now();
            self.refill(&mut state, now);
            state.tokens -= 1.0;
            let wait = if state.tokens >= 0.0 {
                Duration::ZERO
            } else {
                self.interval.mul_f64(-state.tokens)
            };
            state.stats.granted += 1;
            state.stats.total_wait += wait;
            wait
        };
        if !wait.is_zero() {
            tokio::time::sleep(wait).await;
        }
    }

    async fn get_stats(&self) -> ThrottleStats {
        self.state.lock().await.stats.clone()
    }
}

/// No-op throttler that always allows requests.
/// Used when throttling is disabled.
pub struct NoOpThrottle;

#[async_trait]
impl RequestThrottle for NoOpThrottle {
    async fn acquire(&self) {}

    async fn get_stats(&self) -> ThrottleStats {
        ThrottleStats::default()
    }
}
