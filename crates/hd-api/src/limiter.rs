//! # Per-IP rate limiting
//!
//! Every client IP gets its own GCRA cell budget from a keyed `governor`
//! limiter: `burst` requests up front, refilled at `rate` per second. A
//! rejected check leaves the budget untouched and reports how long the client
//! has to wait.
//!
//! Keys live in governor's `DashMap` store. Idle keys are swept lazily: the
//! first check after `gc_interval` has passed drops every key whose budget is
//! back to full.

use std::num::NonZeroU32;
use std::sync::{Mutex, PoisonError, TryLockError};
use std::time::Duration;

use governor::clock::{Clock, DefaultClock, Reference};
use governor::middleware::NoOpMiddleware;
use governor::state::keyed::DashMapStateStore;
use governor::{Quota, RateLimiter};
use hd_core::error::{AppError, Result};

/// Slowest refill accepted, roughly one request per minute.
pub const MIN_RATE_PER_SEC: f64 = 0.0167;

type KeyedLimiter<C> = RateLimiter<String, DashMapStateStore<String>, C, NoOpMiddleware<<C as Clock>::Instant>>;

pub struct IpRateLimiter<C: Clock = DefaultClock> {
    limiter: KeyedLimiter<C>,
    clock: C,
    quota: Quota,
    gc_interval: Duration,
    last_gc: Mutex<C::Instant>,
}

/// Cell period for `rate` requests per second, floored at [`MIN_RATE_PER_SEC`].
fn quota_for(rate: f64, burst: NonZeroU32) -> Quota {
    let rate = if rate.is_finite() { rate.max(MIN_RATE_PER_SEC) } else { MIN_RATE_PER_SEC };
    let period = Duration::from_secs_f64(1.0 / rate).max(Duration::from_nanos(1));
    Quota::with_period(period)
        .unwrap_or_else(|| Quota::per_second(NonZeroU32::MIN))
        .allow_burst(burst)
}

impl IpRateLimiter {
    pub fn new(rate: f64, burst: NonZeroU32, gc_interval: Duration) -> Self {
        Self::with_clock(rate, burst, gc_interval, DefaultClock::default())
    }

    /// Builds a limiter from "requests per minute" settings.
    ///
    /// Returns `None` when `requests_per_minute` is not positive, which turns
    /// limiting off. A burst below 1 and a rate below [`MIN_RATE_PER_SEC`]
    /// are raised to those minimums.
    pub fn from_settings(requests_per_minute: i64, burst: i64, gc_interval: Duration) -> Option<Self> {
        if requests_per_minute <= 0 {
            tracing::info!(requests_per_minute, "rate limiting disabled");
            return None;
        }

        let burst = u32::try_from(burst).ok().and_then(NonZeroU32::new).unwrap_or_else(|| {
            if burst < 1 {
                tracing::warn!(configured = burst, "rate limit burst raised to 1");
                NonZeroU32::MIN
            } else {
                NonZeroU32::MAX
            }
        });

        let mut rate = requests_per_minute as f64 / 60.0;
        if rate < MIN_RATE_PER_SEC {
            tracing::warn!(configured = rate, adjusted = MIN_RATE_PER_SEC, "rate limit raised to minimum");
            rate = MIN_RATE_PER_SEC;
        }

        tracing::info!(requests_per_minute, rate_per_sec = rate, burst = burst.get(), "rate limiter configured");
        Some(Self::new(rate, burst, gc_interval))
    }
}

impl<C: Clock + Clone> IpRateLimiter<C> {
    pub fn with_clock(rate: f64, burst: NonZeroU32, gc_interval: Duration, clock: C) -> Self {
        let quota = quota_for(rate, burst);
        let last_gc = Mutex::new(clock.now());
        Self {
            limiter: RateLimiter::dashmap_with_clock(quota, clock.clone()),
            clock,
            quota,
            gc_interval,
            last_gc,
        }
    }

    pub fn burst(&self) -> u32 {
        self.quota.burst_size().get()
    }

    /// Time between two refilled cells.
    pub fn period(&self) -> Duration {
        self.quota.replenish_interval()
    }

    pub fn tracked(&self) -> usize {
        self.limiter.len()
    }

    /// Spends one cell for `ip`. A rejection carries the wait before a retry
    /// can succeed, rounded up to the millisecond.
    pub fn check(&self, ip: &str) -> Result<()> {
        self.collect_idle();

        match self.limiter.check_key(&ip.to_string()) {
            Ok(()) => Ok(()),
            Err(not_until) => {
                let wait = not_until.wait_time_from(self.clock.now());
                let retry_after_ms = u64::try_from(wait.as_nanos().div_ceil(1_000_000)).unwrap_or(u64::MAX);
                tracing::warn!(
                    ip,
                    retry_after_ms,
                    retry_after_secs = crate::error::retry_after_secs(Duration::from_millis(retry_after_ms)),
                    "rate limit exceeded"
                );
                Err(AppError::RateLimited { retry_after_ms })
            }
        }
    }

    /// Evicts keys whose budget is full again, at most once per `gc_interval`.
    /// A sweep already in progress elsewhere makes this a no-op.
    fn collect_idle(&self) {
        let mut last = match self.last_gc.try_lock() {
            Ok(guard) => guard,
            Err(TryLockError::Poisoned(poisoned)) => PoisonError::into_inner(poisoned),
            Err(TryLockError::WouldBlock) => return,
        };
        let now = self.clock.now();
        if Duration::from(now.duration_since(*last)) < self.gc_interval {
            return;
        }

        let before = self.limiter.len();
        self.limiter.retain_recent();
        *last = now;

        let removed = before.saturating_sub(self.limiter.len());
        if removed > 0 {
            tracing::debug!(removed, tracked = self.limiter.len(), "idle rate limiters evicted");
        }
    }
}
