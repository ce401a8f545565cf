//! Hourly promotion budget.
//!
//! Buckets align to clock hours. Check and increment share one critical
//! section in [`HourlyRateLimiter::try_acquire`], so `count` never exceeds
//! `cap` however many callers race.

use std::sync::Arc;

use bastion_core::Clock;
use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::{PipelineError, PipelineResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PromotionTicket {
    pub hour_bucket: DateTime<Utc>,
    pub count: u32,
    pub cap: u32,
}

impl PromotionTicket {
    #[must_use]
    pub fn remaining(&self) -> u32 {
        self.cap.saturating_sub(self.count)
    }

    #[must_use]
    pub fn next_bucket(&self) -> DateTime<Utc> {
        self.hour_bucket + Duration::hours(1)
    }
}

/// Start of the clock hour containing `at`.
fn hour_bucket(at: DateTime<Utc>) -> DateTime<Utc> {
    let secs = at.timestamp();
    DateTime::from_timestamp(secs - secs.rem_euclid(3_600), 0).unwrap_or(at)
}

pub struct HourlyRateLimiter {
    clock: Arc<dyn Clock>,
    ticket: Mutex<PromotionTicket>,
}

impl HourlyRateLimiter {
    pub fn new(cap: u32, clock: Arc<dyn Clock>) -> Self {
        let ticket = PromotionTicket {
            hour_bucket: hour_bucket(clock.now()),
            count: 0,
            cap,
        };
        Self {
            clock,
            ticket: Mutex::new(ticket),
        }
    }

    fn current(&self, ticket: &mut PromotionTicket) {
        let bucket = hour_bucket(self.clock.now());
        if bucket != ticket.hour_bucket {
            debug!(bucket = %bucket, previous_count = ticket.count, "Promotion bucket rolled over");
            ticket.hour_bucket = bucket;
            ticket.count = 0;
        }
    }

    fn exceeded(ticket: &PromotionTicket) -> PipelineError {
        warn!(
            cap = ticket.cap,
            retry_at = %ticket.next_bucket(),
            "Promotion rate limit reached"
        );
        PipelineError::RateLimitExceeded {
            cap: ticket.cap,
            retry_at: ticket.next_bucket(),
        }
    }

    /// Current bucket if it still has room. Does not consume.
    pub fn check_rate_limit(&self) -> PipelineResult<PromotionTicket> {
        let mut ticket = self.ticket.lock();
        self.current(&mut ticket);
        if ticket.count >= ticket.cap {
            return Err(Self::exceeded(&ticket));
        }
        Ok(*ticket)
    }

    /// Consume one slot of the current bucket.
    pub fn increment_rate_limit(&self) -> PipelineResult<PromotionTicket> {
        self.try_acquire()
    }

    /// Check and consume as one step.
    pub fn try_acquire(&self) -> PipelineResult<PromotionTicket> {
        let mut ticket = self.ticket.lock();
        self.current(&mut ticket);
        if ticket.count >= ticket.cap {
            return Err(Self::exceeded(&ticket));
        }
        ticket.count += 1;
        Ok(*ticket)
    }

    /// Return a slot taken by `try_acquire` whose attempt did not commit.
    ///
    /// A slot from an expired bucket is not returned to the current one.
    pub fn release(&self, acquired: &PromotionTicket) {
        let mut ticket = self.ticket.lock();
        self.current(&mut ticket);
        if ticket.hour_bucket == acquired.hour_bucket && ticket.count > 0 {
            ticket.count -= 1;
        }
    }

    pub fn snapshot(&self) -> PromotionTicket {
        let mut ticket = self.ticket.lock();
        self.current(&mut ticket);
        *ticket
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bastion_core::ManualClock;

    #[test]
    fn test_release_returns_slot_to_same_bucket_only() {
        let clock = Arc::new(ManualClock::default());
        let limiter = HourlyRateLimiter::new(2, clock.clone());

        let first = limiter.try_acquire().unwrap();
        let second = limiter.try_acquire().unwrap();
        limiter.release(&second);
        assert_eq!(limiter.snapshot().count, 1);

        clock.advance(Duration::hours(1));
        limiter.try_acquire().unwrap();
        limiter.release(&first);
        assert_eq!(limiter.snapshot().count, 1);
    }

    #[test]
    fn test_cap_enforced_and_next_bucket_reported() {
        let clock = Arc::new(ManualClock::default());
        clock.advance(Duration::minutes(20));
        let limiter = HourlyRateLimiter::new(2, clock.clone());

        assert_eq!(limiter.check_rate_limit().unwrap().remaining(), 2);
        limiter.try_acquire().unwrap();
        limiter.increment_rate_limit().unwrap();

        let Err(PipelineError::RateLimitExceeded { cap, retry_at }) = limiter.try_acquire() else {
            panic!("expected RateLimitExceeded");
        };
        assert_eq!(cap, 2);
        assert_eq!(retry_at, ManualClock::default().now() + Duration::hours(1));
        assert!(limiter.check_rate_limit().is_err());
        assert_eq!(limiter.snapshot().count, 2);
    }

    #[test]
    fn test_bucket_rolls_over_on_the_hour() {
        let clock = Arc::new(ManualClock::default());
        let limiter = HourlyRateLimiter::new(1, clock.clone());
        limiter.try_acquire().unwrap();
        assert!(limiter.try_acquire().is_err());

        clock.advance(Duration::minutes(59));
        assert!(limiter.try_acquire().is_err());
        clock.advance(Duration::minutes(1));
        let ticket = limiter.try_acquire().unwrap();
        assert_eq!(ticket.count, 1);
        assert_eq!(ticket.hour_bucket, ManualClock::default().now() + Duration::hours(1));
    }

    #[test]
    fn test_concurrent_acquire_never_exceeds_cap() {
        let clock: Arc<dyn Clock> = Arc::new(ManualClock::default());
        let limiter = Arc::new(HourlyRateLimiter::new(50, clock));

        let granted: usize = std::thread::scope(|s| {
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    let limiter = Arc::clone(&limiter);
                    s.spawn(move || (0..20).filter(|_| limiter.try_acquire().is_ok()).count())
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).sum()
        });

        assert_eq!(granted, 50);
        assert_eq!(limiter.snapshot().count, 50);
    }
}
