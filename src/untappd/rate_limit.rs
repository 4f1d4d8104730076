//! Request pacing for the Untappd backends, on top of `governor`.

use std::num::NonZeroU32;
use std::time::Duration;

use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};

pub type Limiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// One request per `period`, without bursts.
pub fn every(period: Duration) -> Limiter {
    let quota = Quota::with_period(period).unwrap_or_else(|| Quota::per_second(NonZeroU32::MAX));
    RateLimiter::direct(quota)
}

/// At most `max_requests` in an hour; an idle limiter lets them through at once.
pub fn per_hour(max_requests: u32) -> Limiter {
    let max_requests = NonZeroU32::new(max_requests).unwrap_or(NonZeroU32::MIN);
    RateLimiter::direct(Quota::per_hour(max_requests))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_request_per_period() {
        let limiter = every(Duration::from_secs(5));
        assert!(limiter.check().is_ok());
        assert!(limiter.check().is_err());
    }

    #[test]
    fn hourly_quota_allows_a_burst() {
        let limiter = per_hour(3);
        for _ in 0..3 {
            assert!(limiter.check().is_ok());
        }
        assert!(limiter.check().is_err());
    }

    #[test]
    fn zero_period_does_not_block() {
        let limiter = every(Duration::ZERO);
        for _ in 0..100 {
            assert!(limiter.check().is_ok());
        }
    }

    #[tokio::test]
    async fn waits_for_the_next_slot() {
        let limiter = every(Duration::from_millis(50));
        let start = std::time::Instant::now();
        limiter.until_ready().await;
        limiter.until_ready().await;
        assert!(start.elapsed() >= Duration::from_millis(40));
    }
}
