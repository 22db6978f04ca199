// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Process-wide pacing of geocoding requests

use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use std::num::NonZeroU32;
use std::time::Duration;

/// Enforces a minimum gap between geocoding requests.
///
/// One limiter is shared (behind an `Arc`) by every caller that talks to the
/// geocoding provider, so concurrent resolutions still queue behind it.
pub struct GeocodeLimiter {
    limiter: Option<RateLimiter<NotKeyed, InMemoryState, DefaultClock>>,
    min_interval: Duration,
}

impl GeocodeLimiter {
    /// A zero interval disables pacing
    pub fn new(min_interval: Duration) -> Self {
        let limiter = Quota::with_period(min_interval)
            .map(|quota| RateLimiter::direct(quota.allow_burst(NonZeroU32::MIN)));
        Self { limiter, min_interval }
    }

    /// Wait until the next request is permitted
    pub async fn acquire(&self) {
        if let Some(limiter) = &self.limiter {
            limiter.until_ready().await;
        }
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[tokio::test]
    async fn test_acquire_spaces_requests() {
        let limiter = GeocodeLimiter::new(Duration::from_millis(80));
        let mut stamps = Vec::new();
        for _ in 0..3 {
            limiter.acquire().await;
            stamps.push(Instant::now());
        }
        for pair in stamps.windows(2) {
            // allow for clock granularity between the limiter and std::time
            assert!(pair[1] - pair[0] >= Duration::from_millis(75));
        }
    }

    #[test]
    fn test_zero_interval_is_unlimited() {
        let limiter = GeocodeLimiter::new(Duration::ZERO);
        let start = Instant::now();
        tokio_test::block_on(async {
            for _ in 0..50 {
                limiter.acquire().await;
            }
        });
        assert!(start.elapsed() < Duration::from_millis(50));
        assert_eq!(limiter.min_interval(), Duration::ZERO);
    }
}
