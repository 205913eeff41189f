// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// https://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// https://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Per-client token bucket rate limiter. The outermost guard in the
//! pipeline: over-limit requests are refused before any other step runs
//! (blocklist hits are logged after the rate-limit decision, never
//! counted against it).

use std::collections::HashMap;
use std::net::IpAddr;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

struct Bucket {
    tokens: f64,
    last_refill: Instant,
    last_used: Instant,
}

/// Buckets expire 10 minutes after last use.
const BUCKET_IDLE_EXPIRY: Duration = Duration::from_secs(600);

pub struct RateLimiter {
    capacity: u32,
    window: Duration,
    buckets: Mutex<HashMap<IpAddr, Bucket>>,
}

impl RateLimiter {
    pub fn new(capacity: u32, window: Duration) -> Self {
        Self {
            capacity,
            window,
            buckets: Mutex::new(HashMap::new()),
        }
    }

    /// Attempts to consume one token for `client`. Returns `true` if the
    /// request may proceed.
    pub fn allow(&self, client: IpAddr) -> bool {
        self.allow_at(client, Instant::now())
    }

    fn allow_at(&self, client: IpAddr, now: Instant) -> bool {
        let refill_rate = self.capacity as f64 / self.window.as_secs_f64().max(0.001);
        let mut buckets = self.buckets.lock();
        buckets.retain(|_, b| now.saturating_duration_since(b.last_used) < BUCKET_IDLE_EXPIRY);

        let bucket = buckets.entry(client).or_insert_with(|| Bucket {
            tokens: self.capacity as f64,
            last_refill: now,
            last_used: now,
        });

        let elapsed = now.saturating_duration_since(bucket.last_refill).as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * refill_rate).min(self.capacity as f64);
        bucket.last_refill = now;
        bucket.last_used = now;

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allows_up_to_capacity_then_refuses() {
        let limiter = RateLimiter::new(3, Duration::from_secs(60));
        let client: IpAddr = "127.0.0.1".parse().unwrap();
        let now = Instant::now();
        assert!(limiter.allow_at(client, now));
        assert!(limiter.allow_at(client, now));
        assert!(limiter.allow_at(client, now));
        assert!(!limiter.allow_at(client, now));
    }

    #[test]
    fn refills_over_time() {
        let limiter = RateLimiter::new(2, Duration::from_secs(2));
        let client: IpAddr = "127.0.0.1".parse().unwrap();
        let now = Instant::now();
        assert!(limiter.allow_at(client, now));
        assert!(limiter.allow_at(client, now));
        assert!(!limiter.allow_at(client, now));
        // After a full window, both tokens should have refilled.
        let later = now + Duration::from_secs(2);
        assert!(limiter.allow_at(client, later));
        assert!(limiter.allow_at(client, later));
    }

    #[test]
    fn independent_clients() {
        let limiter = RateLimiter::new(1, Duration::from_secs(60));
        let now = Instant::now();
        let a: IpAddr = "10.0.0.1".parse().unwrap();
        let b: IpAddr = "10.0.0.2".parse().unwrap();
        assert!(limiter.allow_at(a, now));
        assert!(!limiter.allow_at(a, now));
        assert!(limiter.allow_at(b, now));
    }
}
