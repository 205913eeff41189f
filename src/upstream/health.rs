// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// https://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// https://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Per-upstream health tracking: consecutive failures and a cool-down
//! window after repeated failure.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::{Duration, Instant};

const FAILURE_THRESHOLD: u32 = 5;
const DISABLE_DURATION: Duration = Duration::from_secs(60);

pub struct UpstreamHealth {
    consecutive_failures: AtomicU32,
    /// Millis since an arbitrary epoch (`Instant` isn't atomically
    /// storable, so we track an offset from a fixed reference instant).
    disabled_until_millis: AtomicU64,
    reference: Instant,
}

impl UpstreamHealth {
    pub fn new() -> Self {
        Self {
            consecutive_failures: AtomicU32::new(0),
            disabled_until_millis: AtomicU64::new(0),
            reference: Instant::now(),
        }
    }

    pub fn record_success(&self) {
        self.consecutive_failures.store(0, Ordering::SeqCst);
        self.disabled_until_millis.store(0, Ordering::SeqCst);
    }

    pub fn record_failure(&self) {
        let failures = self.consecutive_failures.fetch_add(1, Ordering::SeqCst) + 1;
        if failures >= FAILURE_THRESHOLD {
            let until = Instant::now() + DISABLE_DURATION;
            let millis = until.saturating_duration_since(self.reference).as_millis() as u64;
            self.disabled_until_millis.store(millis, Ordering::SeqCst);
        }
    }

    pub fn is_disabled(&self) -> bool {
        let millis = self.disabled_until_millis.load(Ordering::SeqCst);
        if millis == 0 {
            return false;
        }
        let until = self.reference + Duration::from_millis(millis);
        Instant::now() < until
    }
}

impl Default for UpstreamHealth {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disables_after_threshold_failures() {
        let h = UpstreamHealth::new();
        for _ in 0..FAILURE_THRESHOLD - 1 {
            h.record_failure();
            assert!(!h.is_disabled());
        }
        h.record_failure();
        assert!(h.is_disabled());
    }

    #[test]
    fn success_clears_failures() {
        let h = UpstreamHealth::new();
        for _ in 0..FAILURE_THRESHOLD {
            h.record_failure();
        }
        assert!(h.is_disabled());
        h.record_success();
        assert!(!h.is_disabled());
    }
}
