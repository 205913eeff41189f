// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// https://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// https://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Global blocking on/off switch with a timed re-arm.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Holds `{enabled, disabledUntil}`. When `disabledUntil` elapses the
/// switch flips back to enabled on next access, with no background task
/// required.
pub struct DisableTimer {
    enabled: AtomicBool,
    disabled_until_epoch_secs: AtomicU64,
}

impl DisableTimer {
    pub fn new() -> Self {
        Self {
            enabled: AtomicBool::new(true),
            disabled_until_epoch_secs: AtomicU64::new(0),
        }
    }

    /// Disables blocking, optionally for a bounded duration. `None` means
    /// disabled indefinitely until re-enabled explicitly.
    pub fn disable(&self, duration: Option<Duration>) {
        self.enabled.store(false, Ordering::SeqCst);
        let until = duration
            .map(|d| now_epoch_secs() + d.as_secs())
            .unwrap_or(u64::MAX);
        self.disabled_until_epoch_secs.store(until, Ordering::SeqCst);
    }

    pub fn enable(&self) {
        self.enabled.store(true, Ordering::SeqCst);
        self.disabled_until_epoch_secs.store(0, Ordering::SeqCst);
    }

    /// Whether blocking is currently in effect; re-arms automatically if
    /// the disable window has elapsed.
    pub fn is_blocking_enabled(&self) -> bool {
        if self.enabled.load(Ordering::SeqCst) {
            return true;
        }
        let until = self.disabled_until_epoch_secs.load(Ordering::SeqCst);
        if until != u64::MAX && now_epoch_secs() >= until {
            self.enable();
            return true;
        }
        false
    }
}

impl Default for DisableTimer {
    fn default() -> Self {
        Self::new()
    }
}

fn now_epoch_secs() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_enabled() {
        let t = DisableTimer::new();
        assert!(t.is_blocking_enabled());
    }

    #[test]
    fn disable_then_enable() {
        let t = DisableTimer::new();
        t.disable(None);
        assert!(!t.is_blocking_enabled());
        t.enable();
        assert!(t.is_blocking_enabled());
    }

    #[test]
    fn disable_with_past_deadline_rearms() {
        let t = DisableTimer::new();
        t.enabled.store(false, Ordering::SeqCst);
        t.disabled_until_epoch_secs.store(1, Ordering::SeqCst); // long past
        assert!(t.is_blocking_enabled());
    }
}
