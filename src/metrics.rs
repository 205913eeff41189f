// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// https://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// https://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! A thin metrics facade so the pipeline never talks to a concrete
//! exporter. The in-memory implementation backs both tests and the
//! health snapshot surfaced to the (externally owned) admin API.

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters a `Metrics` implementation must track.
pub trait Metrics: Send + Sync {
    fn record_query(&self);
    fn record_cache_hit(&self);
    fn record_cache_miss(&self);
    fn record_blocked(&self);
    fn record_upstream_failure(&self);
    fn record_servfail(&self);
    fn record_internal_error(&self);
    fn snapshot(&self) -> HealthSnapshot;
}

/// Point-in-time counters, exposed to the (externally owned) health API.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct HealthSnapshot {
    pub queries_total: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub blocked_total: u64,
    pub upstream_failures: u64,
    pub servfail_total: u64,
    pub internal_errors: u64,
}

#[derive(Default)]
pub struct InMemoryMetrics {
    queries_total: AtomicU64,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    blocked_total: AtomicU64,
    upstream_failures: AtomicU64,
    servfail_total: AtomicU64,
    internal_errors: AtomicU64,
}

impl Metrics for InMemoryMetrics {
    fn record_query(&self) {
        self.queries_total.fetch_add(1, Ordering::Relaxed);
    }

    fn record_cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    fn record_cache_miss(&self) {
        self.cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    fn record_blocked(&self) {
        self.blocked_total.fetch_add(1, Ordering::Relaxed);
    }

    fn record_upstream_failure(&self) {
        self.upstream_failures.fetch_add(1, Ordering::Relaxed);
    }

    fn record_servfail(&self) {
        self.servfail_total.fetch_add(1, Ordering::Relaxed);
    }

    fn record_internal_error(&self) {
        self.internal_errors.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> HealthSnapshot {
        HealthSnapshot {
            queries_total: self.queries_total.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.cache_misses.load(Ordering::Relaxed),
            blocked_total: self.blocked_total.load(Ordering::Relaxed),
            upstream_failures: self.upstream_failures.load(Ordering::Relaxed),
            servfail_total: self.servfail_total.load(Ordering::Relaxed),
            internal_errors: self.internal_errors.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate() {
        let m = InMemoryMetrics::default();
        m.record_query();
        m.record_query();
        m.record_cache_hit();
        let snap = m.snapshot();
        assert_eq!(snap.queries_total, 2);
        assert_eq!(snap.cache_hits, 1);
    }
}
