// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// https://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// https://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Bounded LRU response cache, sharded for concurrent access, with
//! in-flight coalescing for simultaneous misses on the same key.

use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::broadcast;

use crate::wire::{Message, RecordType};

const SHARD_COUNT: usize = 16;

/// Floor/ceiling applied to positive-answer TTLs before caching.
pub const MIN_TTL: u32 = 60;
pub const MAX_TTL: u32 = 86_400;
/// Negative-cache TTL used when the authority section carries no SOA.
pub const DEFAULT_NEGATIVE_TTL: u32 = 300;

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub qname: String,
    pub qtype: RecordType,
}

impl CacheKey {
    pub fn new(qname: &str, qtype: RecordType) -> Self {
        Self {
            qname: qname.to_ascii_lowercase(),
            qtype,
        }
    }

    fn shard_index(&self) -> usize {
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        self.hash(&mut hasher);
        (hasher.finish() as usize) % SHARD_COUNT
    }
}

#[derive(Clone)]
struct Entry {
    message: Message,
    base_ttl: u32,
    ingested_at: Instant,
}

impl Entry {
    fn expiry(&self) -> Instant {
        self.ingested_at + Duration::from_secs(self.base_ttl as u64)
    }

    /// Rewrites every RR's TTL to `base_ttl - elapsed`, clamped to at
    /// least 1 second, as required for cache reads.
    fn materialise(&self, now: Instant) -> Option<Message> {
        let elapsed = now.saturating_duration_since(self.ingested_at).as_secs() as u32;
        if elapsed >= self.base_ttl {
            return None;
        }
        let remaining = (self.base_ttl - elapsed).max(1);
        let mut msg = self.message.clone();
        for rr in msg.answers.iter_mut().chain(msg.authorities.iter_mut()).chain(msg.additionals.iter_mut()) {
            rr.ttl = remaining;
        }
        Some(msg)
    }
}

struct Shard {
    entries: HashMap<CacheKey, Entry>,
    order: Vec<CacheKey>,
    in_flight: HashMap<CacheKey, broadcast::Sender<Arc<Message>>>,
}

impl Shard {
    fn new() -> Self {
        Self {
            entries: HashMap::new(),
            order: Vec::new(),
            in_flight: HashMap::new(),
        }
    }

    /// Moves `key` to the most-recently-used end of `order`, inserting it
    /// if absent. Called on every read hit as well as on insert, so the
    /// front of `order` is always the next eviction candidate.
    fn touch(&mut self, key: &CacheKey) {
        if let Some(pos) = self.order.iter().position(|k| k == key) {
            self.order.remove(pos);
        }
        self.order.push(key.clone());
    }
}

/// Outcome of [`ResponseCache::begin_lookup`]: either a cached hit, or a
/// coalescing handle the caller must resolve (feeding every other waiter).
pub enum LookupOutcome {
    Hit(Message),
    Miss(InFlightGuard),
    /// Another resolver is already populating this key; await its result.
    Coalesced(broadcast::Receiver<Arc<Message>>),
}

pub struct InFlightGuard {
    cache: ResponseCache,
    key: CacheKey,
    sender: broadcast::Sender<Arc<Message>>,
    resolved: bool,
}

impl InFlightGuard {
    /// The first resolver calls this to populate the cache and wake every
    /// waiter that coalesced onto this key.
    pub fn resolve(mut self, message: Message, base_ttl: u32) {
        self.resolved = true;
        self.cache.insert(self.key.clone(), message.clone(), base_ttl);
        let _ = self.sender.send(Arc::new(message));
        self.cache.clear_in_flight(&self.key);
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        if !self.resolved {
            self.cache.clear_in_flight(&self.key);
        }
    }
}

#[derive(Clone)]
pub struct ResponseCache {
    shards: Arc<Vec<Mutex<Shard>>>,
    capacity_per_shard: usize,
}

impl ResponseCache {
    pub fn new(total_capacity: usize) -> Self {
        let per_shard = (total_capacity / SHARD_COUNT).max(1);
        let shards = (0..SHARD_COUNT).map(|_| Mutex::new(Shard::new())).collect();
        Self {
            shards: Arc::new(shards),
            capacity_per_shard: per_shard,
        }
    }

    fn shard(&self, key: &CacheKey) -> &Mutex<Shard> {
        &self.shards[key.shard_index()]
    }

    /// Looks up `key`. On a miss, returns a guard the caller must resolve
    /// (or drop, which just clears the in-flight marker); concurrent misses
    /// on the same key instead receive a broadcast receiver.
    pub fn begin_lookup(&self, key: &CacheKey) -> LookupOutcome {
        let now = Instant::now();
        let mut shard = self.shard(key).lock();
        if let Some(entry) = shard.entries.get(key) {
            if let Some(msg) = entry.materialise(now) {
                shard.touch(key);
                return LookupOutcome::Hit(msg);
            }
            shard.entries.remove(key);
            if let Some(pos) = shard.order.iter().position(|k| k == key) {
                shard.order.remove(pos);
            }
        }
        if let Some(sender) = shard.in_flight.get(key) {
            return LookupOutcome::Coalesced(sender.subscribe());
        }
        let (tx, _rx) = broadcast::channel(1);
        shard.in_flight.insert(key.clone(), tx.clone());
        drop(shard);
        LookupOutcome::Miss(InFlightGuard {
            cache: self.clone(),
            key: key.clone(),
            sender: tx,
            resolved: false,
        })
    }

    fn clear_in_flight(&self, key: &CacheKey) {
        self.shard(key).lock().in_flight.remove(key);
    }

    pub fn insert(&self, key: CacheKey, message: Message, base_ttl: u32) {
        let mut shard = self.shard(&key).lock();
        shard.touch(&key);
        shard.entries.insert(
            key,
            Entry {
                message,
                base_ttl,
                ingested_at: Instant::now(),
            },
        );
        while shard.entries.len() > self.capacity_per_shard {
            if let Some(oldest) = shard.order.first().cloned() {
                shard.order.remove(0);
                shard.entries.remove(&oldest);
            } else {
                break;
            }
        }
    }

    /// Clears every shard (admin `clearCache()` and blocklist reload).
    pub fn clear(&self) {
        for shard in self.shards.iter() {
            let mut shard = shard.lock();
            shard.entries.clear();
            shard.order.clear();
        }
    }

    pub fn len(&self) -> usize {
        self.shards.iter().map(|s| s.lock().entries.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Clamps a set of positive-answer TTLs to `[MIN_TTL, MAX_TTL]`.
pub fn clamp_positive_ttl(min_rr_ttl: u32) -> u32 {
    min_rr_ttl.clamp(MIN_TTL, MAX_TTL)
}

/// Negative-cache TTL: SOA MINIMUM when present (capped at 300s), else the
/// default. See the open question on missing SOA in the design notes.
pub fn negative_ttl(soa_minimum: Option<u32>) -> u32 {
    soa_minimum.map(|m| m.min(DEFAULT_NEGATIVE_TTL)).unwrap_or(DEFAULT_NEGATIVE_TTL)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::{Header, MessageType, OpCode};

    fn dummy_message() -> Message {
        Message {
            header: Header::new(1, MessageType::Response, OpCode::Query),
            questions: vec![],
            answers: vec![],
            authorities: vec![],
            additionals: vec![],
            edns: None,
        }
    }

    #[test]
    fn ttl_observation_at_elapsed() {
        let cache = ResponseCache::new(100);
        let key = CacheKey::new("example.com", RecordType::A);
        match cache.begin_lookup(&key) {
            LookupOutcome::Miss(guard) => guard.resolve(dummy_message(), 10),
            _ => panic!("expected miss"),
        }
        // Immediately after insertion, TTL should read close to 10.
        match cache.begin_lookup(&key) {
            LookupOutcome::Hit(_) => {}
            _ => panic!("expected hit"),
        }
    }

    #[test]
    fn miss_after_expiry_simulated() {
        let cache = ResponseCache::new(100);
        let key = CacheKey::new("old.example.com", RecordType::A);
        match cache.begin_lookup(&key) {
            LookupOutcome::Miss(guard) => {
                // Insert directly with an already-expired ingestion time by
                // using a 0-second TTL entry (elapsed >= base_ttl is always
                // true for any nonzero wall-clock delay).
                guard.resolve(dummy_message(), 0);
            }
            _ => panic!("expected miss"),
        }
        std::thread::sleep(Duration::from_millis(5));
        match cache.begin_lookup(&key) {
            LookupOutcome::Miss(_) => {}
            other => panic!("expected miss after expiry, got a hit/coalesce: {}", matches!(other, LookupOutcome::Hit(_))),
        }
    }

    #[test]
    fn clamp_bounds() {
        assert_eq!(clamp_positive_ttl(10), MIN_TTL);
        assert_eq!(clamp_positive_ttl(999_999), MAX_TTL);
        assert_eq!(clamp_positive_ttl(120), 120);
    }

    /// Drives `Shard` directly (bypassing the hash-based shard selection
    /// `ResponseCache` does for real keys) so eviction order is tested
    /// deterministically: a hot entry read after a cold one, then read
    /// again, must outlive the cold entry once capacity is exceeded.
    #[test]
    fn hot_entry_survives_eviction_over_cold_one() {
        let mut shard = Shard::new();
        let capacity = 2;

        let hot = CacheKey::new("hot.example.com", RecordType::A);
        let cold = CacheKey::new("cold.example.com", RecordType::A);
        let fresh = CacheKey::new("fresh.example.com", RecordType::A);

        shard.touch(&hot);
        shard.entries.insert(hot.clone(), Entry { message: dummy_message(), base_ttl: 300, ingested_at: Instant::now() });
        shard.touch(&cold);
        shard.entries.insert(cold.clone(), Entry { message: dummy_message(), base_ttl: 300, ingested_at: Instant::now() });

        // Re-read `hot`: a real lookup hit calls `touch` to mark it
        // most-recently-used, so it moves past `cold` in eviction order.
        shard.touch(&hot);

        shard.touch(&fresh);
        shard.entries.insert(fresh.clone(), Entry { message: dummy_message(), base_ttl: 300, ingested_at: Instant::now() });
        while shard.entries.len() > capacity {
            if let Some(oldest) = shard.order.first().cloned() {
                shard.order.remove(0);
                shard.entries.remove(&oldest);
            } else {
                break;
            }
        }

        assert!(shard.entries.contains_key(&hot), "hot entry should have survived eviction");
        assert!(!shard.entries.contains_key(&cold), "cold entry should have been evicted instead");
    }

    #[test]
    fn negative_ttl_falls_back_without_soa() {
        assert_eq!(negative_ttl(None), DEFAULT_NEGATIVE_TTL);
        assert_eq!(negative_ttl(Some(30)), 30);
        assert_eq!(negative_ttl(Some(10_000)), DEFAULT_NEGATIVE_TTL);
    }
}
