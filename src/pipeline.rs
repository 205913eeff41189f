// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// https://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// https://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! The resolution pipeline: every listener surface funnels its decoded
//! requests through [`Pipeline::resolve`], which owns the full ordering
//! contract from rate limiting through logging.

use std::net::IpAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::FutureExt;
use ring::digest;
use tracing::{error, info_span, warn, Instrument};

use crate::blocklist::{BlocklistEngine, MatchVerdict};
use crate::cache::{CacheKey, LookupOutcome, ResponseCache};
use crate::config::ServerConfig;
use crate::disable_timer::DisableTimer;
use crate::dnssec::{validate_response, ValidationState};
use crate::metrics::Metrics;
use crate::ratelimit::RateLimiter;
use crate::repository::{QueryLogRow, Repository};
use crate::upstream::UpstreamPool;
use crate::wire::record_type::RecordType;
use crate::wire::{Header, Message, MessageType, OpCode, RData, ResponseCode};
use crate::zone::{AuthLookup, ReplayGuard, TsigKeyRing, ZoneStore};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Transport {
    Udp,
    Tcp,
    Dot,
    Doq,
    DohBinary,
    DohJson,
}

pub struct Request {
    pub raw_message: Vec<u8>,
    pub client_addr: IpAddr,
    pub transport: Transport,
    pub received_at: Instant,
}

pub struct Response {
    pub bytes: Vec<u8>,
    pub rcode: ResponseCode,
    pub blocked: bool,
    pub cached: bool,
    pub from_authoritative: bool,
    pub response_time: Duration,
}

pub struct LogEntry {
    pub client_display: String,
    pub qname: String,
    pub qtype: u16,
    pub rcode: u8,
    pub blocked: bool,
    pub block_reason: Option<&'static str>,
    pub cached: bool,
    pub response_time: Duration,
    pub upstream_used: Option<String>,
}

/// Per-client policy consulted ahead of the global blocklist, per §4.2
/// step 6. A full implementation reads this from the repository/admin
/// layer; the pipeline only needs the resolved verdict.
#[derive(Clone, Debug, Default)]
pub struct ClientPolicy {
    pub blocking_disabled: bool,
    pub allow_patterns: Vec<String>,
    pub block_patterns: Vec<String>,
    pub upstream: Option<Vec<String>>,
}

/// A local override answered directly without consulting upstream (§4.2
/// step 4).
#[derive(Clone, Debug)]
pub struct LocalOverride {
    pub qtype: RecordType,
    pub rdata: RData,
    pub ttl: u32,
}

#[async_trait::async_trait]
pub trait ClientPolicyLookup: Send + Sync {
    async fn policy_for(&self, client: IpAddr) -> ClientPolicy;
}

#[async_trait::async_trait]
pub trait LocalOverrideLookup: Send + Sync {
    async fn override_for(&self, qname: &str, qtype: RecordType) -> Option<LocalOverride>;
}

#[async_trait::async_trait]
pub trait ConditionalForwarding: Send + Sync {
    async fn upstreams_for(&self, qname: &str) -> Option<Vec<String>>;
}

pub struct Pipeline {
    pub config: ServerConfig,
    pub metrics: Arc<dyn Metrics>,
    pub cache: Arc<ResponseCache>,
    pub blocklist: Arc<BlocklistEngine>,
    pub rate_limiter: Arc<RateLimiter>,
    pub disable_timer: Arc<DisableTimer>,
    pub upstream_pool: Arc<UpstreamPool>,
    pub zone_store: Arc<ZoneStore>,
    /// Keys accepted on AXFR/IXFR/DDNS requests at the zone-transfer
    /// listener; empty until the management facade loads them.
    pub tsig_keys: Arc<TsigKeyRing>,
    pub transfer_replay_guard: Arc<ReplayGuard>,
    pub repository: Option<Arc<dyn Repository>>,
    pub client_policies: Option<Arc<dyn ClientPolicyLookup>>,
    pub local_overrides: Option<Arc<dyn LocalOverrideLookup>>,
    pub conditional_forwarding: Option<Arc<dyn ConditionalForwarding>>,
}

impl Pipeline {
    /// Resolves one request end to end, implementing the thirteen-step
    /// ordering contract of §4.2. A panic anywhere in that path is caught
    /// and isolated to this one request rather than taking down the
    /// listener task it's running on.
    pub async fn resolve(&self, request: Request) -> (Response, LogEntry) {
        let deadline = self.config.request_deadline();
        match tokio::time::timeout(deadline, std::panic::AssertUnwindSafe(self.resolve_inner(request)).catch_unwind()).await {
            Ok(Ok(result)) => result,
            Ok(Err(_panic)) => {
                error!("request handling panicked, isolating to this request and returning SERVFAIL");
                self.metrics.record_internal_error();
                self.deadline_servfail(deadline)
            }
            Err(_timeout) => {
                warn!("request exceeded deadline, returning SERVFAIL");
                self.deadline_servfail(deadline)
            }
        }
    }

    fn deadline_servfail(&self, response_time: Duration) -> (Response, LogEntry) {
        self.metrics.record_servfail();
        let entry = LogEntry {
            client_display: "0.0.0.0".to_string(),
            qname: String::new(),
            qtype: 0,
            rcode: ResponseCode::ServFail.to_u8(),
            blocked: false,
            block_reason: None,
            cached: false,
            response_time,
            upstream_used: None,
        };
        let bytes = error_message(0, ResponseCode::ServFail).encode(None).unwrap_or_default();
        (
            Response { bytes, rcode: ResponseCode::ServFail, blocked: false, cached: false, from_authoritative: false, response_time },
            entry,
        )
    }

    async fn resolve_inner(&self, request: Request) -> (Response, LogEntry) {
        self.metrics.record_query();
        let span = info_span!("resolve", client = %request.client_addr, transport = ?request.transport);
        self.resolve_traced(request).instrument(span).await
    }

    async fn resolve_traced(&self, request: Request) -> (Response, LogEntry) {
        let started = request.received_at;

        // Step 1: parse & validate.
        let message = match Message::decode(&request.raw_message) {
            Ok(m) => m,
            Err(_) => {
                return self.finish(request.client_addr, request.transport, started, error_message(0, ResponseCode::FormErr), false, false, false, None, None);
            }
        };
        let Some(question) = message.question().cloned() else {
            return self.finish(request.client_addr, request.transport, started, error_message(message.header.id, ResponseCode::FormErr), false, false, false, None, None);
        };
        let qname = question.qname.to_string();

        if self.zone_store.find_for_name(&question.qname).is_none() && self.config.upstream_dns.is_empty() {
            return self.finish(request.client_addr, request.transport, started, error_message(message.header.id, ResponseCode::Refused), false, false, false, None, None);
        }

        // Step 2: rate limit.
        if !self.rate_limiter.allow(request.client_addr) {
            return self.finish(
                request.client_addr,
                request.transport,
                started,
                error_message(message.header.id, ResponseCode::Refused),
                false,
                false,
                false,
                Some("ratelimit"),
                None,
            );
        }

        // Step 3: authoritative match.
        if let Some(zone) = self.zone_store.find_for_name(&question.qname) {
            let mut response = Message::response(message.header.id, OpCode::Query);
            response.header.authoritative = true;
            response.add_question(question.clone());
            match zone.lookup(&question.qname, question.qtype) {
                AuthLookup::Answer { chain, records } => {
                    response.answers.extend(chain);
                    response.answers.extend(records);
                }
                AuthLookup::NoData { soa } => {
                    response.authorities.push(soa);
                }
                AuthLookup::NxDomain { soa } => {
                    response.header.response_code = ResponseCode::NxDomain;
                    response.authorities.push(soa);
                }
            }
            return self.finish(request.client_addr, request.transport, started, response, false, true, false, None, None);
        }

        // Step 4: local DNS overrides.
        if let Some(lookup) = &self.local_overrides {
            if let Some(over) = lookup.override_for(&qname, question.qtype).await {
                let mut response = Message::response(message.header.id, OpCode::Query);
                response.header.authoritative = true;
                response.add_question(question.clone());
                response.answers.push(crate::wire::ResourceRecord::new(question.qname.clone(), over.ttl, over.rdata));
                return self.finish(request.client_addr, request.transport, started, response, false, false, false, None, None);
            }
        }

        // Step 6: per-client policy.
        let client_policy = match &self.client_policies {
            Some(lookup) => lookup.policy_for(request.client_addr).await,
            None => ClientPolicy::default(),
        };

        let mut blocked = false;
        let mut block_reason = None;

        // Step 5: disable switch overrides steps 6/7 entirely.
        if self.disable_timer.is_blocking_enabled() && !client_policy.blocking_disabled {
            if client_policy.allow_patterns.iter().any(|p| matches_pattern(p, &qname)) {
                // Explicit client allow: skip global checks entirely.
            } else if client_policy.block_patterns.iter().any(|p| matches_pattern(p, &qname)) {
                blocked = true;
                block_reason = Some("client-blocklist");
            } else {
                match self.blocklist.lookup(&qname) {
                    MatchVerdict::Allowed => {}
                    MatchVerdict::Blocked(reason) => {
                        blocked = true;
                        block_reason = Some(reason);
                    }
                    MatchVerdict::Miss => {}
                }
            }
        }

        if blocked {
            let mut response = Message::response(message.header.id, OpCode::Query);
            response.add_question(question.clone());
            if self.config.block_page_enabled && matches!(question.qtype, RecordType::A | RecordType::AAAA) {
                let rdata = match question.qtype {
                    RecordType::A => RData::A(self.config.sinkhole_v4),
                    _ => RData::Aaaa(self.config.sinkhole_v6),
                };
                response.answers.push(crate::wire::ResourceRecord::new(question.qname.clone(), self.config.sinkhole_ttl, rdata));
            } else {
                response.header.response_code = ResponseCode::NxDomain;
            }
            self.metrics.record_blocked();
            return self.finish(request.client_addr, request.transport, started, response, true, false, false, block_reason, None);
        }

        // Step 8: cache lookup.
        let cache_key = CacheKey::new(&qname, question.qtype);
        if self.config.cache_enabled {
            match self.cache.begin_lookup(&cache_key) {
                LookupOutcome::Hit(mut cached) => {
                    self.metrics.record_cache_hit();
                    cached.header.id = message.header.id;
                    return self.finish(request.client_addr, request.transport, started, cached, false, false, true, None, None);
                }
                LookupOutcome::Coalesced(mut receiver) => {
                    self.metrics.record_cache_hit();
                    if let Ok(shared) = receiver.recv().await {
                        let mut cached = (*shared).clone();
                        cached.header.id = message.header.id;
                        return self.finish(request.client_addr, request.transport, started, cached, false, false, true, None, None);
                    }
                }
                LookupOutcome::Miss(guard) => {
                    self.metrics.record_cache_miss();
                    return self.forward_and_cache(request, message, question, qname, started, cache_key, Some(guard), &client_policy).await;
                }
            }
        }

        self.forward_and_cache(request, message, question, qname, started, cache_key, None, &client_policy).await
    }

    #[allow(clippy::too_many_arguments)]
    async fn forward_and_cache(
        &self,
        request: Request,
        message: Message,
        question: crate::wire::Question,
        qname: String,
        started: Instant,
        cache_key: CacheKey,
        guard: Option<crate::cache::InFlightGuard>,
        client_policy: &ClientPolicy,
    ) -> (Response, LogEntry) {
        // Step 10: upstream forward.
        let candidates = if let Some(upstreams) = &client_policy.upstream {
            upstreams.clone()
        } else if let Some(forwarding) = &self.conditional_forwarding {
            match forwarding.upstreams_for(&qname).await {
                Some(upstreams) => upstreams,
                None => self.config.upstream_dns.clone(),
            }
        } else {
            self.config.upstream_dns.clone()
        };

        let mut upstream_query = Message::query(message.header.id);
        upstream_query.add_question(question.clone());
        if self.config.dnssec_validation {
            upstream_query.edns = Some(crate::wire::Edns { dnssec_ok: true, ..Default::default() });
        }

        let (mut response, upstream_used) = match self.upstream_pool.forward(&candidates, &upstream_query).await {
            Ok((resp, used)) => (resp, Some(used)),
            Err(e) => {
                warn!(error = %e, "all upstreams failed");
                self.metrics.record_upstream_failure();
                self.metrics.record_servfail();
                if let Some(guard) = guard {
                    guard.resolve(error_message(message.header.id, ResponseCode::ServFail), 0);
                }
                return self.finish(request.client_addr, request.transport, started, error_message(message.header.id, ResponseCode::ServFail), false, false, false, None, None);
            }
        };
        response.header.id = message.header.id;

        // Step 11: DNSSEC validation.
        let client_wants_dnssec = message.edns.map(|e| !e.dnssec_ok || true).unwrap_or(true);
        let checking_disabled = message.header.checking_disabled;
        if self.config.dnssec_validation && !checking_disabled && client_wants_dnssec && !response.answers.is_empty() {
            let rrsigs: Vec<_> = response.answers.iter().filter(|r| r.record_type() == RecordType::RRSIG).cloned().collect();
            let dnskeys: Vec<_> = response.answers.iter().filter(|r| r.record_type() == RecordType::DNSKEY).cloned().collect();
            let covered: Vec<_> = response.answers.iter().filter(|r| r.record_type() == question.qtype).cloned().collect();

            if !covered.is_empty() {
                match validate_response(&covered, &rrsigs, &dnskeys) {
                    ValidationState::Secure => response.header.authentic_data = true,
                    ValidationState::Bogus => {
                        response.header.response_code = ResponseCode::ServFail;
                        response.header.authentic_data = false;
                    }
                    ValidationState::Insecure | ValidationState::Indeterminate => {
                        response.header.authentic_data = false;
                    }
                }
            }
        }

        // Step 12: cache write.
        if self.config.cache_enabled && response.header.response_code != ResponseCode::ServFail {
            let base_ttl = compute_base_ttl(&response);
            if let Some(guard) = guard {
                guard.resolve(response.clone(), base_ttl);
            } else {
                self.cache.insert(cache_key, response.clone(), base_ttl);
            }
        } else if let Some(guard) = guard {
            guard.resolve(response.clone(), 0);
        }

        self.finish(request.client_addr, request.transport, started, response, false, false, false, None, upstream_used)
    }

    #[allow(clippy::too_many_arguments)]
    fn finish(
        &self,
        client_ip: IpAddr,
        transport: Transport,
        started: Instant,
        message: Message,
        blocked: bool,
        from_authoritative: bool,
        cached: bool,
        block_reason: Option<&'static str>,
        upstream_used: Option<String>,
    ) -> (Response, LogEntry) {
        // Only plain UDP needs the 512/EDNS size cap and TC bit; every
        // other transport carries the full message inside its own framing.
        let max_size = match transport {
            Transport::Udp => Some(message.edns.map(|e| e.max_payload_size).unwrap_or(crate::wire::message::DEFAULT_UDP_SIZE)),
            _ => None,
        };
        let bytes = message
            .encode(max_size)
            .unwrap_or_else(|_| error_message(message.header.id, ResponseCode::ServFail).encode(None).unwrap_or_default());
        let response_time = started.elapsed();
        let rcode = message.response_code();
        if rcode == ResponseCode::ServFail {
            self.metrics.record_servfail();
        }

        let qname = message.question().map(|q| q.qname.to_string()).unwrap_or_default();
        let qtype = message.question().map(|q| q.qtype.to_u16()).unwrap_or(0);
        let logged_client = if self.config.privacy_mode { hashed_client(client_ip) } else { client_ip.to_string() };

        let log_entry = LogEntry {
            client_display: logged_client,
            qname,
            qtype,
            rcode: rcode.to_u8(),
            blocked,
            block_reason,
            cached,
            response_time,
            upstream_used,
        };

        (Response { bytes, rcode, blocked, cached, from_authoritative, response_time }, log_entry)
    }

    /// Persists a log entry if a repository is configured; fire-and-forget
    /// from the caller's perspective but awaited here so callers decide
    /// whether to spawn it off the hot path.
    pub async fn persist_log(&self, entry: &LogEntry) {
        let Some(repo) = &self.repository else { return };
        let row = QueryLogRow {
            timestamp_unix: unix_now(),
            client: entry.client_display.clone(),
            qname: entry.qname.clone(),
            qtype: entry.qtype,
            rcode: entry.rcode,
            blocked: entry.blocked,
            block_reason: entry.block_reason.map(|s| s.to_string()),
            cached: entry.cached,
            response_time_ms: entry.response_time.as_millis() as u32,
            upstream_used: entry.upstream_used.clone(),
        };
        if let Err(e) = repo.append_query_log(&row).await {
            warn!(error = %e, "failed to persist query log row");
        }
    }
}

fn matches_pattern(pattern: &str, qname: &str) -> bool {
    let pattern = pattern.trim_start_matches("*.").trim_end_matches('.').to_ascii_lowercase();
    let qname = qname.trim_end_matches('.').to_ascii_lowercase();
    qname == pattern || qname.ends_with(&format!(".{pattern}"))
}

fn error_message(id: u16, rcode: ResponseCode) -> Message {
    Message::error(id, OpCode::Query, rcode)
}

fn compute_base_ttl(message: &Message) -> u32 {
    if message.header.response_code == ResponseCode::NxDomain || message.answers.is_empty() {
        let soa_minimum = message.authorities.iter().find_map(|r| match &r.rdata {
            RData::Soa(soa) => Some(soa.minimum),
            _ => None,
        });
        crate::cache::negative_ttl(soa_minimum)
    } else {
        let min_ttl = message.answers.iter().map(|r| r.ttl).min().unwrap_or(crate::cache::DEFAULT_NEGATIVE_TTL);
        crate::cache::clamp_positive_ttl(min_ttl)
    }
}

/// Hex-encoded SHA-256 of `(clientIp, daily salt)`, where the salt is the
/// Unix day number, so the same client hashes identically within a day
/// and differently once the day rolls over.
fn hashed_client(client: IpAddr) -> String {
    let day = unix_now() / 86_400;
    let mut input = client.to_string().into_bytes();
    input.extend_from_slice(&day.to_be_bytes());
    let digest = digest::digest(&digest::SHA256, &input);
    data_encoding::HEXLOWER.encode(digest.as_ref())
}

fn unix_now() -> i64 {
    std::time::SystemTime::now().duration_since(std::time::UNIX_EPOCH).unwrap_or_default().as_secs() as i64
}
