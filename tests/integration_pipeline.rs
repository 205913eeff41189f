// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// https://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// https://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! End-to-end scenarios exercising the full pipeline: forwarding through
//! a mock upstream, blocklist precedence, zone transfers authenticated
//! with TSIG, and DNSSEC validation.

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use tokio::net::UdpSocket;

use dnsguard::blocklist::BlocklistEngine;
use dnsguard::cache::ResponseCache;
use dnsguard::config::ServerConfig;
use dnsguard::disable_timer::DisableTimer;
use dnsguard::dnssec::{validate_response, ValidationState};
use dnsguard::metrics::InMemoryMetrics;
use dnsguard::pipeline::{Pipeline, Request, Transport};
use dnsguard::ratelimit::RateLimiter;
use dnsguard::server;
use dnsguard::upstream::UpstreamPool;
use dnsguard::wire::codec::BinEncoder;
use dnsguard::wire::rdata::Soa;
use dnsguard::wire::record::{DnsClass, Question, ResourceRecord};
use dnsguard::wire::record_type::RecordType;
use dnsguard::wire::{Message, Name, OpCode, RData};
use dnsguard::zone::store::{ChangeType, Zone};
use dnsguard::zone::tsig::{sign, TsigAlgorithm, TsigKey, TsigKeyRing};
use dnsguard::zone::{ReplayGuard, ZoneStore};

/// Spawns a loopback UDP server that answers every A query for `qname`
/// with `addr` at `ttl`, mimicking a recursive upstream.
async fn spawn_mock_upstream(qname: &'static str, addr: std::net::Ipv4Addr, ttl: u32) -> SocketAddr {
    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let local_addr = socket.local_addr().unwrap();

    tokio::spawn(async move {
        let mut buf = vec![0u8; 4096];
        loop {
            let Ok((n, peer)) = socket.recv_from(&mut buf).await else { break };
            let Ok(query) = Message::decode(&buf[..n]) else { continue };
            let Some(question) = query.question() else { continue };

            let mut response = Message::response(query.header.id, OpCode::Query);
            response.add_question(question.clone());
            if question.qname.to_string().trim_end_matches('.') == qname && question.qtype == RecordType::A {
                response.answers.push(ResourceRecord::new(question.qname.clone(), ttl, RData::A(addr)));
            }
            let bytes = response.encode(None).unwrap();
            let _ = socket.send_to(&bytes, peer).await;
        }
    });

    local_addr
}

fn test_pipeline(upstream: Option<SocketAddr>) -> Arc<Pipeline> {
    test_pipeline_with(upstream, Arc::new(ZoneStore::new()), Arc::new(TsigKeyRing::new()))
}

fn test_pipeline_with(upstream: Option<SocketAddr>, zone_store: Arc<ZoneStore>, tsig_keys: Arc<TsigKeyRing>) -> Arc<Pipeline> {
    let mut config = ServerConfig::default();
    config.upstream_dns = upstream.into_iter().map(|a| a.to_string()).collect();
    config.request_deadline_ms = 2_000;

    Arc::new(Pipeline {
        config: config.clone(),
        metrics: Arc::new(InMemoryMetrics::default()),
        cache: Arc::new(ResponseCache::new(config.cache_max_entries)),
        blocklist: Arc::new(BlocklistEngine::new()),
        rate_limiter: Arc::new(RateLimiter::new(config.rate_limit_max, config.rate_limit_window())),
        disable_timer: Arc::new(DisableTimer::new()),
        upstream_pool: Arc::new(UpstreamPool::new(&config.upstream_dns, Duration::from_millis(config.request_deadline_ms)).unwrap()),
        zone_store,
        tsig_keys,
        transfer_replay_guard: Arc::new(ReplayGuard::new()),
        repository: None,
        client_policies: None,
        local_overrides: None,
        conditional_forwarding: None,
    })
}

fn a_query(id: u16, qname: &str) -> Vec<u8> {
    let mut msg = Message::query(id);
    msg.add_question(Question::new(Name::parse(qname).unwrap(), RecordType::A));
    msg.encode(None).unwrap()
}

#[tokio::test]
async fn forwarded_a_record_is_cached_on_second_lookup() {
    let upstream_addr = spawn_mock_upstream("example.com", "93.184.216.34".parse().unwrap(), 300).await;
    let pipeline = test_pipeline(Some(upstream_addr));

    let raw = a_query(0x1234, "example.com");
    let request = Request { raw_message: raw.clone(), client_addr: "127.0.0.1".parse().unwrap(), transport: Transport::Udp, received_at: Instant::now() };
    let (response, log_entry) = pipeline.resolve(request).await;
    assert!(!log_entry.cached);
    let decoded = Message::decode(&response.bytes).unwrap();
    assert_eq!(decoded.header.id, 0x1234);
    assert_eq!(decoded.header.response_code.to_u8(), 0);
    assert!(!decoded.header.authoritative);
    assert_eq!(decoded.answers.len(), 1);
    match &decoded.answers[0].rdata {
        RData::A(ip) => assert_eq!(ip.to_string(), "93.184.216.34"),
        other => panic!("expected A record, got {other:?}"),
    }

    let request = Request { raw_message: raw, client_addr: "127.0.0.1".parse().unwrap(), transport: Transport::Udp, received_at: Instant::now() };
    let (_, log_entry) = pipeline.resolve(request).await;
    assert!(log_entry.cached);
}

#[tokio::test]
async fn blocked_domain_returns_nxdomain() {
    // An upstream must be configured for the pipeline's reachability gate
    // to let the request past step 1; the block fires before step 8 ever
    // dials it, so the address need not be live.
    let pipeline = test_pipeline(Some("127.0.0.1:1".parse().unwrap()));
    pipeline.blocklist.reload(Vec::<String>::new(), vec!["ads.example.com".to_string()], Vec::new());

    let raw = a_query(1, "ads.example.com");
    let request = Request { raw_message: raw, client_addr: "127.0.0.1".parse().unwrap(), transport: Transport::Udp, received_at: Instant::now() };
    let (response, log_entry) = pipeline.resolve(request).await;

    assert!(log_entry.blocked);
    assert_eq!(log_entry.block_reason, Some("blocklist"));
    let decoded = Message::decode(&response.bytes).unwrap();
    assert_eq!(decoded.header.response_code.to_u8(), 3); // NXDOMAIN
    assert!(decoded.answers.is_empty());
}

#[tokio::test]
async fn allowlist_entry_overrides_blocklist() {
    let upstream_addr = spawn_mock_upstream("ads.example.com", "1.2.3.4".parse().unwrap(), 60).await;
    let pipeline = test_pipeline(Some(upstream_addr));
    pipeline.blocklist.reload(vec!["ads.example.com".to_string()], vec!["ads.example.com".to_string()], Vec::new());

    let raw = a_query(2, "ads.example.com");
    let request = Request { raw_message: raw, client_addr: "127.0.0.1".parse().unwrap(), transport: Transport::Udp, received_at: Instant::now() };
    let (response, log_entry) = pipeline.resolve(request).await;

    assert!(!log_entry.blocked);
    let decoded = Message::decode(&response.bytes).unwrap();
    assert_eq!(decoded.answers.len(), 1);
}

fn test_soa(serial: u32) -> Soa {
    Soa {
        mname: Name::parse("ns1.test-axfr.example.com").unwrap(),
        rname: Name::parse("hostmaster.test-axfr.example.com").unwrap(),
        serial,
        refresh: 3600,
        retry: 600,
        expire: 86400,
        minimum: 300,
    }
}

fn build_tsig_rr(key: &TsigKey, signed_message: &Message) -> ResourceRecord {
    let message_bytes = signed_message.encode(Some(u16::MAX)).unwrap();
    let mac = sign(&message_bytes, key).unwrap();
    let time_signed = SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_secs();

    let mut rdata = Vec::new();
    let mut encoder = BinEncoder::new(&mut rdata);
    Name::parse(key.algorithm.as_wire_name()).unwrap().emit(&mut encoder).unwrap();
    encoder.emit_u16((time_signed >> 32) as u16);
    encoder.emit_u32((time_signed & 0xFFFF_FFFF) as u32);
    encoder.emit_u16(300); // fudge
    encoder.emit_u16(mac.len() as u16);
    encoder.emit_bytes(&mac);

    ResourceRecord::new(Name::parse(&key.name).unwrap(), 0, RData::Unknown { rtype: 250, data: rdata })
}

fn tsig_keyring(key: &TsigKey) -> Arc<TsigKeyRing> {
    let ring = TsigKeyRing::new();
    ring.insert(key.clone());
    Arc::new(ring)
}

#[tokio::test]
async fn axfr_with_tsig_returns_soa_bounded_transfer() {
    let origin = Name::parse("test-axfr.example.com").unwrap();
    let zone = Zone::new(origin.clone(), test_soa(5));
    for i in 0..3 {
        let name = Name::parse(&format!("host{i}.test-axfr.example.com")).unwrap();
        zone.apply(ChangeType::Add, ResourceRecord::new(name, 300, RData::A(format!("10.0.0.{i}").parse().unwrap()))).unwrap();
    }
    let zone_store = Arc::new(ZoneStore::new());
    zone_store.insert(zone);

    let key = TsigKey { name: "transfer-key".to_string(), algorithm: TsigAlgorithm::HmacSha256, secret_base64: data_encoding::BASE64.encode(b"supersecretkeybytes1234"), enabled: true };
    let pipeline = test_pipeline_with(None, zone_store, tsig_keyring(&key));

    let mut query = Message::query(42);
    query.add_question(Question::new(origin, RecordType::AXFR));
    let tsig_rr = build_tsig_rr(&key, &query);
    query.additionals.push(tsig_rr);
    let raw = query.encode(Some(u16::MAX)).unwrap();

    let replies = server::xfr::maybe_handle(&pipeline, &raw, "127.0.0.1".parse::<IpAddr>().unwrap()).await.expect("AXFR intercepted");
    assert!(replies.len() >= 2);
    assert!(matches!(replies.first().unwrap().answers.first().unwrap().rdata, RData::Soa(_)));
    assert!(matches!(replies.last().unwrap().answers.last().unwrap().rdata, RData::Soa(_)));
    let total_non_soa: usize = replies.iter().flat_map(|m| &m.answers).filter(|r| !matches!(r.rdata, RData::Soa(_))).count();
    assert_eq!(total_non_soa, 3);
}

#[tokio::test]
async fn axfr_without_tsig_or_acl_is_refused() {
    let origin = Name::parse("test-axfr.example.com").unwrap();
    let zone = Zone::new(origin.clone(), test_soa(5));
    let zone_store = Arc::new(ZoneStore::new());
    zone_store.insert(zone);
    let pipeline = test_pipeline_with(None, zone_store, Arc::new(TsigKeyRing::new()));

    let mut query = Message::query(7);
    query.add_question(Question::new(origin, RecordType::AXFR));
    let raw = query.encode(Some(u16::MAX)).unwrap();

    let replies = server::xfr::maybe_handle(&pipeline, &raw, "203.0.113.9".parse::<IpAddr>().unwrap()).await.expect("AXFR intercepted");
    assert_eq!(replies.len(), 1);
    assert_eq!(replies[0].header.response_code.to_u8(), 5); // REFUSED
}

#[tokio::test]
async fn ixfr_at_current_serial_returns_two_matching_soa_messages() {
    let origin = Name::parse("test-ixfr.example.com").unwrap();
    let zone = Zone::new(origin.clone(), test_soa(10));
    let zone_store = Arc::new(ZoneStore::new());
    zone_store.insert(zone);

    let key = TsigKey { name: "transfer-key".to_string(), algorithm: TsigAlgorithm::HmacSha256, secret_base64: data_encoding::BASE64.encode(b"supersecretkeybytes1234"), enabled: true };
    let pipeline = test_pipeline_with(None, zone_store, tsig_keyring(&key));

    let mut query = Message::query(9);
    query.add_question(Question::new(origin, RecordType::IXFR));
    query.authorities.push(ResourceRecord { name: Name::parse("test-ixfr.example.com").unwrap(), dns_class: DnsClass::In, ttl: 300, rdata: RData::Soa(test_soa(10)) });
    let tsig_rr = build_tsig_rr(&key, &query);
    query.additionals.push(tsig_rr);
    let raw = query.encode(Some(u16::MAX)).unwrap();

    let replies = server::xfr::maybe_handle(&pipeline, &raw, "127.0.0.1".parse::<IpAddr>().unwrap()).await.expect("IXFR intercepted");
    assert_eq!(replies.len(), 2);
    for reply in &replies {
        match &reply.answers[0].rdata {
            RData::Soa(soa) => assert_eq!(soa.serial, 10),
            other => panic!("expected SOA, got {other:?}"),
        }
    }
}

#[test]
fn dnssec_bogus_on_future_inception() {
    let owner = Name::parse("example.com").unwrap();
    let a_record = ResourceRecord::new(owner.clone(), 300, RData::A("93.184.216.34".parse().unwrap()));
    let dnskey = ResourceRecord::new(
        owner.clone(),
        300,
        RData::Dnskey { flags: 257, protocol: 3, algorithm: 8, public_key: vec![1, 2, 3, 4] },
    );
    let key_tag = dnsguard::dnssec::canonical::key_tag(&dnskey.rdata);

    let far_future = u32::MAX - 10;
    let rrsig = ResourceRecord::new(
        owner.clone(),
        300,
        RData::Rrsig {
            type_covered: RecordType::A,
            algorithm: 8,
            labels: 2,
            original_ttl: 300,
            expiration: u32::MAX,
            inception: far_future,
            key_tag,
            signer_name: owner,
            signature: vec![0u8; 32],
        },
    );

    let state = validate_response(&[a_record], &[rrsig], &[dnskey]);
    assert_eq!(state, ValidationState::Bogus);
}
