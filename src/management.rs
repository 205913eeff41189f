// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// https://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// https://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Facade over the live pipeline and its repository, implementing the
//! admin operations consumed by an externally owned HTTP layer: reload,
//! cache control, the disable switch, query log search, CRUD over zones
//! and their supporting tables, and a synchronous test query.

use std::net::IpAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use thiserror::Error;

use crate::blocklist::{RegexFilter, RegexKind};
use crate::error::{CodecError, StorageError, ZoneError};
use crate::pipeline::{Pipeline, Request, Response, Transport};
use crate::repository::{BlocklistEntryRow, ConditionalForwardingRow, QueryLogFilter, QueryLogRow, TsigKeyRow, ZoneRecordRow, ZoneRow};
use crate::wire::codec::{BinDecoder, BinEncoder};
use crate::wire::rdata::Soa;
use crate::wire::record_type::RecordType;
use crate::wire::{Message, Name, RData, Question, ResourceRecord};
use crate::zone::tsig::TsigAlgorithm;
use crate::zone::{ChangeType, Zone};

#[derive(Debug, Error)]
pub enum ManagementError {
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Zone(#[from] ZoneError),
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error("no repository is configured for this server")]
    NoRepository,
    #[error("zone {0} not found")]
    ZoneNotFound(String),
    #[error("invalid domain name {0:?}")]
    InvalidName(String),
    #[error("unsupported TSIG algorithm {0:?}")]
    UnsupportedTsigAlgorithm(String),
}

/// The structured result of [`ManagementApi::test_query`]: the pipeline's
/// own wire-level answer, decoded back into record summaries so a caller
/// never has to parse DNS wire format itself.
pub struct TestQueryResult {
    pub rcode: u8,
    pub authentic_data: bool,
    pub blocked: bool,
    pub cached: bool,
    pub answers: Vec<(String, u32, RData)>,
    pub response_time: Duration,
}

pub struct ManagementApi {
    pipeline: Arc<Pipeline>,
}

impl ManagementApi {
    pub fn new(pipeline: Arc<Pipeline>) -> Self {
        Self { pipeline }
    }

    fn repo(&self) -> Result<&Arc<dyn crate::repository::Repository>, ManagementError> {
        self.pipeline.repository.as_ref().ok_or(ManagementError::NoRepository)
    }

    /// Rebuilds the global blocklist matcher from the repository and
    /// atomically swaps it in, per `reloadBlocklist()`.
    pub async fn reload_blocklist(&self) -> Result<(), ManagementError> {
        let repo = self.repo()?;
        let entries = repo.list_blocklist_entries().await?;
        let allow = repo.list_allowlist().await?;
        let regex_rows = repo.list_regex_filters().await?;

        let mut block_patterns = Vec::new();
        let mut regex_filters = Vec::new();
        for entry in entries {
            if entry.is_regex {
                if let Ok(pattern) = regex::Regex::new(&entry.pattern) {
                    regex_filters.push(RegexFilter { pattern, kind: RegexKind::Block });
                }
            } else {
                block_patterns.push(entry.pattern);
            }
        }
        for row in regex_rows {
            let kind = match row.kind.as_str() {
                "allow" => RegexKind::Allow,
                _ => RegexKind::Block,
            };
            if let Ok(pattern) = regex::Regex::new(&row.pattern) {
                regex_filters.push(RegexFilter { pattern, kind });
            }
        }

        self.pipeline.blocklist.reload(allow, block_patterns, regex_filters);
        self.pipeline.cache.clear();
        Ok(())
    }

    pub fn clear_cache(&self) {
        self.pipeline.cache.clear();
    }

    /// `setBlockingDisabled(seconds|null)`: `None` disables indefinitely,
    /// `Some(0)` re-enables immediately.
    pub fn set_blocking_disabled(&self, seconds: Option<u64>) {
        match seconds {
            Some(0) => self.pipeline.disable_timer.enable(),
            Some(secs) => self.pipeline.disable_timer.disable(Some(Duration::from_secs(secs))),
            None => self.pipeline.disable_timer.disable(None),
        }
    }

    pub async fn list_queries(&self, filter: QueryLogFilter) -> Result<Vec<QueryLogRow>, ManagementError> {
        Ok(self.repo()?.list_queries(&filter).await?)
    }

    // --- Zones -----------------------------------------------------------

    pub async fn create_zone(&self, origin: &str, soa: Soa) -> Result<(), ManagementError> {
        let name = parse_name(origin)?;
        let repo = self.repo()?;
        let zone_id = repo.upsert_zone(origin, true).await?;
        // The SOA is stored as an ordinary zone record (RecordType::SOA)
        // rather than a dedicated column, so a restart can rebuild the
        // zone from `list_zone_records` alone.
        repo.add_zone_record(&ZoneRecordRow {
            id: 0,
            zone_id,
            name: origin.to_string(),
            rtype: RecordType::SOA.to_u16(),
            ttl: soa.minimum,
            rdata: encode_rdata(&RData::Soa(soa.clone())),
        })
        .await?;
        self.pipeline.zone_store.insert(Zone::new(name, soa));
        Ok(())
    }

    /// Rebuilds every persisted zone and inserts it into the live zone
    /// store; called once at startup after the repository is opened.
    pub async fn load_zones_from_repository(&self) -> Result<(), ManagementError> {
        let repo = self.repo()?;
        for row in repo.list_zones().await? {
            if !row.enabled {
                continue;
            }
            let origin = parse_name(&row.origin)?;
            let records = repo.list_zone_records(row.id).await?;
            let Some(soa_row) = records.iter().find(|r| r.rtype == RecordType::SOA.to_u16()) else {
                continue;
            };
            let RData::Soa(soa) = decode_rdata(RecordType::SOA, &soa_row.rdata)? else {
                continue;
            };
            let zone = Zone::new(origin.clone(), soa);
            for record in records.iter().filter(|r| r.rtype != RecordType::SOA.to_u16()) {
                let name = parse_name(&record.name)?;
                let rtype = RecordType::from_u16(record.rtype);
                let rdata = decode_rdata(rtype, &record.rdata)?;
                zone.apply(ChangeType::Add, ResourceRecord::new(name, record.ttl, rdata))?;
            }
            self.pipeline.zone_store.insert(zone);
        }
        Ok(())
    }

    pub async fn delete_zone(&self, origin: &str) -> Result<(), ManagementError> {
        let name = parse_name(origin)?;
        let repo = self.repo()?;
        for row in repo.list_zones().await? {
            if row.origin == origin {
                repo.delete_zone(row.id).await?;
            }
        }
        self.pipeline.zone_store.remove(&name);
        Ok(())
    }

    pub async fn set_zone_enabled(&self, origin: &str, enabled: bool) -> Result<(), ManagementError> {
        let name = parse_name(origin)?;
        self.repo()?.upsert_zone(origin, enabled).await?;
        let zone = self.pipeline.zone_store.get(&name).ok_or_else(|| ManagementError::ZoneNotFound(origin.to_string()))?;
        zone.set_enabled(enabled);
        Ok(())
    }

    pub async fn list_zones(&self) -> Result<Vec<ZoneRow>, ManagementError> {
        Ok(self.repo()?.list_zones().await?)
    }

    pub async fn add_record(&self, origin: &str, name: &str, ttl: u32, rdata: RData) -> Result<(), ManagementError> {
        let zone_name = parse_name(origin)?;
        let record_name = parse_name(name)?;
        let zone = self.pipeline.zone_store.get(&zone_name).ok_or_else(|| ManagementError::ZoneNotFound(origin.to_string()))?;
        let record = ResourceRecord::new(record_name, ttl, rdata.clone());
        zone.apply(ChangeType::Add, record)?;

        if let Ok(repo) = self.repo() {
            let zone_id = repo.upsert_zone(origin, zone.enabled()).await?;
            repo.add_zone_record(&ZoneRecordRow {
                id: 0,
                zone_id,
                name: name.to_string(),
                rtype: rdata.record_type().to_u16(),
                ttl,
                rdata: encode_rdata(&rdata),
            })
            .await?;
        }
        Ok(())
    }

    pub async fn delete_record(&self, origin: &str, name: &str, rdata: RData) -> Result<(), ManagementError> {
        let zone_name = parse_name(origin)?;
        let record_name = parse_name(name)?;
        let zone = self.pipeline.zone_store.get(&zone_name).ok_or_else(|| ManagementError::ZoneNotFound(origin.to_string()))?;
        zone.apply(ChangeType::Delete, ResourceRecord::new(record_name, 0, rdata))?;
        Ok(())
    }

    // --- TSIG keys ---------------------------------------------------------

    pub async fn upsert_tsig_key(&self, name: &str, algorithm: TsigAlgorithm, secret_base64: &str, enabled: bool) -> Result<(), ManagementError> {
        self.repo()?
            .upsert_tsig_key(&TsigKeyRow {
                name: name.to_string(),
                algorithm: algorithm.as_wire_name().to_string(),
                secret_base64: secret_base64.to_string(),
                enabled,
            })
            .await?;
        self.pipeline.tsig_keys.insert(crate::zone::TsigKey {
            name: name.to_string(),
            algorithm,
            secret_base64: secret_base64.to_string(),
            enabled,
        });
        Ok(())
    }

    pub async fn delete_tsig_key(&self, name: &str) -> Result<(), ManagementError> {
        self.repo()?.delete_tsig_key(name).await?;
        self.pipeline.tsig_keys.remove(name);
        Ok(())
    }

    pub async fn list_tsig_keys(&self) -> Result<Vec<TsigKeyRow>, ManagementError> {
        Ok(self.repo()?.list_tsig_keys().await?)
    }

    // --- Client policy, conditional forwarding -----------------------------

    pub async fn set_client_blocking_enabled(&self, client: IpAddr, blocking_enabled: bool) -> Result<(), ManagementError> {
        self.repo()?
            .set_client_policy(&crate::repository::ClientPolicyRow { client, blocking_enabled })
            .await?;
        Ok(())
    }

    pub async fn delete_client_policy(&self, client: IpAddr) -> Result<(), ManagementError> {
        self.repo()?.delete_client_policy(client).await?;
        Ok(())
    }

    pub async fn set_conditional_forwarding(&self, domain: &str, upstream: &str) -> Result<(), ManagementError> {
        self.repo()?
            .upsert_conditional_forwarding(&ConditionalForwardingRow { domain: domain.to_string(), upstream: upstream.to_string() })
            .await?;
        Ok(())
    }

    pub async fn delete_conditional_forwarding(&self, domain: &str) -> Result<(), ManagementError> {
        self.repo()?.delete_conditional_forwarding(domain).await?;
        Ok(())
    }

    // --- Manual blocklist / allowlist entries -------------------------------

    pub async fn add_blocklist_entry(&self, pattern: &str, is_regex: bool) -> Result<(), ManagementError> {
        self.repo()?.add_blocklist_entry(&BlocklistEntryRow { source_id: None, pattern: pattern.to_string(), is_regex }).await?;
        Ok(())
    }

    pub async fn remove_blocklist_entry(&self, pattern: &str) -> Result<(), ManagementError> {
        self.repo()?.delete_blocklist_entry(pattern).await?;
        Ok(())
    }

    pub async fn add_allowlist_entry(&self, pattern: &str) -> Result<(), ManagementError> {
        self.repo()?.add_allowlist_entry(pattern).await?;
        Ok(())
    }

    pub async fn remove_allowlist_entry(&self, pattern: &str) -> Result<(), ManagementError> {
        self.repo()?.delete_allowlist_entry(pattern).await?;
        Ok(())
    }

    /// Runs a query through the live pipeline synchronously and returns a
    /// decoded summary, for `testQuery(domain, type, dnssec)`.
    pub async fn test_query(&self, domain: &str, qtype: RecordType, dnssec: bool) -> Result<TestQueryResult, ManagementError> {
        let qname = parse_name(domain)?;
        let mut message = Message::query(rand_id());
        message.add_question(Question::new(qname, qtype));
        if dnssec {
            message.edns = Some(crate::wire::Edns { dnssec_ok: true, ..Default::default() });
        }
        let raw_message = message.encode(None)?;

        let request = Request { raw_message, client_addr: "127.0.0.1".parse().unwrap(), transport: Transport::Tcp, received_at: Instant::now() };
        let (response, _log) = self.pipeline.resolve(request).await;
        decode_test_response(&response)
    }
}

fn decode_test_response(response: &Response) -> Result<TestQueryResult, ManagementError> {
    let decoded = Message::decode(&response.bytes)?;
    let answers = decoded.answers.iter().map(|r| (r.name.to_string(), r.ttl, r.rdata.clone())).collect();
    Ok(TestQueryResult {
        rcode: response.rcode.to_u8(),
        authentic_data: decoded.header.authentic_data,
        blocked: response.blocked,
        cached: response.cached,
        answers,
        response_time: response.response_time,
    })
}

fn parse_name(text: &str) -> Result<Name, ManagementError> {
    Name::parse(text).map_err(|_| ManagementError::InvalidName(text.to_string()))
}

fn encode_rdata(rdata: &RData) -> Vec<u8> {
    let mut buf = Vec::new();
    let mut encoder = BinEncoder::new(&mut buf);
    // In-memory buffers never exceed message size limits, so this cannot fail.
    rdata.emit_uncompressed(&mut encoder).expect("rdata encoding into an in-memory buffer cannot fail");
    buf
}

fn decode_rdata(rtype: RecordType, bytes: &[u8]) -> Result<RData, CodecError> {
    let mut decoder = BinDecoder::new(bytes);
    RData::read(&mut decoder, rtype, bytes.len())
}

fn rand_id() -> u16 {
    use std::time::{SystemTime, UNIX_EPOCH};
    (SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().subsec_nanos() & 0xffff) as u16
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blocklist::BlocklistEngine;
    use crate::cache::ResponseCache;
    use crate::config::ServerConfig;
    use crate::disable_timer::DisableTimer;
    use crate::metrics::InMemoryMetrics;
    use crate::ratelimit::RateLimiter;
    use crate::repository::sqlite::SqliteRepository;
    use crate::upstream::UpstreamPool;
    use crate::zone::ZoneStore;
    use std::time::Duration;

    fn test_pipeline(repository: Option<Arc<dyn crate::repository::Repository>>) -> Arc<Pipeline> {
        Arc::new(Pipeline {
            config: ServerConfig::default(),
            metrics: Arc::new(InMemoryMetrics::default()),
            cache: Arc::new(ResponseCache::new(100)),
            blocklist: Arc::new(BlocklistEngine::new()),
            rate_limiter: Arc::new(RateLimiter::new(1000, Duration::from_secs(60))),
            disable_timer: Arc::new(DisableTimer::new()),
            upstream_pool: Arc::new(UpstreamPool::new(&[], Duration::from_secs(2)).unwrap()),
            zone_store: Arc::new(ZoneStore::new()),
            tsig_keys: Arc::new(crate::zone::TsigKeyRing::new()),
            transfer_replay_guard: Arc::new(crate::zone::ReplayGuard::new()),
            repository,
            client_policies: None,
            local_overrides: None,
            conditional_forwarding: None,
        })
    }

    #[tokio::test]
    async fn reload_blocklist_requires_a_repository() {
        let api = ManagementApi::new(test_pipeline(None));
        assert!(matches!(api.reload_blocklist().await, Err(ManagementError::NoRepository)));
    }

    #[tokio::test]
    async fn create_and_query_a_zone_end_to_end() {
        let repo: Arc<dyn crate::repository::Repository> = Arc::new(SqliteRepository::open_in_memory().unwrap());
        let api = ManagementApi::new(test_pipeline(Some(repo)));

        let soa = Soa {
            mname: Name::parse("ns1.example.com").unwrap(),
            rname: Name::parse("hostmaster.example.com").unwrap(),
            serial: 1,
            refresh: 3600,
            retry: 600,
            expire: 86400,
            minimum: 300,
        };
        api.create_zone("example.com", soa).await.unwrap();
        api.add_record("example.com", "www.example.com", 300, RData::A("93.184.216.34".parse().unwrap())).await.unwrap();

        let result = api.test_query("www.example.com", RecordType::A, false).await.unwrap();
        assert_eq!(result.rcode, 0);
        assert_eq!(result.answers.len(), 1);
    }

    #[tokio::test]
    async fn set_blocking_disabled_with_zero_seconds_reenables() {
        let api = ManagementApi::new(test_pipeline(None));
        api.set_blocking_disabled(None);
        assert!(!api.pipeline.disable_timer.is_blocking_enabled());
        api.set_blocking_disabled(Some(0));
        assert!(api.pipeline.disable_timer.is_blocking_enabled());
    }
}
