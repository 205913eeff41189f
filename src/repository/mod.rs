// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// https://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// https://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Persistence abstraction: everything the pipeline and management
//! facade need from durable storage, exposed as a trait so the core
//! never depends on a concrete database.

pub mod sqlite;

use std::net::IpAddr;

use async_trait::async_trait;

use crate::error::StorageError;

#[derive(Clone, Debug)]
pub struct ZoneRow {
    pub id: i64,
    pub origin: String,
    pub enabled: bool,
}

#[derive(Clone, Debug)]
pub struct ZoneRecordRow {
    pub id: i64,
    pub zone_id: i64,
    pub name: String,
    pub rtype: u16,
    pub ttl: u32,
    pub rdata: Vec<u8>,
}

#[derive(Clone, Debug)]
pub struct TsigKeyRow {
    pub name: String,
    pub algorithm: String,
    pub secret_base64: String,
    pub enabled: bool,
}

#[derive(Clone, Debug)]
pub struct BlocklistSourceRow {
    pub id: i64,
    pub url: String,
    pub enabled: bool,
}

#[derive(Clone, Debug)]
pub struct BlocklistEntryRow {
    pub source_id: Option<i64>,
    pub pattern: String,
    pub is_regex: bool,
}

/// A general-purpose regex allow/block filter; `kind` is `"allow"` or
/// `"block"`, matching [`crate::blocklist::RegexKind`].
#[derive(Clone, Debug)]
pub struct RegexFilterRow {
    pub pattern: String,
    pub kind: String,
}

#[derive(Clone, Debug)]
pub struct ClientPolicyRow {
    pub client: IpAddr,
    pub blocking_enabled: bool,
}

#[derive(Clone, Debug)]
pub struct ConditionalForwardingRow {
    pub domain: String,
    pub upstream: String,
}

#[derive(Clone, Debug)]
pub struct LocalDnsRow {
    pub name: String,
    pub rtype: u16,
    pub rdata: Vec<u8>,
}

#[derive(Clone, Debug)]
pub struct QueryLogRow {
    pub timestamp_unix: i64,
    pub client: String,
    pub qname: String,
    pub qtype: u16,
    pub rcode: u8,
    pub blocked: bool,
    pub block_reason: Option<String>,
    pub cached: bool,
    pub response_time_ms: u32,
    pub upstream_used: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct QueryLogFilter {
    pub client: Option<IpAddr>,
    pub qname_contains: Option<String>,
    pub blocked_only: bool,
    pub limit: usize,
}

/// Abstract persistence surface over the tables listed in the external
/// interfaces: settings, query log, zones/records, blocklist sources and
/// entries, allowlist, regex filters, client policy, TSIG keys,
/// conditional forwarding, and local DNS overrides.
#[async_trait]
pub trait Repository: Send + Sync {
    async fn list_zones(&self) -> Result<Vec<ZoneRow>, StorageError>;
    async fn list_zone_records(&self, zone_id: i64) -> Result<Vec<ZoneRecordRow>, StorageError>;
    async fn upsert_zone(&self, origin: &str, enabled: bool) -> Result<i64, StorageError>;
    async fn delete_zone(&self, zone_id: i64) -> Result<(), StorageError>;
    async fn add_zone_record(&self, record: &ZoneRecordRow) -> Result<i64, StorageError>;
    async fn delete_zone_record(&self, record_id: i64) -> Result<(), StorageError>;

    async fn list_tsig_keys(&self) -> Result<Vec<TsigKeyRow>, StorageError>;
    async fn upsert_tsig_key(&self, key: &TsigKeyRow) -> Result<(), StorageError>;
    async fn delete_tsig_key(&self, name: &str) -> Result<(), StorageError>;

    async fn list_blocklist_sources(&self) -> Result<Vec<BlocklistSourceRow>, StorageError>;
    async fn list_blocklist_entries(&self) -> Result<Vec<BlocklistEntryRow>, StorageError>;
    async fn add_blocklist_entry(&self, entry: &BlocklistEntryRow) -> Result<(), StorageError>;
    async fn delete_blocklist_entry(&self, pattern: &str) -> Result<(), StorageError>;
    async fn list_allowlist(&self) -> Result<Vec<String>, StorageError>;
    async fn add_allowlist_entry(&self, pattern: &str) -> Result<(), StorageError>;
    async fn delete_allowlist_entry(&self, pattern: &str) -> Result<(), StorageError>;
    async fn list_regex_filters(&self) -> Result<Vec<RegexFilterRow>, StorageError>;

    async fn list_client_policies(&self) -> Result<Vec<ClientPolicyRow>, StorageError>;
    async fn set_client_policy(&self, row: &ClientPolicyRow) -> Result<(), StorageError>;
    async fn delete_client_policy(&self, client: IpAddr) -> Result<(), StorageError>;

    async fn list_conditional_forwarding(&self) -> Result<Vec<ConditionalForwardingRow>, StorageError>;
    async fn upsert_conditional_forwarding(&self, row: &ConditionalForwardingRow) -> Result<(), StorageError>;
    async fn delete_conditional_forwarding(&self, domain: &str) -> Result<(), StorageError>;
    async fn list_local_dns(&self) -> Result<Vec<LocalDnsRow>, StorageError>;

    async fn append_query_log(&self, row: &QueryLogRow) -> Result<(), StorageError>;
    async fn list_queries(&self, filter: &QueryLogFilter) -> Result<Vec<QueryLogRow>, StorageError>;

    async fn get_setting(&self, key: &str) -> Result<Option<String>, StorageError>;
    async fn set_setting(&self, key: &str, value: &str) -> Result<(), StorageError>;
}
