// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// https://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// https://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! `rusqlite`-backed [`Repository`] implementation. `rusqlite::Connection`
//! is not `Sync`, so every call hands its closure to a blocking thread via
//! `spawn_blocking` rather than holding the connection across an await.

use std::net::IpAddr;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use rusqlite::{params, Connection};

use crate::error::StorageError;
use crate::repository::{
    BlocklistEntryRow, BlocklistSourceRow, ClientPolicyRow, ConditionalForwardingRow, LocalDnsRow, QueryLogFilter,
    QueryLogRow, RegexFilterRow, Repository, TsigKeyRow, ZoneRecordRow, ZoneRow,
};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS settings (key TEXT PRIMARY KEY, value TEXT NOT NULL);
CREATE TABLE IF NOT EXISTS zones (id INTEGER PRIMARY KEY, origin TEXT NOT NULL UNIQUE, enabled INTEGER NOT NULL DEFAULT 1);
CREATE TABLE IF NOT EXISTS zone_records (
    id INTEGER PRIMARY KEY, zone_id INTEGER NOT NULL REFERENCES zones(id),
    name TEXT NOT NULL, rtype INTEGER NOT NULL, ttl INTEGER NOT NULL, rdata BLOB NOT NULL
);
CREATE TABLE IF NOT EXISTS zone_changes (
    id INTEGER PRIMARY KEY, zone_id INTEGER NOT NULL REFERENCES zones(id),
    serial INTEGER NOT NULL, change_type TEXT NOT NULL, record_id INTEGER
);
CREATE TABLE IF NOT EXISTS tsig_keys (name TEXT PRIMARY KEY, algorithm TEXT NOT NULL, secret_base64 TEXT NOT NULL, enabled INTEGER NOT NULL DEFAULT 1);
CREATE TABLE IF NOT EXISTS blocklist_sources (id INTEGER PRIMARY KEY, url TEXT NOT NULL, enabled INTEGER NOT NULL DEFAULT 1);
CREATE TABLE IF NOT EXISTS blocklist_entries (source_id INTEGER, pattern TEXT NOT NULL, is_regex INTEGER NOT NULL DEFAULT 0);
CREATE TABLE IF NOT EXISTS allowlist (pattern TEXT PRIMARY KEY);
CREATE TABLE IF NOT EXISTS regex_filters (pattern TEXT NOT NULL, kind TEXT NOT NULL);
CREATE TABLE IF NOT EXISTS client_policies (client TEXT PRIMARY KEY, blocking_enabled INTEGER NOT NULL DEFAULT 1);
CREATE TABLE IF NOT EXISTS client_allow (client TEXT NOT NULL, pattern TEXT NOT NULL);
CREATE TABLE IF NOT EXISTS client_block (client TEXT NOT NULL, pattern TEXT NOT NULL);
CREATE TABLE IF NOT EXISTS client_upstream (client TEXT NOT NULL, upstream TEXT NOT NULL);
CREATE TABLE IF NOT EXISTS conditional_forwarding (domain TEXT NOT NULL, upstream TEXT NOT NULL);
CREATE TABLE IF NOT EXISTS local_dns (name TEXT NOT NULL, rtype INTEGER NOT NULL, rdata BLOB NOT NULL);
CREATE TABLE IF NOT EXISTS queries (
    id INTEGER PRIMARY KEY, timestamp_unix INTEGER NOT NULL, client TEXT NOT NULL, qname TEXT NOT NULL,
    qtype INTEGER NOT NULL, rcode INTEGER NOT NULL, blocked INTEGER NOT NULL, block_reason TEXT,
    cached INTEGER NOT NULL, response_time_ms INTEGER NOT NULL, upstream_used TEXT
);
"#;

pub struct SqliteRepository {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteRepository {
    pub fn open(path: &Path) -> Result<Self, StorageError> {
        let conn = Connection::open(path)?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn: Arc::new(Mutex::new(conn)) })
    }

    pub fn open_in_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn: Arc::new(Mutex::new(conn)) })
    }

    async fn blocking<F, T>(&self, f: F) -> Result<T, StorageError>
    where
        F: FnOnce(&Connection) -> Result<T, rusqlite::Error> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || f(&conn.lock()))
            .await
            .map_err(|e| StorageError::Unavailable(e.to_string()))?
            .map_err(StorageError::from)
    }
}

#[async_trait]
impl Repository for SqliteRepository {
    async fn list_zones(&self) -> Result<Vec<ZoneRow>, StorageError> {
        self.blocking(|conn| {
            let mut stmt = conn.prepare("SELECT id, origin, enabled FROM zones")?;
            let rows = stmt
                .query_map([], |r| Ok(ZoneRow { id: r.get(0)?, origin: r.get(1)?, enabled: r.get::<_, i64>(2)? != 0 }))?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await
    }

    async fn list_zone_records(&self, zone_id: i64) -> Result<Vec<ZoneRecordRow>, StorageError> {
        self.blocking(move |conn| {
            let mut stmt = conn.prepare("SELECT id, zone_id, name, rtype, ttl, rdata FROM zone_records WHERE zone_id = ?1")?;
            let rows = stmt
                .query_map(params![zone_id], |r| {
                    Ok(ZoneRecordRow {
                        id: r.get(0)?,
                        zone_id: r.get(1)?,
                        name: r.get(2)?,
                        rtype: r.get::<_, i64>(3)? as u16,
                        ttl: r.get::<_, i64>(4)? as u32,
                        rdata: r.get(5)?,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await
    }

    async fn upsert_zone(&self, origin: &str, enabled: bool) -> Result<i64, StorageError> {
        let origin = origin.to_string();
        self.blocking(move |conn| {
            conn.execute(
                "INSERT INTO zones (origin, enabled) VALUES (?1, ?2)
                 ON CONFLICT(origin) DO UPDATE SET enabled = excluded.enabled",
                params![origin, enabled as i64],
            )?;
            conn.query_row("SELECT id FROM zones WHERE origin = ?1", params![origin], |r| r.get(0))
        })
        .await
    }

    async fn delete_zone(&self, zone_id: i64) -> Result<(), StorageError> {
        self.blocking(move |conn| {
            conn.execute("DELETE FROM zone_records WHERE zone_id = ?1", params![zone_id])?;
            conn.execute("DELETE FROM zones WHERE id = ?1", params![zone_id])?;
            Ok(())
        })
        .await
    }

    async fn add_zone_record(&self, record: &ZoneRecordRow) -> Result<i64, StorageError> {
        let record = record.clone();
        self.blocking(move |conn| {
            conn.execute(
                "INSERT INTO zone_records (zone_id, name, rtype, ttl, rdata) VALUES (?1, ?2, ?3, ?4, ?5)",
                params![record.zone_id, record.name, record.rtype, record.ttl, record.rdata],
            )?;
            Ok(conn.last_insert_rowid())
        })
        .await
    }

    async fn delete_zone_record(&self, record_id: i64) -> Result<(), StorageError> {
        self.blocking(move |conn| {
            conn.execute("DELETE FROM zone_records WHERE id = ?1", params![record_id])?;
            Ok(())
        })
        .await
    }

    async fn list_tsig_keys(&self) -> Result<Vec<TsigKeyRow>, StorageError> {
        self.blocking(|conn| {
            let mut stmt = conn.prepare("SELECT name, algorithm, secret_base64, enabled FROM tsig_keys")?;
            let rows = stmt
                .query_map([], |r| {
                    Ok(TsigKeyRow { name: r.get(0)?, algorithm: r.get(1)?, secret_base64: r.get(2)?, enabled: r.get::<_, i64>(3)? != 0 })
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await
    }

    async fn upsert_tsig_key(&self, key: &TsigKeyRow) -> Result<(), StorageError> {
        let key = key.clone();
        self.blocking(move |conn| {
            conn.execute(
                "INSERT INTO tsig_keys (name, algorithm, secret_base64, enabled) VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(name) DO UPDATE SET algorithm = excluded.algorithm, secret_base64 = excluded.secret_base64, enabled = excluded.enabled",
                params![key.name, key.algorithm, key.secret_base64, key.enabled as i64],
            )?;
            Ok(())
        })
        .await
    }

    async fn delete_tsig_key(&self, name: &str) -> Result<(), StorageError> {
        let name = name.to_string();
        self.blocking(move |conn| {
            conn.execute("DELETE FROM tsig_keys WHERE name = ?1", params![name])?;
            Ok(())
        })
        .await
    }

    async fn list_blocklist_sources(&self) -> Result<Vec<BlocklistSourceRow>, StorageError> {
        self.blocking(|conn| {
            let mut stmt = conn.prepare("SELECT id, url, enabled FROM blocklist_sources")?;
            let rows = stmt
                .query_map([], |r| Ok(BlocklistSourceRow { id: r.get(0)?, url: r.get(1)?, enabled: r.get::<_, i64>(2)? != 0 }))?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await
    }

    async fn list_blocklist_entries(&self) -> Result<Vec<BlocklistEntryRow>, StorageError> {
        self.blocking(|conn| {
            let mut stmt = conn.prepare("SELECT source_id, pattern, is_regex FROM blocklist_entries")?;
            let rows = stmt
                .query_map([], |r| {
                    Ok(BlocklistEntryRow { source_id: r.get(0)?, pattern: r.get(1)?, is_regex: r.get::<_, i64>(2)? != 0 })
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await
    }

    async fn add_blocklist_entry(&self, entry: &BlocklistEntryRow) -> Result<(), StorageError> {
        let entry = entry.clone();
        self.blocking(move |conn| {
            conn.execute(
                "INSERT INTO blocklist_entries (source_id, pattern, is_regex) VALUES (?1, ?2, ?3)",
                params![entry.source_id, entry.pattern, entry.is_regex as i64],
            )?;
            Ok(())
        })
        .await
    }

    async fn delete_blocklist_entry(&self, pattern: &str) -> Result<(), StorageError> {
        let pattern = pattern.to_string();
        self.blocking(move |conn| {
            conn.execute("DELETE FROM blocklist_entries WHERE pattern = ?1", params![pattern])?;
            Ok(())
        })
        .await
    }

    async fn list_allowlist(&self) -> Result<Vec<String>, StorageError> {
        self.blocking(|conn| {
            let mut stmt = conn.prepare("SELECT pattern FROM allowlist")?;
            let rows = stmt.query_map([], |r| r.get(0))?.collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await
    }

    async fn add_allowlist_entry(&self, pattern: &str) -> Result<(), StorageError> {
        let pattern = pattern.to_string();
        self.blocking(move |conn| {
            conn.execute("INSERT OR IGNORE INTO allowlist (pattern) VALUES (?1)", params![pattern])?;
            Ok(())
        })
        .await
    }

    async fn delete_allowlist_entry(&self, pattern: &str) -> Result<(), StorageError> {
        let pattern = pattern.to_string();
        self.blocking(move |conn| {
            conn.execute("DELETE FROM allowlist WHERE pattern = ?1", params![pattern])?;
            Ok(())
        })
        .await
    }

    async fn list_regex_filters(&self) -> Result<Vec<RegexFilterRow>, StorageError> {
        self.blocking(|conn| {
            let mut stmt = conn.prepare("SELECT pattern, kind FROM regex_filters")?;
            let rows = stmt
                .query_map([], |r| Ok(RegexFilterRow { pattern: r.get(0)?, kind: r.get(1)? }))?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await
    }

    async fn list_client_policies(&self) -> Result<Vec<ClientPolicyRow>, StorageError> {
        self.blocking(|conn| {
            let mut stmt = conn.prepare("SELECT client, blocking_enabled FROM client_policies")?;
            let rows = stmt
                .query_map([], |r| {
                    let client: String = r.get(0)?;
                    let enabled: i64 = r.get(1)?;
                    Ok((client, enabled))
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows
                .into_iter()
                .filter_map(|(client, enabled)| client.parse::<IpAddr>().ok().map(|client| ClientPolicyRow { client, blocking_enabled: enabled != 0 }))
                .collect())
        })
        .await
    }

    async fn set_client_policy(&self, row: &ClientPolicyRow) -> Result<(), StorageError> {
        let client = row.client.to_string();
        let enabled = row.blocking_enabled;
        self.blocking(move |conn| {
            conn.execute(
                "INSERT INTO client_policies (client, blocking_enabled) VALUES (?1, ?2)
                 ON CONFLICT(client) DO UPDATE SET blocking_enabled = excluded.blocking_enabled",
                params![client, enabled as i64],
            )?;
            Ok(())
        })
        .await
    }

    async fn delete_client_policy(&self, client: IpAddr) -> Result<(), StorageError> {
        let client = client.to_string();
        self.blocking(move |conn| {
            conn.execute("DELETE FROM client_policies WHERE client = ?1", params![client])?;
            Ok(())
        })
        .await
    }

    async fn list_conditional_forwarding(&self) -> Result<Vec<ConditionalForwardingRow>, StorageError> {
        self.blocking(|conn| {
            let mut stmt = conn.prepare("SELECT domain, upstream FROM conditional_forwarding")?;
            let rows = stmt
                .query_map([], |r| Ok(ConditionalForwardingRow { domain: r.get(0)?, upstream: r.get(1)? }))?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await
    }

    async fn upsert_conditional_forwarding(&self, row: &ConditionalForwardingRow) -> Result<(), StorageError> {
        let row = row.clone();
        self.blocking(move |conn| {
            conn.execute("DELETE FROM conditional_forwarding WHERE domain = ?1", params![row.domain])?;
            conn.execute(
                "INSERT INTO conditional_forwarding (domain, upstream) VALUES (?1, ?2)",
                params![row.domain, row.upstream],
            )?;
            Ok(())
        })
        .await
    }

    async fn delete_conditional_forwarding(&self, domain: &str) -> Result<(), StorageError> {
        let domain = domain.to_string();
        self.blocking(move |conn| {
            conn.execute("DELETE FROM conditional_forwarding WHERE domain = ?1", params![domain])?;
            Ok(())
        })
        .await
    }

    async fn list_local_dns(&self) -> Result<Vec<LocalDnsRow>, StorageError> {
        self.blocking(|conn| {
            let mut stmt = conn.prepare("SELECT name, rtype, rdata FROM local_dns")?;
            let rows = stmt
                .query_map([], |r| Ok(LocalDnsRow { name: r.get(0)?, rtype: r.get::<_, i64>(1)? as u16, rdata: r.get(2)? }))?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await
    }

    async fn append_query_log(&self, row: &QueryLogRow) -> Result<(), StorageError> {
        let row = row.clone();
        self.blocking(move |conn| {
            conn.execute(
                "INSERT INTO queries (timestamp_unix, client, qname, qtype, rcode, blocked, block_reason, cached, response_time_ms, upstream_used)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    row.timestamp_unix,
                    row.client,
                    row.qname,
                    row.qtype,
                    row.rcode,
                    row.blocked as i64,
                    row.block_reason,
                    row.cached as i64,
                    row.response_time_ms,
                    row.upstream_used,
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn list_queries(&self, filter: &QueryLogFilter) -> Result<Vec<QueryLogRow>, StorageError> {
        let filter = filter.clone();
        self.blocking(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT timestamp_unix, client, qname, qtype, rcode, blocked, block_reason, cached, response_time_ms, upstream_used
                 FROM queries ORDER BY id DESC",
            )?;
            let rows = stmt
                .query_map([], |r| {
                    Ok(QueryLogRow {
                        timestamp_unix: r.get(0)?,
                        client: r.get(1)?,
                        qname: r.get(2)?,
                        qtype: r.get::<_, i64>(3)? as u16,
                        rcode: r.get::<_, i64>(4)? as u8,
                        blocked: r.get::<_, i64>(5)? != 0,
                        block_reason: r.get(6)?,
                        cached: r.get::<_, i64>(7)? != 0,
                        response_time_ms: r.get::<_, i64>(8)? as u32,
                        upstream_used: r.get(9)?,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;

            let mut filtered: Vec<QueryLogRow> = rows
                .into_iter()
                .filter(|row| filter.client.map(|c| row.client == c.to_string()).unwrap_or(true))
                .filter(|row| filter.qname_contains.as_ref().map(|needle| row.qname.contains(needle.as_str())).unwrap_or(true))
                .filter(|row| !filter.blocked_only || row.blocked)
                .collect();
            if filter.limit > 0 {
                filtered.truncate(filter.limit);
            }
            Ok(filtered)
        })
        .await
    }

    async fn get_setting(&self, key: &str) -> Result<Option<String>, StorageError> {
        let key = key.to_string();
        self.blocking(move |conn| {
            conn.query_row("SELECT value FROM settings WHERE key = ?1", params![key], |r| r.get(0)).map(Some).or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(other),
            })
        })
        .await
    }

    async fn set_setting(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let key = key.to_string();
        let value = value.to_string();
        self.blocking(move |conn| {
            conn.execute(
                "INSERT INTO settings (key, value) VALUES (?1, ?2) ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                params![key, value],
            )?;
            Ok(())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn zone_roundtrip() {
        let repo = SqliteRepository::open_in_memory().unwrap();
        let id = repo.upsert_zone("example.com", true).await.unwrap();
        let zones = repo.list_zones().await.unwrap();
        assert_eq!(zones.len(), 1);
        assert_eq!(zones[0].id, id);
        assert_eq!(zones[0].origin, "example.com");
    }

    #[tokio::test]
    async fn settings_roundtrip() {
        let repo = SqliteRepository::open_in_memory().unwrap();
        repo.set_setting("cache_enabled", "true").await.unwrap();
        assert_eq!(repo.get_setting("cache_enabled").await.unwrap(), Some("true".to_string()));
        assert_eq!(repo.get_setting("missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn query_log_filters_by_blocked() {
        let repo = SqliteRepository::open_in_memory().unwrap();
        repo.append_query_log(&QueryLogRow {
            timestamp_unix: 1,
            client: "127.0.0.1".to_string(),
            qname: "ads.example.com".to_string(),
            qtype: 1,
            rcode: 3,
            blocked: true,
            block_reason: Some("blocklist".to_string()),
            cached: false,
            response_time_ms: 2,
            upstream_used: None,
        })
        .await
        .unwrap();
        repo.append_query_log(&QueryLogRow {
            timestamp_unix: 2,
            client: "127.0.0.1".to_string(),
            qname: "example.com".to_string(),
            qtype: 1,
            rcode: 0,
            blocked: false,
            block_reason: None,
            cached: true,
            response_time_ms: 1,
            upstream_used: Some("1.1.1.1".to_string()),
        })
        .await
        .unwrap();

        let blocked = repo.list_queries(&QueryLogFilter { blocked_only: true, ..Default::default() }).await.unwrap();
        assert_eq!(blocked.len(), 1);
        assert_eq!(blocked[0].qname, "ads.example.com");
    }
}
