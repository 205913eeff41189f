// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// https://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// https://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Typed configuration loaded from the environment (see the external
//! interfaces section) with an optional TOML overlay.

use std::env;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::time::Duration;

use ipnet::IpNet;
use serde::Deserialize;

use crate::error::ConfigError;

/// Configuration merged from environment variables and, optionally, a TOML
/// file. Environment values win when both are present.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_address: IpAddr,
    pub dns_port: u16,
    pub dot_port: u16,
    pub doq_port: u16,
    pub doh_port: u16,
    pub doh_path: String,
    pub upstream_dns: Vec<String>,
    pub privacy_mode: bool,
    pub rate_limit_max: u32,
    pub rate_limit_window_ms: u64,
    pub cache_enabled: bool,
    pub cache_max_entries: usize,
    pub dnssec_validation: bool,
    pub dnssec_chain_validation: bool,
    pub request_deadline_ms: u64,
    /// Shared by the DoT and DoQ listeners; `None` leaves both disabled.
    pub tls_cert_path: Option<String>,
    pub tls_key_path: Option<String>,
    /// Peers allowed to run AXFR/IXFR without TSIG. Empty means TSIG is
    /// mandatory for every transfer, per §4.6's authentication contract.
    pub transfer_acl: Vec<IpNet>,
    /// When set, blocked A/AAAA queries answer with `sinkhole_v4`/`sinkhole_v6`
    /// instead of NXDOMAIN (§4.2 step 9's "block-page mode").
    pub block_page_enabled: bool,
    pub sinkhole_v4: Ipv4Addr,
    pub sinkhole_v6: Ipv6Addr,
    pub sinkhole_ttl: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: IpAddr::from([0, 0, 0, 0]),
            dns_port: 53,
            dot_port: 853,
            doq_port: 853,
            doh_port: 443,
            doh_path: "/dns-query".to_string(),
            upstream_dns: Vec::new(),
            privacy_mode: false,
            rate_limit_max: 1000,
            rate_limit_window_ms: 60_000,
            cache_enabled: true,
            cache_max_entries: 100_000,
            dnssec_validation: false,
            dnssec_chain_validation: false,
            request_deadline_ms: 5_000,
            tls_cert_path: None,
            tls_key_path: None,
            transfer_acl: Vec::new(),
            block_page_enabled: false,
            sinkhole_v4: Ipv4Addr::new(0, 0, 0, 0),
            sinkhole_v6: Ipv6Addr::UNSPECIFIED,
            sinkhole_ttl: 60,
        }
    }
}

impl ServerConfig {
    pub fn request_deadline(&self) -> Duration {
        Duration::from_millis(self.request_deadline_ms)
    }

    pub fn rate_limit_window(&self) -> Duration {
        Duration::from_millis(self.rate_limit_window_ms)
    }

    /// Whether `peer` may run AXFR/IXFR without presenting TSIG.
    pub fn transfer_allowed_by_acl(&self, peer: IpAddr) -> bool {
        self.transfer_acl.iter().any(|net| net.contains(&peer))
    }

    /// Loads configuration from an optional TOML file, then applies any
    /// recognised environment variable as an override.
    pub fn load(toml_path: Option<&str>) -> Result<Self, ConfigError> {
        let mut config = match toml_path {
            Some(path) => {
                let text = std::fs::read_to_string(path).map_err(|e| ConfigError::InvalidValue {
                    name: "config file",
                    reason: e.to_string(),
                })?;
                basic_toml::from_str(&text).map_err(|e| ConfigError::InvalidValue {
                    name: "config file",
                    reason: e.to_string(),
                })?
            }
            None => Self::default(),
        };

        if let Ok(v) = env::var("BIND_ADDRESS") {
            config.bind_address = parse_env("BIND_ADDRESS", &v)?;
        }
        if let Ok(v) = env::var("DNS_PORT") {
            config.dns_port = parse_env("DNS_PORT", &v)?;
        }
        if let Ok(v) = env::var("DOT_PORT") {
            config.dot_port = parse_env("DOT_PORT", &v)?;
        }
        if let Ok(v) = env::var("DOQ_PORT") {
            config.doq_port = parse_env("DOQ_PORT", &v)?;
        }
        if let Ok(v) = env::var("DOH_PORT") {
            config.doh_port = parse_env("DOH_PORT", &v)?;
        }
        if let Ok(v) = env::var("DOH_PATH") {
            config.doh_path = v;
        }
        if let Ok(v) = env::var("TLS_CERT_PATH") {
            config.tls_cert_path = Some(v);
        }
        if let Ok(v) = env::var("TLS_KEY_PATH") {
            config.tls_key_path = Some(v);
        }
        if let Ok(v) = env::var("TRANSFER_ACL") {
            let mut nets = Vec::new();
            for part in v.split(',').map(str::trim).filter(|s| !s.is_empty()) {
                nets.push(parse_env::<IpNet>("TRANSFER_ACL", part)?);
            }
            config.transfer_acl = nets;
        }
        if let Ok(v) = env::var("UPSTREAM_DNS") {
            config.upstream_dns = v.split(',').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect();
        }
        if let Ok(v) = env::var("PRIVACY_MODE") {
            config.privacy_mode = parse_env("PRIVACY_MODE", &v)?;
        }
        if let Ok(v) = env::var("RATE_LIMIT_MAX") {
            config.rate_limit_max = parse_env("RATE_LIMIT_MAX", &v)?;
        }
        if let Ok(v) = env::var("RATE_LIMIT_WINDOW_MS") {
            config.rate_limit_window_ms = parse_env("RATE_LIMIT_WINDOW_MS", &v)?;
        }
        if let Ok(v) = env::var("CACHE_ENABLED") {
            config.cache_enabled = parse_env("CACHE_ENABLED", &v)?;
        }
        if let Ok(v) = env::var("CACHE_MAX_ENTRIES") {
            config.cache_max_entries = parse_env("CACHE_MAX_ENTRIES", &v)?;
        }
        if let Ok(v) = env::var("DNSSEC_VALIDATION") {
            config.dnssec_validation = parse_env("DNSSEC_VALIDATION", &v)?;
        }
        if let Ok(v) = env::var("DNSSEC_CHAIN_VALIDATION") {
            config.dnssec_chain_validation = parse_env("DNSSEC_CHAIN_VALIDATION", &v)?;
        }
        if let Ok(v) = env::var("BLOCK_PAGE_ENABLED") {
            config.block_page_enabled = parse_env("BLOCK_PAGE_ENABLED", &v)?;
        }
        if let Ok(v) = env::var("SINKHOLE_V4") {
            config.sinkhole_v4 = parse_env("SINKHOLE_V4", &v)?;
        }
        if let Ok(v) = env::var("SINKHOLE_V6") {
            config.sinkhole_v6 = parse_env("SINKHOLE_V6", &v)?;
        }
        if let Ok(v) = env::var("SINKHOLE_TTL") {
            config.sinkhole_ttl = parse_env("SINKHOLE_TTL", &v)?;
        }

        Ok(config)
    }
}

fn parse_env<T: std::str::FromStr>(name: &'static str, raw: &str) -> Result<T, ConfigError> {
    raw.parse().map_err(|_| ConfigError::InvalidValue {
        name,
        reason: format!("could not parse {raw:?}"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = ServerConfig::default();
        assert_eq!(config.dns_port, 53);
        assert_eq!(config.cache_max_entries, 100_000);
        assert!(config.cache_enabled);
        assert!(config.transfer_acl.is_empty());
    }

    #[test]
    fn transfer_acl_matches_contained_peers_only() {
        let mut config = ServerConfig::default();
        config.transfer_acl = vec!["10.0.0.0/24".parse().unwrap()];
        assert!(config.transfer_allowed_by_acl("10.0.0.5".parse().unwrap()));
        assert!(!config.transfer_allowed_by_acl("10.0.1.5".parse().unwrap()));
    }
}
