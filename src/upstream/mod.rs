// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// https://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// https://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Upstream pool: owns one transport + health tracker per configured
//! upstream, selected by URL scheme, and implements the ordered-failover
//! contract.

pub mod doh;
pub mod health;
pub mod quic;
pub mod tcp;
pub mod tls;
pub mod udp;

use std::collections::HashMap;
use std::net::{SocketAddr, ToSocketAddrs};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::error::UpstreamError;
use crate::upstream::health::UpstreamHealth;
use crate::wire::Message;

const PER_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(2);
const MAX_RETRIES: usize = 2;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum UpstreamKind {
    Udp,
    Dot,
    Doh { binary: bool },
    Doq,
}

/// One configured upstream target, parsed from its URL/address form:
///  * bare IP[:port]        -> UDP with TCP fallback
///  * `tls://host[:port]`   -> DoT
///  * `https://host/path`   -> DoH
///  * `quic://host[:port]`  -> DoQ
#[derive(Clone, Debug)]
pub struct UpstreamSpec {
    pub raw: String,
    pub kind: UpstreamKind,
    pub addr: Option<SocketAddr>,
    pub host: String,
}

impl UpstreamSpec {
    pub fn parse(raw: &str) -> Result<Self, UpstreamError> {
        if let Some(rest) = raw.strip_prefix("tls://") {
            let (host, addr) = resolve_host_port(rest, 853)?;
            return Ok(Self { raw: raw.to_string(), kind: UpstreamKind::Dot, addr: Some(addr), host });
        }
        if let Some(rest) = raw.strip_prefix("quic://") {
            let (host, addr) = resolve_host_port(rest, 853)?;
            return Ok(Self { raw: raw.to_string(), kind: UpstreamKind::Doq, addr: Some(addr), host });
        }
        if raw.starts_with("https://") {
            return Ok(Self { raw: raw.to_string(), kind: UpstreamKind::Doh { binary: true }, addr: None, host: raw.to_string() });
        }
        // Bare IP (optionally with :port) -> UDP/TCP.
        let (host, addr) = resolve_host_port(raw, 53)?;
        Ok(Self { raw: raw.to_string(), kind: UpstreamKind::Udp, addr: Some(addr), host })
    }
}

fn resolve_host_port(spec: &str, default_port: u16) -> Result<(String, SocketAddr), UpstreamError> {
    let candidate = if spec.contains(':') && !spec.starts_with('[') {
        // Could already carry an explicit port (IPv4 `host:port` form).
        spec.to_string()
    } else {
        format!("{spec}:{default_port}")
    };
    let mut addrs = candidate
        .to_socket_addrs()
        .map_err(|_| UpstreamError::Transport {
            upstream: spec.to_string(),
            source: std::io::Error::new(std::io::ErrorKind::InvalidInput, "could not resolve upstream address"),
        })?;
    let addr = addrs.next().ok_or_else(|| UpstreamError::Transport {
        upstream: spec.to_string(),
        source: std::io::Error::new(std::io::ErrorKind::InvalidInput, "no address for upstream"),
    })?;
    let host = spec.split(':').next().unwrap_or(spec).to_string();
    Ok((host, addr))
}

struct PoolEntry {
    spec: UpstreamSpec,
    health: UpstreamHealth,
}

/// Owns connections/sessions for every configured upstream and tracks
/// per-upstream health across calls.
pub struct UpstreamPool {
    entries: HashMap<String, Arc<PoolEntry>>,
    request_timeout: Duration,
}

impl UpstreamPool {
    pub fn new(upstreams: &[String], request_timeout: Duration) -> Result<Self, UpstreamError> {
        let mut entries = HashMap::new();
        for raw in upstreams {
            let spec = UpstreamSpec::parse(raw)?;
            entries.insert(
                raw.clone(),
                Arc::new(PoolEntry { spec, health: UpstreamHealth::new() }),
            );
        }
        Ok(Self { entries, request_timeout: request_timeout.min(PER_ATTEMPT_TIMEOUT) })
    }

    /// Tries each candidate in turn with a per-transport timeout and at
    /// most [`MAX_RETRIES`] total, honouring per-upstream disable windows.
    /// Returns the first success and the upstream string that answered.
    pub async fn forward(&self, candidates: &[String], message: &Message) -> Result<(Message, String), UpstreamError> {
        if candidates.is_empty() {
            return Err(UpstreamError::NoUpstreams);
        }

        let mut attempts = 0usize;
        let mut last_err = None;
        for raw in candidates {
            if attempts > MAX_RETRIES {
                break;
            }
            let Some(entry) = self.entries.get(raw) else {
                continue;
            };
            if entry.health.is_disabled() {
                debug!(upstream = raw, "skipping disabled upstream");
                continue;
            }

            attempts += 1;
            match self.send_once(&entry.spec, message).await {
                Ok(response) => {
                    entry.health.record_success();
                    return Ok((response, raw.clone()));
                }
                Err(e) => {
                    warn!(upstream = raw, error = %e, "upstream attempt failed");
                    entry.health.record_failure();
                    last_err = Some(e);
                }
            }
        }

        Err(last_err.unwrap_or(UpstreamError::AllFailed { attempted: attempts }))
    }

    async fn send_once(&self, spec: &UpstreamSpec, message: &Message) -> Result<Message, UpstreamError> {
        match &spec.kind {
            UpstreamKind::Udp => {
                let addr = spec.addr.expect("udp upstream always has a resolved address");
                udp::UdpTransport::new(addr).send(message, self.request_timeout).await
            }
            UpstreamKind::Dot => {
                let addr = spec.addr.expect("dot upstream always has a resolved address");
                tls::TlsTransport::new(addr, spec.host.clone(), true)
                    .send(message, self.request_timeout)
                    .await
            }
            UpstreamKind::Doq => {
                let addr = spec.addr.expect("doq upstream always has a resolved address");
                quic::QuicTransport::new(addr, spec.host.clone())
                    .send(message, self.request_timeout)
                    .await
            }
            UpstreamKind::Doh { binary } => {
                let transport = doh::HttpsTransport::new(spec.raw.clone(), self.request_timeout);
                if *binary {
                    transport.send_binary(message).await
                } else {
                    transport.send_json(message).await
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_bare_ip_as_udp() {
        let spec = UpstreamSpec::parse("1.1.1.1").unwrap();
        assert_eq!(spec.kind, UpstreamKind::Udp);
        assert_eq!(spec.addr.unwrap().port(), 53);
    }

    #[test]
    fn parses_tls_scheme_as_dot() {
        let spec = UpstreamSpec::parse("tls://1.1.1.1").unwrap();
        assert_eq!(spec.kind, UpstreamKind::Dot);
        assert_eq!(spec.addr.unwrap().port(), 853);
    }

    #[test]
    fn parses_https_scheme_as_doh() {
        let spec = UpstreamSpec::parse("https://dns.example.com/dns-query").unwrap();
        assert_eq!(spec.kind, UpstreamKind::Doh { binary: true });
    }

    #[test]
    fn parses_quic_scheme_as_doq() {
        let spec = UpstreamSpec::parse("quic://1.1.1.1").unwrap();
        assert_eq!(spec.kind, UpstreamKind::Doq);
        assert_eq!(spec.addr.unwrap().port(), 853);
    }
}
