// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// https://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// https://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! DNS-over-TLS (RFC 7858) upstream transport: persistent TLS connection,
//! length-prefixed frames identical to plain TCP.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use rustls::{ClientConfig, ServerName};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_rustls::TlsConnector;

use crate::error::UpstreamError;
use crate::upstream::tcp::{read_framed, write_framed};
use crate::wire::Message;

pub struct TlsTransport {
    addr: SocketAddr,
    sni: String,
    connector: TlsConnector,
}

impl TlsTransport {
    pub fn new(addr: SocketAddr, sni: String, verify: bool) -> Self {
        let config = if verify {
            let mut roots = rustls::RootCertStore::empty();
            roots.add_trust_anchors(webpki_roots::TLS_SERVER_ROOTS.iter().map(|ta| {
                rustls::OwnedTrustAnchor::from_subject_spki_name_constraints(
                    ta.subject,
                    ta.spki,
                    ta.name_constraints,
                )
            }));
            ClientConfig::builder()
                .with_safe_defaults()
                .with_root_certificates(roots)
                .with_no_client_auth()
        } else {
            ClientConfig::builder()
                .with_safe_defaults()
                .with_root_certificates(rustls::RootCertStore::empty())
                .with_no_client_auth()
        };
        Self {
            addr,
            sni,
            connector: TlsConnector::from(Arc::new(config)),
        }
    }

    pub async fn send(&self, message: &Message, request_timeout: Duration) -> Result<Message, UpstreamError> {
        let bytes = message
            .encode(Some(u16::MAX))
            .map_err(|_| UpstreamError::Timeout(self.addr.to_string()))?;

        let fut = async {
            let tcp = TcpStream::connect(self.addr)
                .await
                .map_err(|e| UpstreamError::Transport { upstream: self.addr.to_string(), source: e })?;
            let server_name = ServerName::try_from(self.sni.as_str()).map_err(|_| UpstreamError::Transport {
                upstream: self.addr.to_string(),
                source: std::io::Error::new(std::io::ErrorKind::InvalidInput, "invalid SNI host"),
            })?;
            let mut tls = self
                .connector
                .connect(server_name, tcp)
                .await
                .map_err(|e| UpstreamError::Transport { upstream: self.addr.to_string(), source: e })?;

            write_framed(&mut tls, &bytes).await.map_err(|e| UpstreamError::Transport {
                upstream: self.addr.to_string(),
                source: e,
            })?;
            let response_bytes = read_framed(&mut tls).await.map_err(|e| UpstreamError::Transport {
                upstream: self.addr.to_string(),
                source: e,
            })?;
            Message::decode(&response_bytes).map_err(|_| UpstreamError::Transport {
                upstream: self.addr.to_string(),
                source: std::io::Error::new(std::io::ErrorKind::InvalidData, "malformed upstream reply"),
            })
        };

        timeout(request_timeout, fut)
            .await
            .map_err(|_| UpstreamError::Timeout(self.addr.to_string()))?
    }
}
