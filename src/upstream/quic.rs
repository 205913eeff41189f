// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// https://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// https://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! DNS-over-QUIC (RFC 9250) upstream transport: one bidirectional stream
//! per query, closed after the answer is read.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use quinn::{ClientConfig, Endpoint};
use tokio::io::AsyncReadExt;
use tokio::time::timeout;

use crate::error::UpstreamError;
use crate::upstream::tcp::write_framed;
use crate::wire::Message;

pub struct QuicTransport {
    addr: SocketAddr,
    server_name: String,
}

impl QuicTransport {
    pub fn new(addr: SocketAddr, server_name: String) -> Self {
        Self { addr, server_name }
    }

    pub async fn send(&self, message: &Message, request_timeout: Duration) -> Result<Message, UpstreamError> {
        let bytes = message
            .encode(Some(u16::MAX))
            .map_err(|_| UpstreamError::Timeout(self.addr.to_string()))?;

        let fut = async {
            let mut roots = rustls::RootCertStore::empty();
            roots.add_trust_anchors(webpki_roots::TLS_SERVER_ROOTS.iter().map(|ta| {
                rustls::OwnedTrustAnchor::from_subject_spki_name_constraints(
                    ta.subject,
                    ta.spki,
                    ta.name_constraints,
                )
            }));
            let crypto = rustls::ClientConfig::builder()
                .with_safe_defaults()
                .with_root_certificates(roots)
                .with_no_client_auth();
            let client_config = ClientConfig::new(Arc::new(crypto));

            let bind_addr: SocketAddr = if self.addr.is_ipv4() { "0.0.0.0:0" } else { "[::]:0" }
                .parse()
                .unwrap();
            let mut endpoint = Endpoint::client(bind_addr).map_err(|e| UpstreamError::Transport {
                upstream: self.addr.to_string(),
                source: e,
            })?;
            endpoint.set_default_client_config(client_config);

            let connection = endpoint
                .connect(self.addr, &self.server_name)
                .map_err(|e| UpstreamError::Transport {
                    upstream: self.addr.to_string(),
                    source: std::io::Error::new(std::io::ErrorKind::Other, e.to_string()),
                })?
                .await
                .map_err(|e| UpstreamError::Transport {
                    upstream: self.addr.to_string(),
                    source: std::io::Error::new(std::io::ErrorKind::Other, e.to_string()),
                })?;

            let (mut send, mut recv) = connection.open_bi().await.map_err(|e| UpstreamError::Transport {
                upstream: self.addr.to_string(),
                source: std::io::Error::new(std::io::ErrorKind::Other, e.to_string()),
            })?;

            write_framed(&mut send, &bytes).await.map_err(|e| UpstreamError::Transport {
                upstream: self.addr.to_string(),
                source: e,
            })?;
            send.finish().await.ok();

            let mut len_buf = [0u8; 2];
            recv.read_exact(&mut len_buf).await.map_err(|e| UpstreamError::Transport {
                upstream: self.addr.to_string(),
                source: std::io::Error::new(std::io::ErrorKind::UnexpectedEof, e.to_string()),
            })?;
            let len = u16::from_be_bytes(len_buf) as usize;
            let mut response_bytes = vec![0u8; len];
            recv.read_exact(&mut response_bytes).await.map_err(|e| UpstreamError::Transport {
                upstream: self.addr.to_string(),
                source: std::io::Error::new(std::io::ErrorKind::UnexpectedEof, e.to_string()),
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
