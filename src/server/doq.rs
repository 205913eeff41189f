// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// https://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// https://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! DNS-over-QUIC (RFC 9250): one bidirectional stream per query, a
//! single length-prefixed request followed by a single length-prefixed
//! reply, then the stream closes.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use tokio::io::AsyncReadExt;
use tracing::debug;

use crate::config::ServerConfig;
use crate::error::ConfigError;
use crate::pipeline::{Pipeline, Request, Transport};
use crate::upstream::tcp::write_framed;

const ALPN_DOQ: &[u8] = b"doq";

pub fn build_endpoint(config: &ServerConfig, bind_addr: SocketAddr) -> Result<quinn::Endpoint, ConfigError> {
    let certs = super::dot::load_certs(config.tls_cert_path.as_deref().ok_or_else(|| ConfigError::InvalidValue {
        name: "tls_cert_path",
        reason: "not configured".to_string(),
    })?)?;
    let key = super::dot::load_key(config.tls_key_path.as_deref().ok_or_else(|| ConfigError::InvalidValue {
        name: "tls_key_path",
        reason: "not configured".to_string(),
    })?)?;

    let mut crypto = rustls::ServerConfig::builder()
        .with_safe_defaults()
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .map_err(|e| ConfigError::InvalidValue { name: "tls_cert_path", reason: format!("building TLS config: {e}") })?;
    crypto.alpn_protocols = vec![ALPN_DOQ.to_vec()];

    let server_config = quinn::ServerConfig::with_crypto(Arc::new(crypto));
    quinn::Endpoint::server(server_config, bind_addr)
        .map_err(|e| ConfigError::InvalidValue { name: "dns_port", reason: format!("binding QUIC endpoint: {e}") })
}

pub async fn serve(pipeline: Arc<Pipeline>, endpoint: quinn::Endpoint) {
    while let Some(connecting) = endpoint.accept().await {
        let pipeline = pipeline.clone();
        tokio::spawn(async move {
            let connection = match connecting.await {
                Ok(c) => c,
                Err(e) => {
                    debug!(error = %e, "DoQ handshake failed");
                    return;
                }
            };
            let peer = connection.remote_address();
            loop {
                let (send, recv) = match connection.accept_bi().await {
                    Ok(streams) => streams,
                    Err(e) => {
                        debug!(%peer, error = %e, "DoQ connection closed");
                        return;
                    }
                };
                let pipeline = pipeline.clone();
                tokio::spawn(handle_stream(pipeline, send, recv, peer));
            }
        });
    }
}

async fn handle_stream(pipeline: Arc<Pipeline>, mut send: quinn::SendStream, mut recv: quinn::RecvStream, peer: SocketAddr) {
    let mut len_buf = [0u8; 2];
    if recv.read_exact(&mut len_buf).await.is_err() {
        return;
    }
    let len = u16::from_be_bytes(len_buf) as usize;
    let mut raw_message = vec![0u8; len];
    if recv.read_exact(&mut raw_message).await.is_err() {
        return;
    }

    let response = if let Some(replies) = super::xfr::maybe_handle(&pipeline, &raw_message, peer.ip()).await {
        replies.into_iter().next().and_then(|m| m.encode(Some(u16::MAX)).ok()).unwrap_or_default()
    } else {
        let request = Request { raw_message, client_addr: peer.ip(), transport: Transport::Doq, received_at: Instant::now() };
        super::resolve_and_log(&pipeline, request).await.bytes
    };

    if let Err(e) = write_framed(&mut send, &response).await {
        debug!(%peer, error = %e, "DoQ write error");
    }
    let _ = send.finish().await;
}
