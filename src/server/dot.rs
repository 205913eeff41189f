// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// https://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// https://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! DNS-over-TLS (RFC 7858): TLS-wrapped TCP, sharing the same framing
//! and pipelined-query handling as `server::tcp`.

use std::fs::File;
use std::io::BufReader;
use std::sync::Arc;

use rustls::{Certificate, PrivateKey};
use tokio::net::TcpListener;
use tokio_rustls::TlsAcceptor;
use tracing::debug;

use crate::config::ServerConfig;
use crate::error::ConfigError;
use crate::pipeline::{Pipeline, Transport};

fn invalid(name: &'static str, reason: impl std::fmt::Display) -> ConfigError {
    ConfigError::InvalidValue { name, reason: reason.to_string() }
}

/// Loads the PEM certificate chain configured for TLS-bearing listeners
/// (DoT and DoQ both use it).
pub(crate) fn load_certs(path: &str) -> Result<Vec<Certificate>, ConfigError> {
    let file = File::open(path).map_err(|e| invalid("tls_cert_path", e))?;
    let certs = rustls_pemfile::certs(&mut BufReader::new(file)).map_err(|e| invalid("tls_cert_path", e))?;
    Ok(certs.into_iter().map(Certificate).collect())
}

/// Loads the first PKCS#8 private key found at `path`.
pub(crate) fn load_key(path: &str) -> Result<PrivateKey, ConfigError> {
    let file = File::open(path).map_err(|e| invalid("tls_key_path", e))?;
    let mut keys = rustls_pemfile::pkcs8_private_keys(&mut BufReader::new(file)).map_err(|e| invalid("tls_key_path", e))?;
    let key = keys.pop().ok_or_else(|| invalid("tls_key_path", "no private key found"))?;
    Ok(PrivateKey(key))
}

pub fn build_acceptor(config: &ServerConfig) -> Result<TlsAcceptor, ConfigError> {
    let cert_path = config.tls_cert_path.as_deref().ok_or_else(|| invalid("tls_cert_path", "not configured"))?;
    let key_path = config.tls_key_path.as_deref().ok_or_else(|| invalid("tls_key_path", "not configured"))?;

    let certs = load_certs(cert_path)?;
    let key = load_key(key_path)?;

    let tls_config = rustls::ServerConfig::builder()
        .with_safe_defaults()
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .map_err(|e| invalid("tls_cert_path", format!("building TLS config: {e}")))?;

    Ok(TlsAcceptor::from(Arc::new(tls_config)))
}

pub async fn serve(pipeline: Arc<Pipeline>, listener: TcpListener, acceptor: TlsAcceptor) -> std::io::Result<()> {
    loop {
        let (stream, peer) = listener.accept().await?;
        let pipeline = pipeline.clone();
        let acceptor = acceptor.clone();
        tokio::spawn(async move {
            let tls_stream = match acceptor.accept(stream).await {
                Ok(s) => s,
                Err(e) => {
                    debug!(%peer, error = %e, "DoT handshake failed");
                    return;
                }
            };
            if let Err(e) = super::tcp::handle_stream(pipeline, tls_stream, peer, Transport::Dot).await {
                debug!(%peer, error = %e, "DoT connection closed");
            }
        });
    }
}
