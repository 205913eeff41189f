// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// https://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// https://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Length-prefixed TCP transport: plain TCP listener here, reused by
//! `server::dot` once a stream has been TLS-wrapped.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tracing::debug;

use crate::pipeline::{Pipeline, Request, Transport};
use crate::upstream::tcp::{read_framed, write_framed};

pub async fn serve(pipeline: Arc<Pipeline>, listener: TcpListener) -> std::io::Result<()> {
    loop {
        let (stream, peer) = listener.accept().await?;
        let pipeline = pipeline.clone();
        tokio::spawn(async move {
            if let Err(e) = handle_stream(pipeline, stream, peer, Transport::Tcp).await {
                debug!(%peer, error = %e, "tcp connection closed");
            }
        });
    }
}

/// Services one connection: a client may pipeline several queries on the
/// same stream, each framed with a 2-byte length prefix, until it closes
/// its half or a read/write fails.
pub async fn handle_stream<S: AsyncRead + AsyncWrite + Unpin>(
    pipeline: Arc<Pipeline>,
    mut stream: S,
    peer: SocketAddr,
    transport: Transport,
) -> std::io::Result<()> {
    loop {
        let raw_message = match read_framed(&mut stream).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(()),
            Err(e) => return Err(e),
        };

        if let Some(replies) = super::xfr::maybe_handle(&pipeline, &raw_message, peer.ip()).await {
            for reply in replies {
                let bytes = reply.encode(Some(u16::MAX)).unwrap_or_default();
                write_framed(&mut stream, &bytes).await?;
            }
            continue;
        }

        let request = Request { raw_message, client_addr: peer.ip(), transport, received_at: Instant::now() };
        let response = super::resolve_and_log(&pipeline, request).await;
        write_framed(&mut stream, &response.bytes).await?;
    }
}
