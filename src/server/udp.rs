// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// https://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// https://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Plain UDP listener. Reads and replies run on separate halves of the
//! socket so one slow resolve never blocks the recv loop: each datagram
//! is handed to its own task, and replies are funnelled back through a
//! channel to the single send half.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tracing::debug;

use crate::pipeline::{Pipeline, Request, Transport};

/// Largest datagram this listener will read; EDNS0 payloads above this
/// are the client's problem, not ours (RFC 6891 practical maximum).
const MAX_UDP_PACKET: usize = 4096;
const REPLY_QUEUE_DEPTH: usize = 256;

pub async fn serve(pipeline: Arc<Pipeline>, socket: UdpSocket) -> std::io::Result<()> {
    let socket = Arc::new(socket);
    let (tx, mut rx) = mpsc::channel::<(Vec<u8>, SocketAddr)>(REPLY_QUEUE_DEPTH);

    let send_socket = socket.clone();
    tokio::spawn(async move {
        while let Some((bytes, peer)) = rx.recv().await {
            if let Err(e) = send_socket.send_to(&bytes, peer).await {
                debug!(%peer, error = %e, "udp send error");
            }
        }
    });

    let mut buf = vec![0u8; MAX_UDP_PACKET];
    loop {
        let (size, peer) = socket.recv_from(&mut buf).await?;
        let raw_message = buf[..size].to_vec();
        let pipeline = pipeline.clone();
        let tx = tx.clone();
        tokio::spawn(async move {
            let request = Request { raw_message, client_addr: peer.ip(), transport: Transport::Udp, received_at: Instant::now() };
            let response = super::resolve_and_log(&pipeline, request).await;
            if tx.send((response.bytes, peer)).await.is_err() {
                debug!(%peer, "udp reply channel closed, dropping response");
            }
        });
    }
}
