// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// https://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// https://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Plain UDP transport, with TCP fallback on truncation, per bare-IP
//! upstream targets.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::UdpSocket;
use tokio::time::timeout;

use crate::error::UpstreamError;
use crate::upstream::tcp::TcpTransport;
use crate::wire::Message;

pub struct UdpTransport {
    addr: SocketAddr,
}

impl UdpTransport {
    pub fn new(addr: SocketAddr) -> Self {
        Self { addr }
    }

    pub async fn send(&self, message: &Message, request_timeout: Duration) -> Result<Message, UpstreamError> {
        let bytes = message
            .encode(None)
            .map_err(|_| UpstreamError::Timeout(self.addr.to_string()))?;

        let fut = async {
            let socket = UdpSocket::bind(local_bind_addr(self.addr))
                .await
                .map_err(|e| UpstreamError::Transport { upstream: self.addr.to_string(), source: e })?;
            socket
                .connect(self.addr)
                .await
                .map_err(|e| UpstreamError::Transport { upstream: self.addr.to_string(), source: e })?;
            socket
                .send(&bytes)
                .await
                .map_err(|e| UpstreamError::Transport { upstream: self.addr.to_string(), source: e })?;

            let mut buf = vec![0u8; 4096];
            let n = socket
                .recv(&mut buf)
                .await
                .map_err(|e| UpstreamError::Transport { upstream: self.addr.to_string(), source: e })?;
            buf.truncate(n);

            let response = Message::decode(&buf).map_err(|_| UpstreamError::Transport {
                upstream: self.addr.to_string(),
                source: std::io::Error::new(std::io::ErrorKind::InvalidData, "malformed upstream reply"),
            })?;

            if response.header.truncated {
                let tcp = TcpTransport::new(self.addr);
                return tcp.send(message, request_timeout).await;
            }
            Ok(response)
        };

        timeout(request_timeout, fut)
            .await
            .map_err(|_| UpstreamError::Timeout(self.addr.to_string()))?
    }
}

fn local_bind_addr(remote: SocketAddr) -> SocketAddr {
    if remote.is_ipv4() {
        "0.0.0.0:0".parse().unwrap()
    } else {
        "[::]:0".parse().unwrap()
    }
}
