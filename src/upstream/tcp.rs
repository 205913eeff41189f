// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// https://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// https://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Length-prefixed TCP transport (also the fallback transport for DoT).

use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;

use crate::error::UpstreamError;
use crate::wire::Message;

pub struct TcpTransport {
    addr: SocketAddr,
}

impl TcpTransport {
    pub fn new(addr: SocketAddr) -> Self {
        Self { addr }
    }

    pub async fn send(&self, message: &Message, request_timeout: Duration) -> Result<Message, UpstreamError> {
        let bytes = message
            .encode(Some(u16::MAX))
            .map_err(|_| UpstreamError::Timeout(self.addr.to_string()))?;

        let fut = async {
            let mut stream = TcpStream::connect(self.addr)
                .await
                .map_err(|e| UpstreamError::Transport { upstream: self.addr.to_string(), source: e })?;
            write_framed(&mut stream, &bytes).await.map_err(|e| UpstreamError::Transport {
                upstream: self.addr.to_string(),
                source: e,
            })?;
            let response_bytes = read_framed(&mut stream).await.map_err(|e| UpstreamError::Transport {
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

/// Writes a 2-byte big-endian length prefix followed by the message.
pub async fn write_framed<W: AsyncWriteExt + Unpin>(writer: &mut W, bytes: &[u8]) -> std::io::Result<()> {
    let len = bytes.len() as u16;
    writer.write_all(&len.to_be_bytes()).await?;
    writer.write_all(bytes).await?;
    writer.flush().await
}

/// Reads a 2-byte big-endian length prefix followed by exactly that many
/// bytes.
pub async fn read_framed<R: AsyncReadExt + Unpin>(reader: &mut R) -> std::io::Result<Vec<u8>> {
    let mut len_buf = [0u8; 2];
    reader.read_exact(&mut len_buf).await?;
    let len = u16::from_be_bytes(len_buf) as usize;
    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf).await?;
    Ok(buf)
}
