//! One-shot command exchange with the strip over TCP or UDP. A fresh
//! connection per call; the device closes and resets readily, so there is
//! nothing to pool. The caller picks the framing mode; retry policy lives
//! above this layer.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpStream, UdpSocket};
use tokio::time::timeout;

use crate::cipher;
use crate::error::TransportError;

/// Fixed receive buffer for both modes. Responses larger than this
/// truncate and fail to parse; the device never legitimately sends more.
pub const RECV_BUFFER_SIZE: usize = 2048;

/// Framing mode for one exchange. Stream carries the 4-byte length prefix
/// in both directions; Datagram carries the bare cipher stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportMode {
    Stream,
    Datagram,
}

/// Send one encoded command and return the parsed response tree.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn exchange(&self, command: &str, mode: TransportMode) -> Result<Value, TransportError>;
}

// ---------------------------------------------------------------------------
// Production transport
// ---------------------------------------------------------------------------

/// TCP/UDP transport for a single strip address. The timeout applies to
/// connect and receive independently.
pub struct NetTransport {
    host: String,
    port: u16,
    deadline: Duration,
}

impl NetTransport {
    pub const DEFAULT_PORT: u16 = 9999;

    pub fn new(host: impl Into<String>, deadline: Duration) -> Self {
        Self {
            host: host.into(),
            port: Self::DEFAULT_PORT,
            deadline,
        }
    }

    pub fn with_port(host: impl Into<String>, port: u16, deadline: Duration) -> Self {
        Self {
            host: host.into(),
            port,
            deadline,
        }
    }

    async fn exchange_stream(&self, command: &str) -> Result<Value, TransportError> {
        let mut sock = timeout(
            self.deadline,
            TcpStream::connect((self.host.as_str(), self.port)),
        )
        .await
        .map_err(|_| TransportError::Timeout(self.deadline))??;

        sock.write_all(&cipher::encode(command, true)).await?;

        // Single bounded receive; an oversized response truncates here and
        // fails the parse below.
        let mut buf = vec![0u8; RECV_BUFFER_SIZE];
        let n = timeout(self.deadline, sock.read(&mut buf))
            .await
            .map_err(|_| TransportError::Timeout(self.deadline))??;

        // The device echoes its own unencrypted length prefix back.
        if n < 4 {
            return Err(TransportError::ShortResponse { got: n });
        }
        let text = cipher::decode(&buf[4..n]);
        Ok(serde_json::from_str(&text)?)
    }

    async fn exchange_datagram(&self, command: &str) -> Result<Value, TransportError> {
        let sock = UdpSocket::bind("0.0.0.0:0").await?;
        sock.connect((self.host.as_str(), self.port)).await?;

        sock.send(&cipher::encode(command, false)).await?;

        let mut buf = vec![0u8; RECV_BUFFER_SIZE];
        let n = timeout(self.deadline, sock.recv(&mut buf))
            .await
            .map_err(|_| TransportError::Timeout(self.deadline))??;

        let text = cipher::decode(&buf[..n]);
        Ok(serde_json::from_str(&text)?)
    }
}

#[async_trait]
impl Transport for NetTransport {
    async fn exchange(&self, command: &str, mode: TransportMode) -> Result<Value, TransportError> {
        match mode {
            TransportMode::Stream => self.exchange_stream(command).await,
            TransportMode::Datagram => self.exchange_datagram(command).await,
        }
    }
}

// ===========================================================================
// Tests
// ===========================================================================
