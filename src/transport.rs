//! # Transport Layer
//!
//! Outbound half of a toolbox connection. Responses are plain text
//! written as-is; end-of-output is signalled by shutting down the write
//! side.

use std::fmt;

use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::error::{ProtocolError, ProtocolResult};

/// Write half of a connection
pub struct ResponseWriter<W> {
    /// The underlying write half
    sink: W,
    /// Bytes sent
    bytes_sent: u64,
    /// Whether the write side has been shut down
    eof_sent: bool,
}

impl<W: AsyncWrite + Unpin> ResponseWriter<W> {
    /// Wrap a write half
    pub fn new(sink: W) -> Self {
        Self {
            sink,
            bytes_sent: 0,
            eof_sent: false,
        }
    }

    /// Send raw bytes
    pub async fn send(&mut self, data: &[u8]) -> ProtocolResult<()> {
        if self.eof_sent {
            return Err(ProtocolError::ConnectionClosed);
        }

        self.sink.write_all(data).await?;
        self.sink.flush().await?;
        self.bytes_sent += data.len() as u64;

        Ok(())
    }

    /// Signal end of output. Only the first call touches the socket.
    pub async fn send_eof(&mut self) -> ProtocolResult<()> {
        if self.eof_sent {
            return Ok(());
        }
        self.eof_sent = true;
        self.sink.shutdown().await.map_err(ProtocolError::IoError)
    }

    /// Get bytes sent
    pub fn bytes_sent(&self) -> u64 {
        self.bytes_sent
    }

    /// Whether end of output has been signalled
    pub fn is_eof_sent(&self) -> bool {
        self.eof_sent
    }
}

/// Transport statistics
#[derive(Debug, Clone)]
pub struct TransportStats {
    pub peer: String,
    pub bytes_sent: u64,
    pub bytes_received: u64,
}

impl fmt::Display for TransportStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: sent={} bytes, recv={} bytes",
            self.peer, self.bytes_sent, self.bytes_received
        )
    }
}
