//! # Connection Supervisor
//!
//! Accepts TCP clients and runs one [`Session`] per connection in its own
//! task. Connections share nothing except the read-only global registry.
//! There are no read or write timeouts: a stalled client only holds its
//! own task.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{split, AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::error::{ProtocolError, ProtocolResult};
use crate::line_reader::LineReader;
use crate::menu::Session;
use crate::oracle::SigningOracle;
use crate::registry::GlobalScope;
use crate::transport::{ResponseWriter, TransportStats};

/// Per-process settings handed to every connection
#[derive(Debug)]
pub struct ConnectionSettings {
    /// Process-wide debug registry
    pub globals: Arc<GlobalScope>,
    /// Line length limit for client input
    pub max_line_length: usize,
}

impl ConnectionSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            globals: Arc::new(GlobalScope::from_config(config)),
            max_line_length: config.challenge.max_line_length,
        }
    }
}

/// Serve one client over `stream` until it quits or fails.
///
/// The stream is owned here and released exactly once, whatever happened
/// inside the session. Errors are logged, never sent to the peer.
pub async fn process_connection<S>(
    stream: S,
    peer: String,
    settings: &ConnectionSettings,
) -> TransportStats
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (read_half, write_half) = split(stream);
    let mut session = Session::new(
        LineReader::with_max_line_length(read_half, settings.max_line_length),
        ResponseWriter::new(write_half),
        SigningOracle::generate(),
        Arc::clone(&settings.globals),
        peer.clone(),
    );

    match session.serve().await {
        Ok(()) => debug!("[{}] client quit", peer),
        Err(ProtocolError::ConnectionClosed) => debug!("[{}] client hung up", peer),
        Err(e @ ProtocolError::LineTooLong { .. }) => warn!("[{}] {}", peer, e),
        Err(e) => debug!("[{}] session ended: {}", peer, e),
    }

    session.finish().await;
    let stats = session.stats();
    drop(session);

    info!("Closed {}", stats);
    stats
}

/// TCP front end of the toolbox
pub struct ToolboxServer {
    listener: TcpListener,
    local_addr: SocketAddr,
    settings: Arc<ConnectionSettings>,
}

impl ToolboxServer {
    /// Bind to the configured host and port
    pub async fn bind(config: &Config) -> ProtocolResult<Self> {
        config
            .validate()
            .map_err(|e| ProtocolError::ConfigError(e.to_string()))?;

        let listener =
            TcpListener::bind((config.server.host.as_str(), config.server.port)).await?;
        let local_addr = listener.local_addr()?;

        Ok(Self {
            listener,
            local_addr,
            settings: Arc::new(ConnectionSettings::from_config(config)),
        })
    }

    /// Get the local address
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Accept clients forever
    pub async fn run(self) -> ProtocolResult<()> {
        info!("Toolbox listening on {}", self.local_addr);

        loop {
            match self.listener.accept().await {
                Ok((stream, peer)) => {
                    info!("Connection from {}", peer);
                    if let Err(e) = stream.set_nodelay(true) {
                        debug!("[{}] set_nodelay: {}", peer, e);
                    }
                    let settings = Arc::clone(&self.settings);
                    tokio::spawn(async move {
                        process_connection(stream, peer.to_string(), &settings).await;
                    });
                }
                Err(e) => {
                    error!("Accept error: {}", e);
                }
            }
        }
    }
}
