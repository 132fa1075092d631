// src/connection/connect.rs

//! Opens a TCP connection and wires a session, its transport and its reader
//! task together.

use super::reader::{LineDemuxer, run_reader};
use super::session::PipelineSession;
use super::transport::TcpTransport;
use crate::config::ClientConfig;
use crate::core::{HsClientError, RawCommand};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// A session over TCP whose responses are newline-terminated lines.
pub type LineSession = PipelineSession<RawCommand, TcpTransport>;

/// A live connection: the session plus the reader task feeding it.
///
/// Dropping a `Connection` without calling [`close`](Self::close) drops the
/// reader's shutdown sender, which stops the reader and shuts the session down
/// even if clones of `session` are still held elsewhere.
#[derive(Debug)]
pub struct Connection {
    pub session: Arc<LineSession>,
    shutdown_tx: broadcast::Sender<()>,
    reader: JoinHandle<Result<(), HsClientError>>,
}

impl Connection {
    /// Sends a command and returns once it is on the wire.
    pub async fn send(&self, command: Arc<RawCommand>) -> Result<(), HsClientError> {
        self.session.send(command).await
    }

    /// Stops the reader, fails anything outstanding and closes the socket.
    pub async fn close(self) -> Result<(), HsClientError> {
        let close_result = self.session.close().await;
        // The reader may already be gone, in which case there is nobody to tell.
        let _ = self.shutdown_tx.send(());
        match self.reader.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => debug!("Reader for session {} ended with: {}", self.session.id(), e),
            Err(e) => {
                return Err(HsClientError::Internal(format!("reader task failed: {e}")));
            }
        }
        close_result
    }
}

/// Connects to `addr` and starts the reader task.
pub async fn connect(addr: SocketAddr, config: &ClientConfig) -> Result<Connection, HsClientError> {
    let timeout = Duration::from_millis(config.connect_timeout_ms);
    let stream = tokio::time::timeout(timeout, TcpStream::connect(addr))
        .await
        .map_err(|_| HsClientError::Timeout(format!("connecting to {addr} after {timeout:?}")))??;
    stream.set_nodelay(true)?;

    let (read_half, write_half) = stream.into_split();
    // tokio does not expose SO_SNDBUF on a split stream, so the session falls
    // back to the configured hint.
    let transport = Arc::new(TcpTransport::new(write_half, None)?);
    let session = Arc::new(LineSession::new(transport, config));
    info!("Connected to {} (session {}).", addr, session.id());

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let reader = tokio::spawn(run_reader(
        session.clone(),
        read_half,
        LineDemuxer::new(config.max_line_length),
        config.read_buffer_size,
        shutdown_rx,
    ));

    Ok(Connection {
        session,
        shutdown_tx,
        reader,
    })
}
