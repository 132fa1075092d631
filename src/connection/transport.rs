// src/connection/transport.rs

//! The transport capability a session is composed with, and its TCP implementation.

use crate::core::{CommandResult, Completion};
use async_trait::async_trait;
use bytes::Bytes;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::sync::Mutex;

/// What a session needs from the thing that owns the socket.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Writes one encoded command in full.
    async fn write(&self, payload: Bytes) -> io::Result<()>;

    /// Closes the write side of the connection.
    async fn close(&self) -> io::Result<()>;

    fn is_open(&self) -> bool;

    /// The live peer address, or `None` once the channel is gone.
    fn remote_addr(&self) -> Option<SocketAddr>;

    /// The socket send buffer size, when the transport can report one.
    fn send_buffer_size(&self) -> Option<usize>;
}

/// A write job produced by the session's before-send hook: the command, its
/// encoded bytes, and the acknowledgement to resolve once the bytes are out.
#[derive(Debug)]
pub struct WriteMessage<C> {
    pub command: Arc<C>,
    pub payload: Bytes,
    ack: Completion<()>,
}

impl<C> WriteMessage<C> {
    pub(crate) fn new(command: Arc<C>, payload: Bytes, ack: Completion<()>) -> Self {
        Self {
            command,
            payload,
            ack,
        }
    }

    /// Resolves the command's write acknowledgement.
    pub fn complete_write(&self, result: CommandResult<()>) -> bool {
        self.ack.resolve(result)
    }
}

/// A [`Transport`] over the write half of a tokio `TcpStream`.
#[derive(Debug)]
pub struct TcpTransport {
    writer: Mutex<OwnedWriteHalf>,
    peer: SocketAddr,
    send_buffer_size: Option<usize>,
    open: AtomicBool,
}

impl TcpTransport {
    pub fn new(writer: OwnedWriteHalf, send_buffer_size: Option<usize>) -> io::Result<Self> {
        let peer = writer.peer_addr()?;
        Ok(Self {
            writer: Mutex::new(writer),
            peer,
            send_buffer_size,
            open: AtomicBool::new(true),
        })
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn write(&self, payload: Bytes) -> io::Result<()> {
        if !self.is_open() {
            return Err(io::Error::new(
                io::ErrorKind::NotConnected,
                "transport is closed",
            ));
        }
        let mut writer = self.writer.lock().await;
        let result: io::Result<()> = async {
            writer.write_all(&payload).await?;
            writer.flush().await
        }
        .await;
        if result.is_err() {
            self.open.store(false, Ordering::SeqCst);
        }
        result
    }

    async fn close(&self) -> io::Result<()> {
        if !self.open.swap(false, Ordering::SeqCst) {
            return Ok(());
        }
        self.writer.lock().await.shutdown().await
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    fn remote_addr(&self) -> Option<SocketAddr> {
        self.is_open().then_some(self.peer)
    }

    fn send_buffer_size(&self) -> Option<usize> {
        self.send_buffer_size
    }
}
