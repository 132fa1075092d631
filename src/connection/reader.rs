// src/connection/reader.rs

//! The receive side of a session: reads response bytes and matches them, in
//! order, against the commands waiting in the session.

use super::session::PipelineSession;
use super::transport::Transport;
use crate::core::{Command, HsClientError, RawCommand};
use bytes::{Bytes, BytesMut};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::broadcast;
use tokio_util::codec::{Decoder, LinesCodec};
use tracing::{debug, warn};

/// Reason reported to in-flight commands when the peer closes the stream.
pub const PEER_CLOSED_REASON: &str = "Connection closed by peer";
const READER_STOPPED_REASON: &str = "Reader stopped";

/// Turns response bytes into a completed command.
///
/// `feed` consumes whatever part of `buf` belongs to `command`. It returns
/// `Ok(true)` once the command has its full response and has been resolved,
/// or `Ok(false)` when more bytes are needed; the reader then keeps the same
/// command current for the next read.
pub trait Demuxer<C>: Send {
    fn feed(&mut self, command: &C, buf: &mut BytesMut) -> Result<bool, HsClientError>;
}

/// Resolves a [`RawCommand`] with one newline-terminated response line.
#[derive(Debug)]
pub struct LineDemuxer {
    codec: LinesCodec,
}

impl LineDemuxer {
    pub fn new(max_line_length: usize) -> Self {
        Self {
            codec: LinesCodec::new_with_max_length(max_line_length),
        }
    }
}

impl Demuxer<RawCommand> for LineDemuxer {
    fn feed(&mut self, command: &RawCommand, buf: &mut BytesMut) -> Result<bool, HsClientError> {
        match self.codec.decode(buf)? {
            Some(line) => {
                command.complete(Bytes::from(line));
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

/// Runs until the stream ends, a demux error occurs, the session is shut down
/// elsewhere, or `shutdown_rx` fires. Every exit path leaves the session shut
/// down, so nothing is left waiting.
pub async fn run_reader<C, T, R, D>(
    session: Arc<PipelineSession<C, T>>,
    mut reader: R,
    mut demuxer: D,
    read_buffer_size: usize,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), HsClientError>
where
    C: Command,
    T: Transport,
    R: AsyncRead + Unpin + Send,
    D: Demuxer<C>,
{
    let mut buf = BytesMut::with_capacity(read_buffer_size);
    loop {
        buf.reserve(read_buffer_size);
        let read = tokio::select! {
            biased;
            _ = shutdown_rx.recv() => {
                debug!("Session {}: Reader received shutdown signal.", session.id());
                session.shutdown(READER_STOPPED_REASON);
                return Ok(());
            }
            _ = session.closed() => {
                debug!("Session {}: Closed, reader exiting.", session.id());
                return Ok(());
            }
            read = reader.read_buf(&mut buf) => read,
        };

        match read {
            Ok(0) => {
                debug!("Session {}: {}", session.id(), PEER_CLOSED_REASON);
                session.on_closed(Some(PEER_CLOSED_REASON));
                return Ok(());
            }
            Ok(_) => match demux_buffered(&session, &mut demuxer, &mut buf, &mut shutdown_rx).await
            {
                Ok(true) => {}
                Ok(false) => {
                    session.shutdown(READER_STOPPED_REASON);
                    return Ok(());
                }
                Err(e) => {
                    warn!("Session {}: Demux failed: {}", session.id(), e);
                    session.shutdown(&e.to_string());
                    return Err(e);
                }
            },
            Err(e) => {
                let err = HsClientError::from(e);
                warn!("Session {}: Read failed: {}", session.id(), err);
                session.shutdown(&err.to_string());
                return Err(err);
            }
        }
    }
}

/// Feeds buffered bytes to commands until the buffer runs dry or a response is
/// incomplete. Returns `Ok(false)` when the reader should stop: the session
/// closed or `shutdown_rx` fired while waiting for a command.
async fn demux_buffered<C, T, D>(
    session: &PipelineSession<C, T>,
    demuxer: &mut D,
    buf: &mut BytesMut,
    shutdown_rx: &mut broadcast::Receiver<()>,
) -> Result<bool, HsClientError>
where
    C: Command,
    T: Transport,
    D: Demuxer<C>,
{
    while !buf.is_empty() {
        let command = match session.current_command() {
            // A partially answered command stays current across reads.
            Some(current) if !current.is_resolved() => current,
            // Requests are queued before their bytes are written, so a response
            // never has to wait here for long.
            _ => match session.take_next_as_current_or_interrupt(shutdown_rx).await {
                Some(next) => next,
                None => return Ok(false),
            },
        };

        if !demuxer.feed(&command, buf)? {
            break;
        }
    }
    Ok(true)
}
