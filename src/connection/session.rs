// src/connection/session.rs

//! Defines `PipelineSession`, which correlates pipelined requests with the
//! responses that come back on the same connection.

use super::inflight::{InFlight, Take};
use super::transport::{Transport, WriteMessage};
use crate::config::ClientConfig;
use crate::core::{Command, Completion, HsClientError, metrics};
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::sync::{Mutex, broadcast};
use tracing::{debug, info, warn};

/// Reason used when the transport reports a close without saying why.
pub const DEFAULT_CLOSE_REASON: &str = "Connection has been closed";
/// Reason used by [`PipelineSession::close`].
pub const LOCAL_CLOSE_REASON: &str = "Connection closed locally";
/// Reason used when a `send` is dropped after queueing but before its write
/// finished.
pub const SEND_CANCELLED_REASON: &str = "Send cancelled";

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

/// The per-connection correlation engine.
///
/// Producers call [`send`](Self::send) from any task; exactly one reader task
/// calls [`take_next_as_current`](Self::take_next_as_current) to learn which
/// command the next response belongs to. [`shutdown`](Self::shutdown) may run
/// from anywhere and fails whatever is still outstanding.
pub struct PipelineSession<C: Command, T: Transport> {
    id: u64,
    transport: Arc<T>,
    in_flight: InFlight<C>,
    /// Serialises enqueue + write so wire order always equals queue order.
    write_lock: Mutex<()>,
    /// Captured at construction so the peer stays known after teardown.
    cached_remote_addr: Option<SocketAddr>,
    send_buffer_size: usize,
    allow_reconnect: AtomicBool,
}

impl<C: Command, T: Transport> PipelineSession<C, T> {
    /// Creates a session on top of an already connected transport.
    pub fn new(transport: Arc<T>, config: &ClientConfig) -> Self {
        let id = NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed);
        let cached_remote_addr = transport.remote_addr();
        let send_buffer_size = transport
            .send_buffer_size()
            .unwrap_or(config.send_buffer_size);

        metrics::OPEN_SESSIONS.inc();
        info!(
            "Session {} opened to {}.",
            id,
            cached_remote_addr.map_or_else(|| "unknown".to_string(), |a| a.to_string())
        );

        Self {
            id,
            transport,
            in_flight: InFlight::new(),
            write_lock: Mutex::new(()),
            cached_remote_addr,
            send_buffer_size,
            allow_reconnect: AtomicBool::new(config.allow_reconnect),
        }
    }

    /// The before-send hook: encodes the command and attaches the write
    /// acknowledgement the transport will resolve. Does not touch the queue.
    pub fn dispatch(&self, command: Arc<C>) -> WriteMessage<C> {
        let payload = command.encode();
        let (ack, ack_rx) = Completion::new();
        command.attach_write_ack(ack_rx);
        debug!("Session {}: After encoding {:?}", self.id, command);
        WriteMessage::new(command, payload, ack)
    }

    /// Appends a dispatched command to the pending queue. A session that has
    /// already shut down fails the command on the spot and returns `false`.
    pub fn enqueue_sent(&self, command: Arc<C>) -> bool {
        match self.in_flight.push(command) {
            Ok(()) => true,
            Err(command) => {
                debug!(
                    "Session {}: Rejecting {:?}, session is closed.",
                    self.id, command
                );
                command.fail(HsClientError::ConnectionClosed(
                    DEFAULT_CLOSE_REASON.to_string(),
                ));
                false
            }
        }
    }

    /// Dispatches, enqueues and writes a command.
    ///
    /// The command is queued before its bytes leave, so no response can be
    /// demuxed ahead of it. If the write fails the session shuts down, which
    /// fails this command along with everything else in flight.
    ///
    /// Dropping the returned future after the command was queued but before
    /// the write finished shuts the session down with
    /// [`SEND_CANCELLED_REASON`]: the queue may hold a command whose bytes
    /// never (fully) reached the peer.
    pub async fn send(&self, command: Arc<C>) -> Result<(), HsClientError> {
        let _write_guard = self.write_lock.lock().await;

        let message = self.dispatch(command);
        if !self.enqueue_sent(message.command.clone()) {
            let err = HsClientError::ConnectionClosed(DEFAULT_CLOSE_REASON.to_string());
            message.complete_write(Err(err.clone()));
            return Err(err);
        }

        let mut cancel_guard = CancelGuard {
            session: self,
            armed: true,
        };
        let written = self.transport.write(message.payload.clone()).await;
        cancel_guard.armed = false;

        match written {
            Ok(()) => {
                metrics::COMMANDS_SENT_TOTAL.inc();
                message.complete_write(Ok(()));
                Ok(())
            }
            Err(e) => {
                let err = HsClientError::from(e);
                warn!("Session {}: Write failed: {}", self.id, err);
                message.complete_write(Err(err.clone()));
                self.shutdown(&err.to_string());
                Err(err)
            }
        }
    }

    /// Waits for the oldest pending command and makes it the current one.
    ///
    /// Returns `None` if the session shut down while waiting; the reader should
    /// treat that as its signal to stop.
    pub async fn take_next_as_current(&self) -> Option<Arc<C>> {
        match self.in_flight.take_next_as_current().await {
            Take::Ready(command) => {
                debug!("Session {}: Now demuxing {:?}", self.id, command);
                Some(command)
            }
            Take::Closed => None,
        }
    }

    /// Like [`take_next_as_current`](Self::take_next_as_current), but also gives
    /// up when `interrupt` fires. A closed channel (every sender dropped)
    /// counts as firing.
    pub async fn take_next_as_current_or_interrupt(
        &self,
        interrupt: &mut broadcast::Receiver<()>,
    ) -> Option<Arc<C>> {
        tokio::select! {
            biased;
            _ = interrupt.recv() => {
                debug!("Session {}: Wait for next command interrupted.", self.id);
                None
            }
            command = self.take_next_as_current() => command,
        }
    }

    /// Returns the current command without dequeuing.
    pub fn current_command(&self) -> Option<Arc<C>> {
        self.in_flight.current()
    }

    /// Re-arms or clears the current slot. A session that has already shut
    /// down fails the command instead and returns `false`.
    pub fn set_current_command(&self, command: Option<Arc<C>>) -> bool {
        match self.in_flight.set_current(command) {
            Ok(()) => true,
            Err(command) => {
                debug!(
                    "Session {}: Not re-arming {:?}, session is closed.",
                    self.id, command
                );
                command.fail(HsClientError::ConnectionClosed(
                    DEFAULT_CLOSE_REASON.to_string(),
                ));
                false
            }
        }
    }

    /// Fails every command still in flight with `ConnectionClosed(reason)`.
    ///
    /// The current command goes first, then the queue in FIFO order. Commands
    /// that the reader already completed are skipped by the completion guard.
    /// Returns how many commands this call actually failed. Calling it again
    /// is a no-op.
    pub fn shutdown(&self, reason: &str) -> usize {
        let drained = self.in_flight.close_and_drain();
        if drained.newly_closed {
            metrics::OPEN_SESSIONS.dec();
            metrics::SESSIONS_CLOSED_TOTAL.inc();
            info!("Session {} to {} shut down: {}", self.id, self, reason);
        } else if drained.is_empty() {
            debug!(
                "Session {}: Shutdown ({}) found nothing outstanding.",
                self.id, reason
            );
            return 0;
        }

        let failed = drained
            .current
            .into_iter()
            .chain(drained.pending)
            .filter(|command| command.fail(HsClientError::ConnectionClosed(reason.to_string())))
            .count();

        metrics::COMMANDS_FAILED_ON_CLOSE_TOTAL.inc_by(failed as f64);
        if failed > 0 {
            warn!(
                "Session {}: Failed {} in-flight command(s): {}",
                self.id, failed, reason
            );
        }
        failed
    }

    /// The transport's connection-closed hook.
    pub fn on_closed(&self, reason: Option<&str>) {
        self.shutdown(reason.unwrap_or(DEFAULT_CLOSE_REASON));
    }

    /// Closes the session locally: fails everything outstanding and closes the
    /// transport.
    pub async fn close(&self) -> Result<(), HsClientError> {
        self.shutdown(LOCAL_CLOSE_REASON);
        self.transport.close().await.map_err(|e| {
            warn!("Session {}: Error closing transport: {}", self.id, e);
            HsClientError::from(e)
        })
    }

    /// The live peer address, falling back to the one seen at construction.
    pub fn remote_addr(&self) -> Option<SocketAddr> {
        if self.transport.is_open()
            && let Some(addr) = self.transport.remote_addr()
        {
            return Some(addr);
        }
        self.cached_remote_addr
    }

    /// Whether an external reconnection policy may reconnect this session.
    pub fn allow_reconnect(&self) -> bool {
        self.allow_reconnect.load(Ordering::SeqCst)
    }

    pub fn set_allow_reconnect(&self, allow: bool) {
        self.allow_reconnect.store(allow, Ordering::SeqCst);
    }

    pub fn send_buffer_size(&self) -> usize {
        self.send_buffer_size
    }

    pub fn pending_len(&self) -> usize {
        self.in_flight.pending_len()
    }

    pub fn is_closed(&self) -> bool {
        self.in_flight.is_closed()
    }

    /// Resolves once the session has been shut down.
    pub async fn closed(&self) {
        self.in_flight.wait_closed().await
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn transport(&self) -> &Arc<T> {
        &self.transport
    }
}

/// Armed while a `send` is between queueing its command and finishing the
/// write.
struct CancelGuard<'a, C: Command, T: Transport> {
    session: &'a PipelineSession<C, T>,
    armed: bool,
}

impl<C: Command, T: Transport> Drop for CancelGuard<'_, C, T> {
    fn drop(&mut self) {
        if self.armed {
            warn!(
                "Session {}: Send cancelled mid-write, shutting down.",
                self.session.id
            );
            self.session.shutdown(SEND_CANCELLED_REASON);
        }
    }
}

impl<C: Command, T: Transport> Drop for PipelineSession<C, T> {
    fn drop(&mut self) {
        self.shutdown("Session dropped");
    }
}

impl<C: Command, T: Transport> fmt::Display for PipelineSession<C, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.remote_addr() {
            Some(addr) => write!(f, "{}:{}", addr.ip(), addr.port()),
            None => f.write_str("unknown"),
        }
    }
}

impl<C: Command, T: Transport> fmt::Debug for PipelineSession<C, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineSession")
            .field("id", &self.id)
            .field("remote_addr", &self.remote_addr())
            .field("pending", &self.pending_len())
            .field("closed", &self.is_closed())
            .finish()
    }
}
