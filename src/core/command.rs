// src/core/command.rs

//! The contract a request must satisfy to be pipelined through a session, plus
//! the one-shot completion primitives commands are built from.
//!
//! # Exactly-once resolution
//!
//! A command can be resolved from two places at once: the reader task that
//! decoded its response, and a shutdown that is failing everything still in
//! flight. Both paths go through [`Completion::resolve`], which `take()`s the
//! sender out of a mutex-guarded `Option`. Whoever takes it wins; the loser
//! sees `None` and does nothing. This is the only guard needed, so the session
//! never has to lock a command while it is being completed.

use crate::core::HsClientError;
use bytes::Bytes;
use parking_lot::Mutex;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::task::{Context, Poll};
use tokio::sync::oneshot;

/// The outcome delivered to whoever waits on a command.
pub type CommandResult<T> = Result<T, HsClientError>;

/// The operations a session needs from a request it pipelines.
///
/// Success resolution is command-specific and is driven by the decoder
/// (see [`crate::connection::Demuxer`]), so it is not part of this trait.
pub trait Command: fmt::Debug + Send + Sync + 'static {
    /// Produces the wire form of the command. Must be idempotent: calling it
    /// again returns the same bytes.
    fn encode(&self) -> Bytes;

    /// Hands the command the acknowledgement the transport resolves once the
    /// encoded bytes have been written.
    fn attach_write_ack(&self, ack: WriteAck);

    /// Fails the command. Returns `false` if it was already resolved.
    fn fail(&self, error: HsClientError) -> bool;

    /// Returns true once the command has been completed or failed.
    fn is_resolved(&self) -> bool;
}

/// The sending half of a one-shot result. Resolving is guarded so that only the
/// first call delivers anything.
pub struct Completion<T> {
    tx: Mutex<Option<oneshot::Sender<CommandResult<T>>>>,
}

impl<T> Completion<T> {
    /// Creates a linked completion and the future its waiter awaits.
    pub fn new() -> (Self, ResponseFuture<T>) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                tx: Mutex::new(Some(tx)),
            },
            ResponseFuture { rx },
        )
    }

    /// Delivers `result` if nothing was delivered yet. Returns whether this call
    /// won. A waiter that has gone away still counts as resolved.
    pub fn resolve(&self, result: CommandResult<T>) -> bool {
        let Some(tx) = self.tx.lock().take() else {
            return false;
        };
        let _ = tx.send(result);
        true
    }

    pub fn is_resolved(&self) -> bool {
        self.tx.lock().is_none()
    }
}

impl<T> fmt::Debug for Completion<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Completion")
            .field("resolved", &self.is_resolved())
            .finish()
    }
}

/// The waiting half of a [`Completion`].
#[derive(Debug)]
pub struct ResponseFuture<T> {
    rx: oneshot::Receiver<CommandResult<T>>,
}

impl<T> Future for ResponseFuture<T> {
    type Output = CommandResult<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx).poll(cx).map(|received| {
            received.unwrap_or_else(|_| {
                Err(HsClientError::ConnectionClosed(
                    "command dropped before it was resolved".to_string(),
                ))
            })
        })
    }
}

/// Resolves once the transport has written (or failed to write) a command.
pub type WriteAck = ResponseFuture<()>;

/// A command whose wire form is already known. It resolves with the raw
/// response frame handed to it by the demuxer.
pub struct RawCommand {
    payload: Bytes,
    encode_calls: AtomicUsize,
    completion: Completion<Bytes>,
    response: Mutex<Option<ResponseFuture<Bytes>>>,
    write_ack: Mutex<Option<WriteAck>>,
}

impl RawCommand {
    pub fn new(payload: impl Into<Bytes>) -> Self {
        let (completion, response) = Completion::new();
        Self {
            payload: payload.into(),
            encode_calls: AtomicUsize::new(0),
            completion,
            response: Mutex::new(Some(response)),
            write_ack: Mutex::new(None),
        }
    }

    /// Takes the future that yields this command's response. Only the first
    /// call gets it.
    pub fn response(&self) -> Option<ResponseFuture<Bytes>> {
        self.response.lock().take()
    }

    /// Takes the write acknowledgement attached at dispatch time, if any.
    pub fn take_write_ack(&self) -> Option<WriteAck> {
        self.write_ack.lock().take()
    }

    /// Completes the command with its response frame.
    pub fn complete(&self, frame: Bytes) -> bool {
        self.completion.resolve(Ok(frame))
    }

    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    /// How many times the session asked for the encoded form.
    pub fn encode_calls(&self) -> usize {
        self.encode_calls.load(Ordering::Relaxed)
    }
}

impl Command for RawCommand {
    fn encode(&self) -> Bytes {
        self.encode_calls.fetch_add(1, Ordering::Relaxed);
        // Cloning `Bytes` shares the buffer, so repeated encodes are free.
        self.payload.clone()
    }

    fn attach_write_ack(&self, ack: WriteAck) {
        *self.write_ack.lock() = Some(ack);
    }

    fn fail(&self, error: HsClientError) -> bool {
        self.completion.resolve(Err(error))
    }

    fn is_resolved(&self) -> bool {
        self.completion.is_resolved()
    }
}

impl fmt::Debug for RawCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawCommand")
            .field("payload", &String::from_utf8_lossy(&self.payload))
            .field("resolved", &self.is_resolved())
            .finish()
    }
}
