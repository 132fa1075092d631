// src/core/errors.rs

//! Defines the primary error type for the client session layer.

use std::sync::Arc;
use thiserror::Error;
use tokio_util::codec::LinesCodecError;

/// The main error enum, representing every failure a pipelined session can
/// hand back to a caller.
#[derive(Error, Debug)]
pub enum HsClientError {
    /// The connection went away while the command was queued or being demuxed,
    /// or the command was sent on a session that was already closed.
    #[error("Connection closed: {0}")]
    ConnectionClosed(String),

    #[error("IO Error: {0}")]
    Io(Arc<std::io::Error>),

    /// The response stream could not be matched against the pending command.
    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl HsClientError {
    /// Returns true if this error reports a closed connection.
    pub fn is_connection_closed(&self) -> bool {
        matches!(self, HsClientError::ConnectionClosed(_))
    }
}

// Manual implementation of Clone because `std::io::Error` is not cloneable.
// We wrap it in an Arc to allow for cheap, shared cloning.
impl Clone for HsClientError {
    fn clone(&self) -> Self {
        match self {
            HsClientError::ConnectionClosed(s) => HsClientError::ConnectionClosed(s.clone()),
            HsClientError::Io(e) => HsClientError::Io(Arc::clone(e)),
            HsClientError::Protocol(s) => HsClientError::Protocol(s.clone()),
            HsClientError::Timeout(s) => HsClientError::Timeout(s.clone()),
            HsClientError::Internal(s) => HsClientError::Internal(s.clone()),
        }
    }
}

impl PartialEq for HsClientError {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (HsClientError::ConnectionClosed(s1), HsClientError::ConnectionClosed(s2)) => s1 == s2,
            (HsClientError::Io(e1), HsClientError::Io(e2)) => {
                e1.kind() == e2.kind() && e1.to_string() == e2.to_string()
            }
            (HsClientError::Protocol(s1), HsClientError::Protocol(s2)) => s1 == s2,
            (HsClientError::Timeout(s1), HsClientError::Timeout(s2)) => s1 == s2,
            (HsClientError::Internal(s1), HsClientError::Internal(s2)) => s1 == s2,
            _ => false,
        }
    }
}

// --- From trait implementations for easy error conversion ---

impl From<std::io::Error> for HsClientError {
    fn from(e: std::io::Error) -> Self {
        HsClientError::Io(Arc::new(e))
    }
}

impl From<LinesCodecError> for HsClientError {
    fn from(e: LinesCodecError) -> Self {
        match e {
            LinesCodecError::Io(io) => HsClientError::from(io),
            LinesCodecError::MaxLineLengthExceeded => {
                HsClientError::Protocol("response line exceeds the maximum length".to_string())
            }
        }
    }
}
