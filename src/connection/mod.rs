// src/connection/mod.rs

//! Manages a single pipelined connection to a server: correlating sent commands
//! with their responses, the transport they travel over, and the reader task
//! that demultiplexes responses.

// Declare the sub-modules of the `connection` module.
mod connect;
mod inflight;
mod reader;
mod session;
mod transport;

// Publicly re-export the primary types from the sub-modules.
// This creates a clean public API for the `connection` module, hiding the
// internal file structure from the rest of the crate.
pub use connect::{Connection, LineSession, connect};
pub use reader::{Demuxer, LineDemuxer, PEER_CLOSED_REASON, run_reader};
pub use session::{
    DEFAULT_CLOSE_REASON, LOCAL_CLOSE_REASON, PipelineSession, SEND_CANCELLED_REASON,
};
pub use transport::{TcpTransport, Transport, WriteMessage};
