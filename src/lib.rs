// src/lib.rs

pub mod config;
pub mod connection;
pub mod core;

// Re-export
pub use crate::connection::{Connection, PipelineSession, connect};
pub use crate::core::{Command, HsClientError, RawCommand};
