// src/core/mod.rs

//! The command contract, error type and metrics shared by every session.

pub mod command;
pub mod errors;
pub mod metrics;

pub use command::{Command, CommandResult, Completion, RawCommand, ResponseFuture, WriteAck};
pub use errors::HsClientError;
