// src/core/metrics.rs

//! Defines and registers Prometheus metrics for pipelined sessions.
//!
//! This module uses `lazy_static` to ensure that metrics are registered only once
//! globally for the entire application lifecycle.

use lazy_static::lazy_static;
use prometheus::{Counter, Gauge, TextEncoder, register_counter, register_gauge};

lazy_static! {
    /// The number of sessions that have been opened and not yet shut down.
    pub static ref OPEN_SESSIONS: Gauge =
        register_gauge!("hsclient_open_sessions", "Number of currently open pipelined sessions.").unwrap();

    /// The total number of commands written to a transport.
    pub static ref COMMANDS_SENT_TOTAL: Counter =
        register_counter!("hsclient_commands_sent_total", "Total number of commands sent.").unwrap();
    /// The total number of in-flight commands failed because their connection closed.
    pub static ref COMMANDS_FAILED_ON_CLOSE_TOTAL: Counter =
        register_counter!("hsclient_commands_failed_on_close_total", "Total number of commands failed by a session shutdown.").unwrap();
    /// The total number of sessions that have been shut down.
    pub static ref SESSIONS_CLOSED_TOTAL: Counter =
        register_counter!("hsclient_sessions_closed_total", "Total number of sessions shut down.").unwrap();
}

/// Gathers all registered metrics and encodes them in the Prometheus text format.
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    encoder
        .encode_to_string(&metric_families)
        .unwrap_or_default()
}
