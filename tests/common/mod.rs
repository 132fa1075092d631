// tests/common/mod.rs

//! Shared helpers for session tests: an in-memory transport and session builders.

#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use hsclient::config::ClientConfig;
use hsclient::connection::{PipelineSession, Transport};
use hsclient::core::RawCommand;
use parking_lot::Mutex;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing_subscriber::EnvFilter;

pub type FakeSession = PipelineSession<RawCommand, FakeTransport>;

/// A transport that records what it was asked to write.
#[derive(Debug)]
pub struct FakeTransport {
    addr: SocketAddr,
    send_buffer_size: Option<usize>,
    open: AtomicBool,
    fail_writes: AtomicBool,
    stall_writes: AtomicBool,
    writes: Mutex<Vec<Bytes>>,
}

impl FakeTransport {
    pub fn new(addr: &str) -> Self {
        Self {
            addr: addr.parse().expect("valid socket address"),
            send_buffer_size: None,
            open: AtomicBool::new(true),
            fail_writes: AtomicBool::new(false),
            stall_writes: AtomicBool::new(false),
            writes: Mutex::new(Vec::new()),
        }
    }

    pub fn with_send_buffer_size(mut self, size: usize) -> Self {
        self.send_buffer_size = Some(size);
        self
    }

    /// Simulates the channel going away underneath the session.
    pub fn tear_down(&self) {
        self.open.store(false, Ordering::SeqCst);
    }

    pub fn fail_next_writes(&self) {
        self.fail_writes.store(true, Ordering::SeqCst);
    }

    /// Makes every following write hang forever.
    pub fn stall_next_writes(&self) {
        self.stall_writes.store(true, Ordering::SeqCst);
    }

    pub fn writes(&self) -> Vec<Bytes> {
        self.writes.lock().clone()
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn write(&self, payload: Bytes) -> io::Result<()> {
        // Give other producers a chance to interleave.
        tokio::task::yield_now().await;
        if self.stall_writes.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "broken pipe"));
        }
        self.writes.lock().push(payload);
        Ok(())
    }

    async fn close(&self) -> io::Result<()> {
        self.tear_down();
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    fn remote_addr(&self) -> Option<SocketAddr> {
        self.is_open().then_some(self.addr)
    }

    fn send_buffer_size(&self) -> Option<usize> {
        self.send_buffer_size
    }
}

/// Sets up minimal tracing for tests (ignores the error if already initialized).
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new("warn"))
        .with_test_writer()
        .try_init();
}

pub fn new_session() -> (Arc<FakeSession>, Arc<FakeTransport>) {
    init_tracing();
    let transport = Arc::new(FakeTransport::new("10.0.0.7:9998"));
    let session = Arc::new(FakeSession::new(transport.clone(), &ClientConfig::default()));
    (session, transport)
}

pub fn raw(line: &str) -> Arc<RawCommand> {
    Arc::new(RawCommand::new(format!("{line}\n")))
}
