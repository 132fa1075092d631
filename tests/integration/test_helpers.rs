// tests/integration/test_helpers.rs

//! Test helpers and utilities for integration tests

use hsclient::config::ClientConfig;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing_subscriber::EnvFilter;

/// A line server that answers every request line with `0\t1\t<line>`.
///
/// If `answer_limit` is set, it stops answering after that many requests but
/// keeps the connection open until `hold_open` elapses, then closes it.
pub struct LineServer {
    pub addr: SocketAddr,
    pub handle: JoinHandle<()>,
}

impl LineServer {
    pub async fn start(answer_limit: Option<usize>, hold_open: Duration) -> Self {
        init_tracing();
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind test listener");
        let addr = listener.local_addr().unwrap();

        let handle = tokio::spawn(async move {
            let Ok((socket, _)) = listener.accept().await else {
                return;
            };
            let (read_half, mut write_half) = socket.into_split();
            let mut lines = BufReader::new(read_half).lines();
            let mut answered = 0usize;
            loop {
                let next = tokio::time::timeout(hold_open, lines.next_line()).await;
                let Ok(Ok(Some(line))) = next else {
                    break;
                };
                if answer_limit.is_some_and(|limit| answered >= limit) {
                    continue;
                }
                answered += 1;
                let reply = format!("0\t1\t{line}\n");
                if write_half.write_all(reply.as_bytes()).await.is_err() {
                    break;
                }
            }
        });

        Self { addr, handle }
    }
}

/// A client config pointing at `addr`.
pub fn config_for(addr: SocketAddr) -> ClientConfig {
    ClientConfig {
        host: addr.ip().to_string(),
        port: addr.port(),
        log_level: "warn".to_string(),
        ..ClientConfig::default()
    }
}

/// Initialize tracing (ignore error if already initialized)
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new("warn"))
        .with_test_writer()
        .try_init();
}
