// src/main.rs

//! `hsclient`: pipes request lines from stdin to a server over one pipelined
//! session and prints the responses in request order.

use anyhow::{Context, Result};
use futures::StreamExt;
use futures::stream::FuturesOrdered;
use hsclient::config::ClientConfig;
use hsclient::core::metrics;
use hsclient::{RawCommand, connect};
use std::env;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info};
use tracing_subscriber::filter::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    run_app().await
}

async fn run_app() -> Result<()> {
    const VERSION: &str = env!("CARGO_PKG_VERSION");

    let args: Vec<String> = env::args().collect();

    if args.contains(&"--version".to_string()) {
        println!("hsclient version {VERSION}");
        return Ok(());
    }

    // Load the configuration from --config if given; otherwise use defaults.
    let mut config = match args
        .iter()
        .position(|arg| arg == "--config")
        .and_then(|i| args.get(i + 1))
    {
        Some(path) => match ClientConfig::from_file(path) {
            Ok(cfg) => cfg,
            Err(e) => {
                eprintln!("Failed to load configuration from \"{path}\": {e:#}");
                std::process::exit(1);
            }
        },
        None => ClientConfig::default(),
    };

    // Override host and port if --addr host:port is provided.
    if let Some(i) = args.iter().position(|arg| arg == "--addr") {
        let Some((host, port)) = args.get(i + 1).and_then(|a| a.rsplit_once(':')) else {
            eprintln!("--addr flag requires a value of the form host:port");
            std::process::exit(1);
        };
        match port.parse::<u16>() {
            Ok(port) => {
                config.host = host.to_string();
                config.port = port;
            }
            Err(_) => {
                eprintln!("Invalid port number: {port}");
                std::process::exit(1);
            }
        }
    }

    // RUST_LOG takes precedence over the configured level.
    let log_level = env::var("RUST_LOG").unwrap_or_else(|_| config.log_level.clone());
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(log_level))
        .compact()
        .with_ansi(true)
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = pipe_stdin(&config).await {
        error!("hsclient error: {:#}", e);
        return Err(e);
    }

    if args.contains(&"--metrics".to_string()) {
        eprint!("{}", metrics::gather_metrics());
    }
    Ok(())
}

/// Sends every stdin line as one command, then prints each response as it
/// resolves, in the order the lines were read.
async fn pipe_stdin(config: &ClientConfig) -> Result<()> {
    let addr = config.server_addr()?;
    let connection = connect(addr, config)
        .await
        .with_context(|| format!("Failed to connect to {addr}"))?;
    info!("Piping stdin to {}.", connection.session);

    let mut responses = FuturesOrdered::new();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        if line.is_empty() {
            continue;
        }
        let command = Arc::new(RawCommand::new(format!("{line}\n")));
        if let Some(response) = command.response() {
            responses.push_back(response);
        }
        // A failed send has already failed the command, so its error shows up
        // in order with the rest.
        if connection.send(command).await.is_err() {
            break;
        }
    }

    while let Some(response) = responses.next().await {
        match response {
            Ok(frame) => println!("{}", String::from_utf8_lossy(&frame)),
            Err(e) => println!("ERR {e}"),
        }
    }

    connection.close().await?;
    Ok(())
}
