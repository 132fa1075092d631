// src/config.rs

//! Manages client configuration: loading from TOML and validation.

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use std::fs;
use std::net::{SocketAddr, ToSocketAddrs};
use tracing::warn;

/// Settings for connecting to a server and running a pipelined session.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ClientConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// How long to wait for the TCP handshake, in milliseconds.
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// Initial capacity of the reader's receive buffer.
    #[serde(default = "default_read_buffer_size")]
    pub read_buffer_size: usize,
    /// Send buffer hint used when the transport cannot report the socket's own.
    #[serde(default = "default_send_buffer_size")]
    pub send_buffer_size: usize,
    /// Initial value of the advisory reconnect flag on new sessions.
    #[serde(default = "default_allow_reconnect")]
    pub allow_reconnect: bool,
    /// Longest response line the line demuxer accepts.
    #[serde(default = "default_max_line_length")]
    pub max_line_length: usize,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}
fn default_port() -> u16 {
    9998
}
fn default_connect_timeout_ms() -> u64 {
    2000
}
fn default_read_buffer_size() -> usize {
    4096
}
fn default_send_buffer_size() -> usize {
    8 * 1024
}
fn default_allow_reconnect() -> bool {
    true
}
fn default_max_line_length() -> usize {
    1024 * 1024 // 1 MiB
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            connect_timeout_ms: default_connect_timeout_ms(),
            read_buffer_size: default_read_buffer_size(),
            send_buffer_size: default_send_buffer_size(),
            allow_reconnect: default_allow_reconnect(),
            max_line_length: default_max_line_length(),
            log_level: default_log_level(),
        }
    }
}

impl ClientConfig {
    /// Creates a new `ClientConfig` by reading and parsing a TOML file.
    pub fn from_file(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file at '{path}'"))?;
        Self::from_toml(&contents).with_context(|| format!("Invalid config in '{path}'"))
    }

    /// Parses and validates configuration from a TOML string.
    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: ClientConfig = toml::from_str(contents).context("Failed to parse TOML")?;
        config.validate()?;
        Ok(config)
    }

    /// Resolves `host:port` to the first socket address it names.
    pub fn server_addr(&self) -> Result<SocketAddr> {
        (self.host.as_str(), self.port)
            .to_socket_addrs()
            .with_context(|| format!("Failed to resolve '{}:{}'", self.host, self.port))?
            .next()
            .ok_or_else(|| anyhow!("'{}:{}' resolved to no addresses", self.host, self.port))
    }

    /// Validates the configuration to ensure logical consistency.
    pub fn validate(&self) -> Result<()> {
        if self.port == 0 {
            return Err(anyhow!("port cannot be 0"));
        }
        if self.host.trim().is_empty() {
            return Err(anyhow!("host cannot be empty"));
        }
        if self.connect_timeout_ms == 0 {
            return Err(anyhow!("connect_timeout_ms cannot be 0"));
        }
        if self.read_buffer_size == 0 {
            return Err(anyhow!("read_buffer_size cannot be 0"));
        }
        if self.send_buffer_size == 0 {
            return Err(anyhow!("send_buffer_size cannot be 0"));
        }
        if self.max_line_length == 0 {
            return Err(anyhow!("max_line_length cannot be 0"));
        }

        if self.read_buffer_size < 512 {
            warn!(
                "low read_buffer_size setting: {} bytes. This may cause many small reads.",
                self.read_buffer_size
            );
        }
        Ok(())
    }
}
