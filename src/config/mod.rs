//! Configuration for the sockspipe server binary
//!
//! The library itself is configured programmatically through the builders
//! on [`Server`](crate::server::Server) and [`Client`](crate::client::Client);
//! this module maps a TOML file onto those builders for the CLI.

use crate::protocol::consts::MAX_UDP_DATAGRAM;
use crate::server::DEFAULT_LISTEN_ADDR;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

/// Top-level configuration file
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Server settings
    #[serde(default)]
    pub server: ServerConfig,
}

/// Settings for the SOCKS5 server
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Listen address; `:1080` binds every interface on port 1080
    pub listen: String,
    /// Username for password authentication; requires `password`
    pub username: Option<String>,
    /// Password for password authentication; requires `username`
    pub password: Option<String>,
    /// Handshake deadline in seconds; 0 disables it
    pub timeout_secs: u64,
    /// Buffer size for UDP association datagrams
    pub udp_buffer: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            listen: DEFAULT_LISTEN_ADDR.to_string(),
            username: None,
            password: None,
            timeout_secs: 0,
            udp_buffer: MAX_UDP_DATAGRAM,
        }
    }
}

impl ServerConfig {
    /// Check cross-field consistency
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.username.is_some() != self.password.is_some() {
            return Err("username and password must be configured together".to_string());
        }
        if self.udp_buffer == 0 {
            return Err("udp_buffer must be greater than zero".to_string());
        }
        Ok(())
    }

    /// The configured credentials, when both are present
    pub fn credentials(&self) -> Option<(&str, &str)> {
        match (&self.username, &self.password) {
            (Some(user), Some(pass)) => Some((user, pass)),
            _ => None,
        }
    }
}

/// Load configuration from a TOML file
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config> {
    let content = std::fs::read_to_string(path.as_ref())
        .with_context(|| format!("failed to read config file: {:?}", path.as_ref()))?;
    parse_config(&content)
}

/// Parse configuration from a TOML string
pub fn parse_config(content: &str) -> Result<Config> {
    toml::from_str(content).with_context(|| "failed to parse configuration")
}
