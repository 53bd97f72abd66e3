//! # sockspipe - a SOCKS5 client and server toolkit
//!
//! sockspipe implements both sides of the SOCKS5 proxy protocol (RFC 1928)
//! with the "no authentication" and username/password (RFC 1929) methods,
//! supporting all three commands: CONNECT, BIND, and UDP ASSOCIATE.
//!
//! ## Server
//!
//! ```rust,ignore
//! use sockspipe::Server;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> sockspipe::Result<()> {
//!     Server::new(":1080")
//!         .with_timeout(Duration::from_secs(10))
//!         .listen_and_serve()
//!         .await
//! }
//! ```
//!
//! ## Client
//!
//! ```rust,ignore
//! use sockspipe::Client;
//! use tokio::io::{AsyncReadExt, AsyncWriteExt};
//!
//! #[tokio::main]
//! async fn main() -> sockspipe::Result<()> {
//!     let client = Client::new("127.0.0.1:1080");
//!     let mut stream = client.connect("example.com:80").await?;
//!     stream.write_all(b"GET / HTTP/1.0\r\n\r\n").await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! client socket -> Conn -> negotiation -> auth -> request -> relay
//! ```
//!
//! The wire codecs live in [`protocol`], the framed connection with its
//! deadline model in [`conn`], and the pluggable capabilities ([`auth::Auth`],
//! [`dialer::Dialer`]) at the seams between them.

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod auth;
pub mod client;
pub mod config;
pub mod conn;
pub mod dialer;
pub mod error;
pub mod protocol;
pub mod server;

// Re-export commonly used items
pub use client::{Client, ProxyConn, SocksDialer, UdpAssociation};
pub use conn::Conn;
pub use error::{ReplyCode, Result, SocksError};
pub use protocol::{Address, Command, Reply, Request};
pub use server::{listen_and_serve, Server};

/// Version of the sockspipe library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Name of the crate
pub const NAME: &str = env!("CARGO_PKG_NAME");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_is_set() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn name_matches_the_package() {
        assert_eq!(NAME, "sockspipe");
    }
}
