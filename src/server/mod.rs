//! SOCKS5 server
//!
//! [`Server`] accepts control connections, runs the handshake, dispatches
//! CONNECT/BIND/UDP ASSOCIATE, and relays until either side goes away.
//! Closing the server cancels every active session.

mod session;
mod tcp_relay;
mod udp_relay;

pub use tcp_relay::relay_tcp;

use crate::auth::{Auth, NoAuth};
use crate::dialer::{DefaultDialer, Dialer};
use crate::error::Result;
use crate::protocol::consts::MAX_UDP_DATAGRAM;
use session::Session;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// The default listen address when none is configured
pub const DEFAULT_LISTEN_ADDR: &str = ":1080";

/// A SOCKS5 server.
///
/// Clones share the same shutdown handle: closing any clone closes them
/// all.
#[derive(Clone)]
pub struct Server {
    addr: String,
    auth: Arc<dyn Auth>,
    dialer: Arc<dyn Dialer>,
    timeout: Option<Duration>,
    udp_buffer: usize,
    shutdown: CancellationToken,
}

impl Server {
    /// Create a server that will listen at `addr` with no authentication,
    /// the stock dialer, and no handshake timeout
    pub fn new(addr: impl Into<String>) -> Self {
        Server {
            addr: addr.into(),
            auth: Arc::new(NoAuth),
            dialer: Arc::new(DefaultDialer),
            timeout: None,
            udp_buffer: MAX_UDP_DATAGRAM,
            shutdown: CancellationToken::new(),
        }
    }

    /// Require the given authentication method
    pub fn with_auth(mut self, auth: Arc<dyn Auth>) -> Self {
        self.auth = auth;
        self
    }

    /// Use a custom dialer for upstream connections
    pub fn with_dialer(mut self, dialer: Arc<dyn Dialer>) -> Self {
        self.dialer = dialer;
        self
    }

    /// Bound the per-session handshake (through the command reply) by
    /// `timeout`. Zero disables the bound. The relay phase is never bounded
    /// by this timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = if timeout.is_zero() { None } else { Some(timeout) };
        self
    }

    /// Buffer size for UDP datagrams handled by associations
    pub fn with_udp_buffer(mut self, bytes: usize) -> Self {
        self.udp_buffer = bytes;
        self
    }

    /// Bind the configured address and serve until closed
    pub async fn listen_and_serve(&self) -> Result<()> {
        let addr = normalize_listen_addr(&self.addr);
        let listener = TcpListener::bind(&addr).await?;
        self.serve(listener).await
    }

    /// Serve connections from an existing listener until closed.
    ///
    /// Individual session failures are logged and never take the loop
    /// down; a listener error ends it.
    pub async fn serve(&self, listener: TcpListener) -> Result<()> {
        info!("listening at {}", listener.local_addr()?);

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    info!("server closed");
                    return Ok(());
                }
                accepted = listener.accept() => {
                    let (stream, peer) = accepted?;
                    let session = Session {
                        auth: self.auth.clone(),
                        dialer: self.dialer.clone(),
                        timeout: self.timeout,
                        udp_buffer: self.udp_buffer,
                        shutdown: self.shutdown.child_token(),
                    };
                    tokio::spawn(async move { session.run(stream, peer).await });
                }
            }
        }
    }

    /// Cancel all active sessions and stop the accept loop
    pub fn close(&self) {
        self.shutdown.cancel();
    }
}

/// Run a default server at `addr` until it is closed or fails
pub async fn listen_and_serve(addr: impl Into<String>) -> Result<()> {
    Server::new(addr).listen_and_serve().await
}

/// Expand listen shorthands: empty means the default, a bare `:port` binds
/// every interface
fn normalize_listen_addr(addr: &str) -> String {
    let addr = if addr.is_empty() {
        DEFAULT_LISTEN_ADDR
    } else {
        addr
    };
    if let Some(port) = addr.strip_prefix(':') {
        format!("0.0.0.0:{port}")
    } else {
        addr.to_string()
    }
}
