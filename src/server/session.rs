//! Per-connection session state machine
//!
//! Each accepted control connection walks negotiation, authentication, and
//! command dispatch, then hands off to a relay. Any pre-relay failure sends
//! a best-effort failure reply (when the error carries a REP code) and
//! closes the connection.

use crate::auth::{negotiate_server, Auth};
use crate::conn::Conn;
use crate::dialer::{Dialer, Network};
use crate::error::{ReplyCode, Result, SocksError};
use crate::protocol::{Address, Command, Reply, Request};
use crate::server::tcp_relay::relay_tcp;
use crate::server::udp_relay::UdpRelay;
use rand::Rng;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream, UdpSocket};
use tokio::time::{timeout_at, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// How long a failure reply may take before it is abandoned. Independent of
/// the session deadline, which may already have expired.
const REPLY_GRACE: Duration = Duration::from_secs(5);

pub(crate) struct Session {
    pub auth: Arc<dyn Auth>,
    pub dialer: Arc<dyn Dialer>,
    pub timeout: Option<Duration>,
    pub udp_buffer: usize,
    pub shutdown: CancellationToken,
}

impl Session {
    /// Drive one control connection from greeting to relay teardown
    pub async fn run(self, stream: TcpStream, peer: SocketAddr) {
        let mut conn = Conn::new(stream);
        let deadline = self.timeout.map(|t| Instant::now() + t);

        if let Err(e) = negotiate_server(&mut conn, self.auth.method(), deadline).await {
            error!("{peer}: negotiation failed: {e}");
            conn.close().await;
            return;
        }

        if let Err(e) = self.auth.server_handshake(&mut conn, deadline).await {
            error!("{peer}: authentication failed: {e}");
            conn.close().await;
            return;
        }

        let request = match conn.read_message::<Request>(deadline).await {
            Ok(req) => req,
            Err(e) => {
                error!("{peer}: invalid request: {e}");
                reject(&mut conn, &e).await;
                return;
            }
        };

        info!("[{}] {} <-> {}", request.cmd, peer, request.dst);

        let result = match request.cmd {
            Command::Connect => self.handle_connect(conn, &request, deadline).await,
            Command::Bind => self.handle_bind(conn, &request, deadline).await,
            Command::UdpAssociate => self.handle_udp(conn, &request, deadline).await,
        };

        if let Err(e) = result {
            error!("[{}] {} <-> {}: {}", request.cmd, peer, request.dst, e);
        }
    }

    /// CONNECT: dial upstream, report its local address, splice
    async fn handle_connect(
        &self,
        mut conn: Conn<TcpStream>,
        request: &Request,
        deadline: Option<Instant>,
    ) -> Result<()> {
        let (upstream, bnd) = match self.dial_upstream(request, deadline).await {
            Ok(dialed) => dialed,
            Err(e) => {
                reject(&mut conn, &e).await;
                return Err(e);
            }
        };

        conn.write_message(&Reply::success(bnd), deadline).await?;
        relay_tcp(conn.into_inner(), upstream, self.shutdown.clone()).await
    }

    async fn dial_upstream(
        &self,
        request: &Request,
        deadline: Option<Instant>,
    ) -> Result<(TcpStream, Address)> {
        let target = request.dst.to_string();
        let dial = self.dialer.dial(Network::Tcp, &target);
        let outcome = match deadline {
            Some(at) => timeout_at(at, dial)
                .await
                .map_err(|_| SocksError::Cancelled(format!("dial to {target} timed out")))
                .and_then(|res| res),
            None => dial.await,
        };

        let stream = outcome
            .map_err(|e| {
                SocksError::socks(
                    ReplyCode::classify_dial(&e),
                    format!("unable to reach {target}: {e}"),
                )
            })?
            .into_tcp()?;

        let bnd = stream
            .local_addr()
            .map(Address::from)
            .map_err(|e| SocksError::socks(ReplyCode::GeneralFailure, e.to_string()))?;
        Ok((stream, bnd))
    }

    /// BIND: listen, report the listener address, accept one peer, report
    /// the peer address, splice
    async fn handle_bind(
        &self,
        mut conn: Conn<TcpStream>,
        request: &Request,
        deadline: Option<Instant>,
    ) -> Result<()> {
        let (listener, bnd) = match bind_listener(request).await {
            Ok(bound) => bound,
            Err(e) => {
                reject(&mut conn, &e).await;
                return Err(e);
            }
        };

        conn.write_message(&Reply::success(bnd), deadline).await?;

        let accepted = {
            let accept = listener.accept();
            match deadline {
                Some(at) => timeout_at(at, accept)
                    .await
                    .map_err(|_| {
                        SocksError::socks(
                            ReplyCode::GeneralFailure,
                            "no inbound connection before the deadline",
                        )
                    })
                    .and_then(|res| res.map_err(SocksError::from)),
                None => accept.await.map_err(SocksError::from),
            }
        };

        let (peer_stream, peer_addr) = match accepted {
            Ok(accepted) => accepted,
            Err(e) => {
                let e = match e.reply_code() {
                    Some(_) => e,
                    None => SocksError::socks(ReplyCode::GeneralFailure, e.to_string()),
                };
                reject(&mut conn, &e).await;
                return Err(e);
            }
        };
        drop(listener);

        conn.write_message(&Reply::success(Address::from(peer_addr)), deadline)
            .await?;
        relay_tcp(conn.into_inner(), peer_stream, self.shutdown.clone()).await
    }

    /// UDP ASSOCIATE: bind the relay socket pair, report where the client
    /// should send datagrams, and run the relay until the control
    /// connection dies
    async fn handle_udp(
        &self,
        mut conn: Conn<TcpStream>,
        request: &Request,
        deadline: Option<Instant>,
    ) -> Result<()> {
        let (relay_sock, upstream_sock, bnd) = match bind_udp_pair(request).await {
            Ok(bound) => bound,
            Err(e) => {
                reject(&mut conn, &e).await;
                return Err(e);
            }
        };

        conn.write_message(&Reply::success(bnd), deadline).await?;

        let relay = UdpRelay::new(conn.into_inner(), relay_sock, upstream_sock, self.udp_buffer);
        relay.run(self.shutdown.clone()).await
    }
}

/// Send a failure reply when the error carries a REP code, then close.
/// Write errors are ignored.
async fn reject(conn: &mut Conn<TcpStream>, err: &SocksError) {
    if let Some(code) = err.reply_code() {
        let grace = Instant::now() + REPLY_GRACE;
        let _ = conn
            .write_message(&Reply::failure(code), Some(grace))
            .await;
    }
    conn.close().await;
}

/// Bind the BIND listener: the requested port first, one fallback on a
/// random port
async fn bind_listener(request: &Request) -> Result<(TcpListener, Address)> {
    let listener = match TcpListener::bind(("0.0.0.0", request.dst.port())).await {
        Ok(listener) => listener,
        Err(e) => {
            debug!(
                "bind on requested port {} failed ({e}), retrying on a random port",
                request.dst.port()
            );
            TcpListener::bind(("0.0.0.0", fallback_port()))
                .await
                .map_err(|e| SocksError::socks(ReplyCode::GeneralFailure, e.to_string()))?
        }
    };

    let bnd = listener
        .local_addr()
        .map(Address::from)
        .map_err(|e| SocksError::socks(ReplyCode::GeneralFailure, e.to_string()))?;
    Ok((listener, bnd))
}

/// Bind the association's socket pair: the client-declared address first
/// (one fallback on a random port) for the socket the client talks to, and
/// an ephemeral port for the destination-facing socket
async fn bind_udp_pair(request: &Request) -> Result<(UdpSocket, UdpSocket, Address)> {
    let declared = request.dst.to_string();
    let relay_sock = match UdpSocket::bind(&declared).await {
        Ok(socket) => socket,
        Err(e) => {
            debug!("bind at declared address {declared} failed ({e}), retrying on a random port");
            UdpSocket::bind(("0.0.0.0", fallback_port()))
                .await
                .map_err(|e| SocksError::socks(ReplyCode::GeneralFailure, e.to_string()))?
        }
    };

    let upstream_sock = UdpSocket::bind("0.0.0.0:0")
        .await
        .map_err(|e| SocksError::socks(ReplyCode::GeneralFailure, e.to_string()))?;

    let bnd = relay_sock
        .local_addr()
        .map(Address::from)
        .map_err(|e| SocksError::socks(ReplyCode::GeneralFailure, e.to_string()))?;
    Ok((relay_sock, upstream_sock, bnd))
}

/// A port in [2500, 65535] for second-chance binds
fn fallback_port() -> u16 {
    rand::thread_rng().gen_range(2500..=65535)
}
