//! SOCKS5 client
//!
//! [`Client`] speaks the client side of the protocol against a proxy:
//! CONNECT and BIND return plumbed-through TCP streams, UDP ASSOCIATE
//! returns a [`UdpAssociation`]. [`SocksDialer`] wraps a client as a
//! generic outbound dialer.

mod udp;

pub use udp::UdpAssociation;

use crate::auth::{negotiate_client, Auth, NoAuth};
use crate::conn::Conn;
use crate::dialer::{DefaultDialer, Dialer, Network};
use crate::error::{ReplyCode, Result, SocksError};
use crate::protocol::consts::{MAX_UDP_DATAGRAM, METHOD_NONE};
use crate::protocol::{Address, Command, Reply, Request};
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::sync::oneshot;
use tracing::debug;

/// A SOCKS5 client bound to one proxy address.
///
/// Cloning is cheap; clones share the configured authenticator and dialer.
#[derive(Clone)]
pub struct Client {
    proxy: String,
    auth: Arc<dyn Auth>,
    dialer: Arc<dyn Dialer>,
    udp_buffer: usize,
}

impl Client {
    /// Create a client for the proxy at `proxy` (a `host:port` string) with
    /// no authentication and the stock dialer
    pub fn new(proxy: impl Into<String>) -> Self {
        Client {
            proxy: proxy.into(),
            auth: Arc::new(NoAuth),
            dialer: Arc::new(DefaultDialer),
            udp_buffer: MAX_UDP_DATAGRAM,
        }
    }

    /// Use the given authenticator when the proxy requires it
    pub fn with_auth(mut self, auth: Arc<dyn Auth>) -> Self {
        self.auth = auth;
        self
    }

    /// Use a custom dialer for reaching the proxy and its UDP relay
    pub fn with_dialer(mut self, dialer: Arc<dyn Dialer>) -> Self {
        self.dialer = dialer;
        self
    }

    /// Buffer size for datagrams received from the UDP relay
    pub fn with_udp_buffer(mut self, bytes: usize) -> Self {
        self.udp_buffer = bytes;
        self
    }

    /// CONNECT to `target` through the proxy.
    ///
    /// On success the returned stream is the tunnel: bytes written reach
    /// the target, bytes read come from it.
    pub async fn connect(&self, target: &str) -> Result<TcpStream> {
        let mut conn = self.handshake().await?;
        self.command(&mut conn, Command::Connect, target).await?;
        Ok(conn.into_inner())
    }

    /// BIND through the proxy, asking it to listen at `target`.
    ///
    /// The address the proxy is actually listening on (from the first
    /// reply) is delivered through `bound` as soon as it is known; the call
    /// then blocks until a peer connects and the second reply arrives. The
    /// inbound peer address is discarded.
    pub async fn bind(&self, target: &str, bound: oneshot::Sender<Address>) -> Result<TcpStream> {
        let mut conn = self.handshake().await?;
        let (request, reply) = self.command(&mut conn, Command::Bind, target).await?;

        // the caller may have dropped the receiver; that is not our problem
        let _ = bound.send(reply.bnd);

        self.read_reply(&mut conn, &request).await?;
        Ok(conn.into_inner())
    }

    /// UDP ASSOCIATE through the proxy.
    ///
    /// `local_hint` is the client address declared in the request (use
    /// `0.0.0.0:0` when unknown). The returned association is tied to the
    /// control connection: when it closes, the association dies.
    pub async fn udp_associate(&self, local_hint: &str) -> Result<UdpAssociation> {
        let mut conn = self.handshake().await?;
        let (_, reply) = self
            .command(&mut conn, Command::UdpAssociate, local_hint)
            .await?;

        debug!("udp relay endpoint is {}", reply.bnd);
        let relay = self
            .dialer
            .dial(Network::Udp, &reply.bnd.to_string())
            .await?
            .into_udp()?;

        Ok(UdpAssociation::new(conn.into_inner(), relay, self.udp_buffer))
    }

    /// A dialer that tunnels outbound connections through this proxy
    pub fn socks_dialer(&self) -> SocksDialer {
        SocksDialer {
            client: self.clone(),
        }
    }

    /// Dial the proxy, negotiate a method, and run its sub-negotiation.
    ///
    /// If the server selects no-auth the no-auth handler is used even when
    /// the client was configured with credentials.
    async fn handshake(&self) -> Result<Conn<TcpStream>> {
        let stream = self
            .dialer
            .dial(Network::Tcp, &self.proxy)
            .await?
            .into_tcp()?;
        let mut conn = Conn::new(stream);

        let offered = [METHOD_NONE, self.auth.method()];
        let selected = negotiate_client(&mut conn, &offered, None).await?;

        match selected {
            METHOD_NONE => NoAuth.client_handshake(&mut conn, None).await?,
            m if m == self.auth.method() => self.auth.client_handshake(&mut conn, None).await?,
            m => {
                return Err(SocksError::Auth(format!(
                    "server selected an unsupported method ({m:#04x})"
                )))
            }
        }

        Ok(conn)
    }

    /// Send a command request and read the (first) reply
    async fn command(
        &self,
        conn: &mut Conn<TcpStream>,
        cmd: Command,
        target: &str,
    ) -> Result<(Request, Reply)> {
        let dst = Address::parse(target)?;
        let request = Request { cmd, dst };
        conn.write_message(&request, None).await?;
        let reply = self.read_reply(conn, &request).await?;
        Ok((request, reply))
    }

    /// Read one reply; a non-zero REP becomes an error carrying the code
    /// and the request it answers
    async fn read_reply(&self, conn: &mut Conn<TcpStream>, request: &Request) -> Result<Reply> {
        let reply: Reply = conn.read_message(None).await?;
        if reply.rep != ReplyCode::Succeeded {
            return Err(SocksError::socks(
                reply.rep,
                format!(
                    "{} to {} failed: {}",
                    request.cmd, request.dst, reply.rep
                ),
            ));
        }
        Ok(reply)
    }
}

/// A connection made through the proxy by [`SocksDialer`]
#[derive(Debug)]
pub enum ProxyConn {
    /// A CONNECT tunnel
    Tcp(TcpStream),
    /// A UDP association pinned to the dialed destination
    Udp(UdpAssociation),
}

/// Dials outbound connections through a SOCKS5 proxy
#[derive(Clone)]
pub struct SocksDialer {
    client: Client,
}

impl SocksDialer {
    /// Connect to `address` through the proxy over the given network.
    ///
    /// `tcp` issues CONNECT; `udp` issues UDP ASSOCIATE and pins `address`
    /// as the association's default destination.
    pub async fn dial(&self, network: Network, address: &str) -> Result<ProxyConn> {
        match network {
            Network::Tcp => Ok(ProxyConn::Tcp(self.client.connect(address).await?)),
            Network::Udp => {
                let mut assoc = self.client.udp_associate(address).await?;
                assoc.pin_destination(Address::parse(address)?);
                Ok(ProxyConn::Udp(assoc))
            }
        }
    }
}
