//! Outbound dialer capability
//!
//! The server (and the client, for reaching the proxy) makes outbound
//! connections through a [`Dialer`], a small capability that can be swapped
//! out for routing through upstream proxies, virtual networks, or tests.

use crate::error::{Result, SocksError};
use async_trait::async_trait;
use std::fmt;
use std::str::FromStr;
use tokio::net::{TcpStream, UdpSocket};

/// Transport selector for [`Dialer::dial`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Network {
    /// TCP byte stream
    Tcp,
    /// UDP datagrams
    Udp,
}

impl Network {
    /// The conventional name of the network
    pub fn as_str(&self) -> &'static str {
        match self {
            Network::Tcp => "tcp",
            Network::Udp => "udp",
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Network {
    type Err = SocksError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "tcp" => Ok(Network::Tcp),
            "udp" => Ok(Network::Udp),
            other => Err(SocksError::Protocol(format!("unknown network ({other})"))),
        }
    }
}

/// A connected outbound socket returned by a [`Dialer`]
#[derive(Debug)]
pub enum Outbound {
    /// A connected TCP stream
    Tcp(TcpStream),
    /// A UDP socket connected to the remote endpoint
    Udp(UdpSocket),
}

impl Outbound {
    /// Unwrap the TCP stream
    pub fn into_tcp(self) -> Result<TcpStream> {
        match self {
            Outbound::Tcp(stream) => Ok(stream),
            Outbound::Udp(_) => Err(SocksError::Protocol(
                "expected a tcp connection, got udp".into(),
            )),
        }
    }

    /// Unwrap the UDP socket
    pub fn into_udp(self) -> Result<UdpSocket> {
        match self {
            Outbound::Udp(socket) => Ok(socket),
            Outbound::Tcp(_) => Err(SocksError::Protocol(
                "expected a udp connection, got tcp".into(),
            )),
        }
    }
}

/// Capability for making outbound connections
#[async_trait]
pub trait Dialer: Send + Sync {
    /// Connect to `address` over the given network
    async fn dial(&self, network: Network, address: &str) -> Result<Outbound>;
}

/// The stock dialer: plain `TcpStream::connect` and a locally bound,
/// connected `UdpSocket`
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultDialer;

#[async_trait]
impl Dialer for DefaultDialer {
    async fn dial(&self, network: Network, address: &str) -> Result<Outbound> {
        match network {
            Network::Tcp => Ok(Outbound::Tcp(TcpStream::connect(address).await?)),
            Network::Udp => {
                let socket = UdpSocket::bind("0.0.0.0:0").await?;
                socket.connect(address).await?;
                Ok(Outbound::Udp(socket))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[test]
    fn network_parsing() {
        assert_eq!("tcp".parse::<Network>().unwrap(), Network::Tcp);
        assert_eq!("udp".parse::<Network>().unwrap(), Network::Udp);
        assert!("icmp".parse::<Network>().is_err());
        assert_eq!(Network::Tcp.to_string(), "tcp");
    }

    #[tokio::test]
    async fn default_dialer_tcp() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let outbound = DefaultDialer
            .dial(Network::Tcp, &addr.to_string())
            .await
            .unwrap();
        assert!(outbound.into_tcp().is_ok());
        let _ = listener.accept().await.unwrap();
    }

    #[tokio::test]
    async fn default_dialer_udp() {
        let peer = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = peer.local_addr().unwrap();

        let outbound = DefaultDialer
            .dial(Network::Udp, &addr.to_string())
            .await
            .unwrap();
        let socket = outbound.into_udp().unwrap();
        assert_eq!(socket.peer_addr().unwrap(), addr);
    }

    #[tokio::test]
    async fn outbound_unwrap_mismatch() {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        assert!(Outbound::Udp(socket).into_tcp().is_err());
    }
}
