//! SOCKS5 address codec
//!
//! [`Address`] is the DST.ADDR/BND.ADDR triple (ATYP, host, port) that
//! appears in requests, replies, and UDP headers.

use crate::error::{ReplyCode, Result, SocksError};
use crate::protocol::consts::*;
use bytes::{BufMut, Bytes, BytesMut};
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, SocketAddrV4};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// A SOCKS5 address: an IP socket address or a domain name with a port.
///
/// Domain names are opaque byte strings; the protocol does not require them
/// to be valid UTF-8 and neither does this type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Address {
    /// IPv4 or IPv6 address with port
    Ip(SocketAddr),
    /// Domain name (opaque bytes) with port
    Domain(Bytes, u16),
}

impl Address {
    /// The nil address (0.0.0.0:0), used in failure replies where no bound
    /// address exists
    pub const NIL: Address =
        Address::Ip(SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 0)));

    /// Create an IPv4 address
    pub fn ipv4(ip: Ipv4Addr, port: u16) -> Self {
        Address::Ip(SocketAddr::new(IpAddr::V4(ip), port))
    }

    /// Create an IPv6 address
    pub fn ipv6(ip: Ipv6Addr, port: u16) -> Self {
        Address::Ip(SocketAddr::new(IpAddr::V6(ip), port))
    }

    /// Create a domain address
    pub fn domain(name: impl AsRef<[u8]>, port: u16) -> Self {
        Address::Domain(Bytes::copy_from_slice(name.as_ref()), port)
    }

    /// Parse a `host:port` string, classifying the host.
    ///
    /// IP literals become [`Address::Ip`] (IPv6 may be bracketed), anything
    /// else becomes [`Address::Domain`]. An empty host is rewritten to
    /// `0.0.0.0`.
    pub fn parse(s: &str) -> Result<Self> {
        let (host, port) = s
            .rsplit_once(':')
            .ok_or_else(|| SocksError::Protocol(format!("invalid address ({s})")))?;
        let port: u16 = port
            .parse()
            .map_err(|_| SocksError::Protocol(format!("invalid port in address ({s})")))?;

        let host = host
            .strip_prefix('[')
            .and_then(|h| h.strip_suffix(']'))
            .unwrap_or(host);
        let host = if host.is_empty() { "0.0.0.0" } else { host };

        match host.parse::<IpAddr>() {
            Ok(ip) => Ok(Address::Ip(SocketAddr::new(ip, port))),
            Err(_) => Ok(Address::domain(host, port)),
        }
    }

    /// The ATYP byte for this address
    pub fn atyp(&self) -> u8 {
        match self {
            Address::Ip(SocketAddr::V4(_)) => ATYP_IPV4,
            Address::Ip(SocketAddr::V6(_)) => ATYP_IPV6,
            Address::Domain(_, _) => ATYP_DOMAIN,
        }
    }

    /// The port
    pub fn port(&self) -> u16 {
        match self {
            Address::Ip(addr) => addr.port(),
            Address::Domain(_, port) => *port,
        }
    }

    /// Resolve to a socket address.
    ///
    /// IP addresses return immediately; domains go through DNS and the
    /// first result wins.
    pub async fn resolve(&self) -> Result<SocketAddr> {
        match self {
            Address::Ip(addr) => Ok(*addr),
            Address::Domain(_, _) => tokio::net::lookup_host(self.to_string())
                .await?
                .next()
                .ok_or_else(|| SocksError::Protocol(format!("no addresses found for {self}"))),
        }
    }

    /// Encoded wire length: ATYP + payload + PORT
    pub fn wire_len(&self) -> usize {
        match self {
            Address::Ip(SocketAddr::V4(_)) => 1 + 4 + 2,
            Address::Ip(SocketAddr::V6(_)) => 1 + 16 + 2,
            Address::Domain(name, _) => 1 + 1 + name.len() + 2,
        }
    }

    /// Append the wire form (`ATYP | payload | PORT`) to a buffer.
    ///
    /// Fails if a domain name is longer than 255 bytes.
    pub fn encode_into(&self, buf: &mut BytesMut) -> Result<()> {
        match self {
            Address::Ip(SocketAddr::V4(v4)) => {
                buf.put_u8(ATYP_IPV4);
                buf.put_slice(&v4.ip().octets());
                buf.put_u16(v4.port());
            }
            Address::Ip(SocketAddr::V6(v6)) => {
                buf.put_u8(ATYP_IPV6);
                buf.put_slice(&v6.ip().octets());
                buf.put_u16(v6.port());
            }
            Address::Domain(name, port) => {
                if name.len() > MAX_DOMAIN_LEN {
                    return Err(SocksError::Protocol(format!(
                        "domain name too long ({} bytes)",
                        name.len()
                    )));
                }
                buf.put_u8(ATYP_DOMAIN);
                buf.put_u8(name.len() as u8);
                buf.put_slice(name);
                buf.put_u16(*port);
            }
        }
        Ok(())
    }

    /// Decode an address from the reader.
    ///
    /// An unknown ATYP yields a reply-bearing error with
    /// [`ReplyCode::AddressTypeNotSupported`] so the outer handler can put
    /// REP=0x08 on the wire.
    pub async fn read_from<R>(rd: &mut R) -> Result<Self>
    where
        R: AsyncRead + Unpin + Send,
    {
        let atyp = rd.read_u8().await?;
        match atyp {
            ATYP_IPV4 => {
                let mut octets = [0u8; 4];
                rd.read_exact(&mut octets).await?;
                let port = rd.read_u16().await?;
                Ok(Address::ipv4(Ipv4Addr::from(octets), port))
            }
            ATYP_IPV6 => {
                let mut octets = [0u8; 16];
                rd.read_exact(&mut octets).await?;
                let port = rd.read_u16().await?;
                Ok(Address::ipv6(Ipv6Addr::from(octets), port))
            }
            ATYP_DOMAIN => {
                let len = rd.read_u8().await? as usize;
                let mut name = vec![0u8; len];
                rd.read_exact(&mut name).await?;
                let port = rd.read_u16().await?;
                Ok(Address::Domain(Bytes::from(name), port))
            }
            other => Err(SocksError::socks(
                ReplyCode::AddressTypeNotSupported,
                format!("unknown address type ({other:#04x})"),
            )),
        }
    }

    /// Write the wire form onto the writer (no flush)
    pub async fn write_to<W>(&self, wr: &mut W) -> Result<()>
    where
        W: AsyncWrite + Unpin + Send,
    {
        let mut buf = BytesMut::with_capacity(self.wire_len());
        self.encode_into(&mut buf)?;
        wr.write_all(&buf).await?;
        Ok(())
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Address::Ip(addr) => write!(f, "{addr}"),
            Address::Domain(name, port) => {
                write!(f, "{}:{}", String::from_utf8_lossy(name), port)
            }
        }
    }
}

impl From<SocketAddr> for Address {
    fn from(addr: SocketAddr) -> Self {
        Address::Ip(addr)
    }
}
