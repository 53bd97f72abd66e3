//! Command request and reply messages

use crate::error::{ReplyCode, Result, SocksError};
use crate::protocol::addr::Address;
use crate::protocol::consts::*;
use crate::protocol::Message;
use async_trait::async_trait;
use bytes::{BufMut, BytesMut};
use std::fmt;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// SOCKS5 command codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Establish an outbound TCP connection
    Connect,
    /// Listen for one inbound TCP connection
    Bind,
    /// Establish a UDP relay
    UdpAssociate,
}

impl Command {
    /// Parse a command byte
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            CMD_CONNECT => Some(Command::Connect),
            CMD_BIND => Some(Command::Bind),
            CMD_UDP_ASSOCIATE => Some(Command::UdpAssociate),
            _ => None,
        }
    }

    /// The wire byte for this command
    pub fn to_byte(self) -> u8 {
        match self {
            Command::Connect => CMD_CONNECT,
            Command::Bind => CMD_BIND,
            Command::UdpAssociate => CMD_UDP_ASSOCIATE,
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Connect => write!(f, "CONNECT"),
            Command::Bind => write!(f, "BIND"),
            Command::UdpAssociate => write!(f, "UDP ASSOCIATE"),
        }
    }
}

/// Command request sent by the client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    /// The requested command
    pub cmd: Command,
    /// The destination address
    pub dst: Address,
}

#[async_trait]
impl Message for Request {
    async fn read_from<R>(rd: &mut R) -> Result<Self>
    where
        R: AsyncRead + Unpin + Send,
    {
        // VER CMD RSV; the reserved byte is read and ignored
        let mut head = [0u8; 3];
        rd.read_exact(&mut head).await?;
        if head[0] != SOCKS_VERSION {
            return Err(SocksError::Protocol(format!(
                "invalid protocol version ({:#04x})",
                head[0]
            )));
        }
        let cmd = Command::from_byte(head[1]).ok_or_else(|| {
            SocksError::socks(
                ReplyCode::CommandNotSupported,
                format!("unknown command ({:#04x})", head[1]),
            )
        })?;
        let dst = Address::read_from(rd).await?;
        Ok(Request { cmd, dst })
    }

    async fn write_to<W>(&self, wr: &mut W) -> Result<()>
    where
        W: AsyncWrite + Unpin + Send,
    {
        let mut buf = BytesMut::with_capacity(3 + self.dst.wire_len());
        buf.put_slice(&[SOCKS_VERSION, self.cmd.to_byte(), RESERVED]);
        self.dst.encode_into(&mut buf)?;
        wr.write_all(&buf).await?;
        wr.flush().await?;
        Ok(())
    }
}

/// Command reply sent by the server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    /// The reply code
    pub rep: ReplyCode,
    /// The bound address (nil on failures)
    pub bnd: Address,
}

impl Reply {
    /// A success reply carrying the given bound address
    pub fn success(bnd: Address) -> Self {
        Reply {
            rep: ReplyCode::Succeeded,
            bnd,
        }
    }

    /// A failure reply with the nil bound address
    pub fn failure(rep: ReplyCode) -> Self {
        Reply {
            rep,
            bnd: Address::NIL,
        }
    }
}

#[async_trait]
impl Message for Reply {
    async fn read_from<R>(rd: &mut R) -> Result<Self>
    where
        R: AsyncRead + Unpin + Send,
    {
        let mut head = [0u8; 3];
        rd.read_exact(&mut head).await?;
        if head[0] != SOCKS_VERSION {
            return Err(SocksError::Protocol(format!(
                "invalid protocol version ({:#04x})",
                head[0]
            )));
        }
        let rep = ReplyCode::try_from(head[1])?;
        let bnd = Address::read_from(rd).await?;
        Ok(Reply { rep, bnd })
    }

    async fn write_to<W>(&self, wr: &mut W) -> Result<()>
    where
        W: AsyncWrite + Unpin + Send,
    {
        let mut buf = BytesMut::with_capacity(3 + self.bnd.wire_len());
        buf.put_slice(&[SOCKS_VERSION, u8::from(self.rep), RESERVED]);
        self.bnd.encode_into(&mut buf)?;
        wr.write_all(&buf).await?;
        wr.flush().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::net::Ipv4Addr;

    async fn round_trip<M: Message>(msg: &M) -> M {
        let mut buf = Vec::new();
        msg.write_to(&mut buf).await.unwrap();
        let mut cursor = Cursor::new(buf);
        M::read_from(&mut cursor).await.unwrap()
    }

    #[test]
    fn command_bytes() {
        assert_eq!(Command::from_byte(1), Some(Command::Connect));
        assert_eq!(Command::from_byte(2), Some(Command::Bind));
        assert_eq!(Command::from_byte(3), Some(Command::UdpAssociate));
        assert_eq!(Command::from_byte(0), None);
        assert_eq!(Command::from_byte(4), None);
        assert_eq!(Command::Connect.to_byte(), 1);
    }

    #[tokio::test]
    async fn request_round_trip() {
        for dst in [
            Address::ipv4(Ipv4Addr::new(127, 0, 0, 1), 80),
            Address::domain("example.com", 443),
            Address::parse("[2001:db8::1]:53").unwrap(),
        ] {
            let req = Request {
                cmd: Command::Connect,
                dst,
            };
            assert_eq!(round_trip(&req).await, req);
        }
    }

    #[tokio::test]
    async fn request_rejects_wrong_version() {
        let mut wire = Vec::new();
        Request {
            cmd: Command::Connect,
            dst: Address::NIL,
        }
        .write_to(&mut wire)
        .await
        .unwrap();
        wire[0] = 0x04;
        let mut cursor = Cursor::new(wire);
        let err = Request::read_from(&mut cursor).await.unwrap_err();
        assert!(err.reply_code().is_none());
    }

    #[tokio::test]
    async fn request_unknown_command_carries_rep() {
        // 05 09 00 01 00 ... : command 0x09 is detected before the address
        let mut cursor = Cursor::new(vec![SOCKS_VERSION, 0x09, RESERVED, ATYP_IPV4, 0]);
        let err = Request::read_from(&mut cursor).await.unwrap_err();
        assert_eq!(err.reply_code(), Some(ReplyCode::CommandNotSupported));
    }

    #[tokio::test]
    async fn request_unknown_atyp_carries_rep() {
        let mut cursor = Cursor::new(vec![SOCKS_VERSION, CMD_CONNECT, RESERVED, 0x05, 0, 0]);
        let err = Request::read_from(&mut cursor).await.unwrap_err();
        assert_eq!(err.reply_code(), Some(ReplyCode::AddressTypeNotSupported));
    }

    #[tokio::test]
    async fn reply_round_trip() {
        let rep = Reply::success(Address::ipv4(Ipv4Addr::new(10, 0, 0, 1), 1080));
        assert_eq!(round_trip(&rep).await, rep);

        let failed = Reply::failure(ReplyCode::HostUnreachable);
        let decoded = round_trip(&failed).await;
        assert_eq!(decoded.rep, ReplyCode::HostUnreachable);
        assert_eq!(decoded.bnd, Address::NIL);
    }

    #[tokio::test]
    async fn reply_rejects_unknown_code() {
        let mut wire = Vec::new();
        Reply::failure(ReplyCode::GeneralFailure)
            .write_to(&mut wire)
            .await
            .unwrap();
        wire[1] = 0x42;
        let mut cursor = Cursor::new(wire);
        assert!(Reply::read_from(&mut cursor).await.is_err());
    }
}
