//! Method-selection and username/password messages
//!
//! The negotiation exchange (RFC 1928 §3) and the password sub-negotiation
//! (RFC 1929). Credentials are opaque byte strings; equality is byte-wise.

use crate::error::{Result, SocksError};
use crate::protocol::consts::*;
use crate::protocol::Message;
use async_trait::async_trait;
use bytes::{BufMut, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Negotiation request: the methods the client offers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodRequest {
    /// Offered authentication method codes
    pub methods: Vec<u8>,
}

#[async_trait]
impl Message for MethodRequest {
    async fn read_from<R>(rd: &mut R) -> Result<Self>
    where
        R: AsyncRead + Unpin + Send,
    {
        let mut head = [0u8; 2];
        rd.read_exact(&mut head).await?;
        if head[0] != SOCKS_VERSION {
            return Err(SocksError::Protocol(format!(
                "invalid protocol version ({:#04x})",
                head[0]
            )));
        }
        let mut methods = vec![0u8; head[1] as usize];
        rd.read_exact(&mut methods).await?;
        Ok(MethodRequest { methods })
    }

    async fn write_to<W>(&self, wr: &mut W) -> Result<()>
    where
        W: AsyncWrite + Unpin + Send,
    {
        if self.methods.len() > 255 {
            return Err(SocksError::Protocol(format!(
                "too many methods ({})",
                self.methods.len()
            )));
        }
        let mut buf = BytesMut::with_capacity(2 + self.methods.len());
        buf.put_u8(SOCKS_VERSION);
        buf.put_u8(self.methods.len() as u8);
        buf.put_slice(&self.methods);
        wr.write_all(&buf).await?;
        wr.flush().await?;
        Ok(())
    }
}

/// Negotiation reply: the method the server selected
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MethodReply {
    /// Selected method code, or [`METHOD_NO_ACCEPTABLE`]
    pub method: u8,
}

#[async_trait]
impl Message for MethodReply {
    async fn read_from<R>(rd: &mut R) -> Result<Self>
    where
        R: AsyncRead + Unpin + Send,
    {
        let mut buf = [0u8; 2];
        rd.read_exact(&mut buf).await?;
        if buf[0] != SOCKS_VERSION {
            return Err(SocksError::Protocol(format!(
                "invalid protocol version ({:#04x})",
                buf[0]
            )));
        }
        Ok(MethodReply { method: buf[1] })
    }

    async fn write_to<W>(&self, wr: &mut W) -> Result<()>
    where
        W: AsyncWrite + Unpin + Send,
    {
        wr.write_all(&[SOCKS_VERSION, self.method]).await?;
        wr.flush().await?;
        Ok(())
    }
}

/// Username/password sub-negotiation request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PasswordRequest {
    /// Username, 0-255 opaque bytes
    pub username: Bytes,
    /// Password, 0-255 opaque bytes
    pub password: Bytes,
}

#[async_trait]
impl Message for PasswordRequest {
    async fn read_from<R>(rd: &mut R) -> Result<Self>
    where
        R: AsyncRead + Unpin + Send,
    {
        let mut head = [0u8; 2];
        rd.read_exact(&mut head).await?;
        if head[0] != AUTH_SUBNEG_VERSION {
            return Err(SocksError::Protocol(format!(
                "invalid sub-negotiation version ({:#04x})",
                head[0]
            )));
        }
        let mut username = vec![0u8; head[1] as usize];
        rd.read_exact(&mut username).await?;

        let plen = rd.read_u8().await? as usize;
        let mut password = vec![0u8; plen];
        rd.read_exact(&mut password).await?;

        Ok(PasswordRequest {
            username: Bytes::from(username),
            password: Bytes::from(password),
        })
    }

    async fn write_to<W>(&self, wr: &mut W) -> Result<()>
    where
        W: AsyncWrite + Unpin + Send,
    {
        if self.username.len() > 255 || self.password.len() > 255 {
            return Err(SocksError::Protocol(
                "credentials longer than 255 bytes".into(),
            ));
        }
        let mut buf = BytesMut::with_capacity(3 + self.username.len() + self.password.len());
        buf.put_u8(AUTH_SUBNEG_VERSION);
        buf.put_u8(self.username.len() as u8);
        buf.put_slice(&self.username);
        buf.put_u8(self.password.len() as u8);
        buf.put_slice(&self.password);
        wr.write_all(&buf).await?;
        wr.flush().await?;
        Ok(())
    }
}

/// Username/password sub-negotiation reply
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PasswordReply {
    /// 0x00 on success, anything else is failure
    pub status: u8,
}

impl PasswordReply {
    /// Whether the status byte signals success
    pub fn success(&self) -> bool {
        self.status == AUTH_STATUS_SUCCESS
    }
}

#[async_trait]
impl Message for PasswordReply {
    async fn read_from<R>(rd: &mut R) -> Result<Self>
    where
        R: AsyncRead + Unpin + Send,
    {
        let mut buf = [0u8; 2];
        rd.read_exact(&mut buf).await?;
        if buf[0] != AUTH_SUBNEG_VERSION {
            return Err(SocksError::Protocol(format!(
                "invalid sub-negotiation version ({:#04x})",
                buf[0]
            )));
        }
        Ok(PasswordReply { status: buf[1] })
    }

    async fn write_to<W>(&self, wr: &mut W) -> Result<()>
    where
        W: AsyncWrite + Unpin + Send,
    {
        wr.write_all(&[AUTH_SUBNEG_VERSION, self.status]).await?;
        wr.flush().await?;
        Ok(())
    }
}
