//! SOCKS5 wire protocol
//!
//! Message types and codecs for RFC 1928 framing and the RFC 1929
//! username/password sub-negotiation. Codecs are pure: they read and write
//! bytes on whatever the caller supplies and never open sockets themselves.

pub mod addr;
pub mod command;
pub mod consts;
pub mod handshake;
pub mod udp;

pub use addr::Address;
pub use command::{Command, Reply, Request};
pub use handshake::{MethodReply, MethodRequest, PasswordReply, PasswordRequest};
pub use udp::UdpHeader;

use crate::error::Result;
use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};

/// A whole SOCKS5 message that can be decoded from and encoded to a byte
/// stream.
///
/// Decoders reject messages with a wrong version byte; encoders write the
/// complete message and flush.
#[async_trait]
pub trait Message: Sized + Send {
    /// Decode one message from the reader
    async fn read_from<R>(rd: &mut R) -> Result<Self>
    where
        R: AsyncRead + Unpin + Send;

    /// Encode this message onto the writer and flush it
    async fn write_to<W>(&self, wr: &mut W) -> Result<()>
    where
        W: AsyncWrite + Unpin + Send;
}
