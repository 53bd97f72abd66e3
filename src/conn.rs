//! Framed SOCKS5 connection
//!
//! [`Conn`] wraps a byte stream and moves whole protocol messages across it
//! under an optional deadline. A handshake must either complete promptly or
//! be abandoned cleanly: when a deadline expires mid-message the stream is
//! in an unknown framing state, so by default the connection is shut down
//! before the call returns.

use crate::error::{Result, SocksError};
use crate::protocol::Message;
use std::io;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::time::{timeout_at, Instant};

/// A byte-stream connection carrying SOCKS5 messages
#[derive(Debug)]
pub struct Conn<S> {
    stream: S,
    alive: bool,
    close_on_cancel: bool,
}

impl<S> Conn<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    /// Wrap a stream. The connection closes itself on deadline expiry.
    pub fn new(stream: S) -> Self {
        Conn {
            stream,
            alive: true,
            close_on_cancel: true,
        }
    }

    /// Configure whether deadline expiry shuts the stream down
    pub fn close_on_cancel(mut self, enabled: bool) -> Self {
        self.close_on_cancel = enabled;
        self
    }

    /// Whether the connection has not been closed yet
    pub fn alive(&self) -> bool {
        self.alive
    }

    /// Shared access to the underlying stream
    pub fn get_ref(&self) -> &S {
        &self.stream
    }

    /// Unwrap the underlying stream
    pub fn into_inner(self) -> S {
        self.stream
    }

    /// Read one message, optionally bounded by a deadline.
    ///
    /// On expiry the connection is closed (unless configured otherwise) and
    /// [`SocksError::Cancelled`] is returned.
    pub async fn read_message<M: Message>(&mut self, deadline: Option<Instant>) -> Result<M> {
        self.check_alive()?;
        match deadline {
            Some(at) => match timeout_at(at, M::read_from(&mut self.stream)).await {
                Ok(res) => res,
                Err(_) => Err(self.expire("read").await),
            },
            None => M::read_from(&mut self.stream).await,
        }
    }

    /// Write one message, optionally bounded by a deadline.
    pub async fn write_message<M: Message>(
        &mut self,
        msg: &M,
        deadline: Option<Instant>,
    ) -> Result<()> {
        self.check_alive()?;
        match deadline {
            Some(at) => match timeout_at(at, msg.write_to(&mut self.stream)).await {
                Ok(res) => res,
                Err(_) => Err(self.expire("write").await),
            },
            None => msg.write_to(&mut self.stream).await,
        }
    }

    /// Close the connection. The first call shuts the stream down; later
    /// calls are no-ops.
    pub async fn close(&mut self) {
        if !self.alive {
            return;
        }
        self.alive = false;
        let _ = self.stream.shutdown().await;
    }

    fn check_alive(&self) -> Result<()> {
        if self.alive {
            Ok(())
        } else {
            Err(SocksError::Io(io::Error::new(
                io::ErrorKind::NotConnected,
                "connection is closed",
            )))
        }
    }

    async fn expire(&mut self, op: &str) -> SocksError {
        if self.close_on_cancel {
            self.close().await;
        }
        SocksError::Cancelled(format!("deadline expired during message {op}"))
    }
}
