//! Client-side UDP association
//!
//! A [`UdpAssociation`] owns the UDP socket connected to the proxy's relay
//! endpoint and a watcher holding the control TCP connection. The
//! association lives exactly as long as the control connection: any
//! completion of a read on it (EOF or error) tears the association down.

use crate::error::{Result, SocksError};
use crate::protocol::{Address, UdpHeader};
use bytes::Bytes;
use std::net::SocketAddr;
use tokio::io::AsyncReadExt;
use tokio::net::{TcpStream, UdpSocket};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// A live UDP association through a SOCKS5 proxy
#[derive(Debug)]
pub struct UdpAssociation {
    socket: UdpSocket,
    closed: CancellationToken,
    buffer: usize,
    destination: Option<Address>,
}

impl UdpAssociation {
    /// Tie a relay socket to its control connection and start the watcher
    pub(crate) fn new(control: TcpStream, socket: UdpSocket, buffer: usize) -> Self {
        let closed = CancellationToken::new();
        let watcher = closed.clone();

        tokio::spawn(async move {
            let mut control = control;
            let mut probe = [0u8; 1];
            loop {
                tokio::select! {
                    _ = watcher.cancelled() => break,
                    res = control.read(&mut probe) => match res {
                        Ok(0) | Err(_) => {
                            debug!("control connection closed, ending udp association");
                            watcher.cancel();
                            break;
                        }
                        Ok(_) => continue,
                    },
                }
            }
            // dropping `control` here closes the control connection when the
            // association was closed from this side
        });

        UdpAssociation {
            socket,
            closed,
            buffer,
            destination: None,
        }
    }

    /// Send `payload` to `dst` through the relay
    pub async fn send_to(&self, payload: &[u8], dst: &Address) -> Result<()> {
        let header = UdpHeader::new(dst.clone(), Bytes::copy_from_slice(payload));
        let datagram = header.encode()?;
        tokio::select! {
            biased;
            _ = self.closed.cancelled() => Err(self.closed_error()),
            res = self.socket.send(&datagram) => {
                res?;
                Ok(())
            }
        }
    }

    /// Receive one datagram from the relay, returning the payload and the
    /// address it originated from
    pub async fn recv_from(&self) -> Result<(Bytes, Address)> {
        let mut buf = vec![0u8; self.buffer];
        tokio::select! {
            biased;
            _ = self.closed.cancelled() => Err(self.closed_error()),
            res = self.socket.recv(&mut buf) => {
                let n = res?;
                let header = UdpHeader::decode(&buf[..n]).await?;
                Ok((header.data, header.dst))
            }
        }
    }

    /// Pin a default destination for [`send`](Self::send) /
    /// [`recv`](Self::recv)
    pub fn pin_destination(&mut self, dst: Address) {
        self.destination = Some(dst);
    }

    /// Send to the pinned destination
    pub async fn send(&self, payload: &[u8]) -> Result<()> {
        let dst = self
            .destination
            .as_ref()
            .ok_or_else(|| SocksError::Protocol("no destination pinned".into()))?
            .clone();
        self.send_to(payload, &dst).await
    }

    /// Receive one payload, discarding the source address
    pub async fn recv(&self) -> Result<Bytes> {
        let (data, _) = self.recv_from().await?;
        Ok(data)
    }

    /// Local address of the relay socket
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// The proxy's relay endpoint this association talks to
    pub fn relay_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.peer_addr()?)
    }

    /// Whether the association has been torn down
    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    /// Tear the association down. Closes the control connection; the UDP
    /// socket is released when the association is dropped.
    pub fn close(&self) {
        self.closed.cancel();
    }

    fn closed_error(&self) -> SocksError {
        SocksError::Cancelled("udp association is closed".into())
    }
}

impl Drop for UdpAssociation {
    fn drop(&mut self) {
        self.closed.cancel();
    }
}
