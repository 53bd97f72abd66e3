//! UDP association relay
//!
//! One task serves both directions of an association. Inbound datagrams
//! from the client are unwrapped and forwarded raw to their destination;
//! raw replies are re-encapsulated with the source address and sent back
//! to the client endpoint learned from the first inbound datagram. The
//! relay lives exactly as long as the control TCP connection.

use crate::error::Result;
use crate::protocol::{Address, UdpHeader};
use bytes::Bytes;
use std::net::SocketAddr;
use tokio::io::AsyncReadExt;
use tokio::net::{TcpStream, UdpSocket};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

pub(crate) struct UdpRelay {
    control: TcpStream,
    /// The socket the client sends encapsulated datagrams to; its local
    /// address went out in the command reply
    relay_sock: UdpSocket,
    /// The socket used to exchange raw datagrams with destinations
    upstream_sock: UdpSocket,
    buffer: usize,
}

impl UdpRelay {
    pub fn new(
        control: TcpStream,
        relay_sock: UdpSocket,
        upstream_sock: UdpSocket,
        buffer: usize,
    ) -> Self {
        UdpRelay {
            control,
            relay_sock,
            upstream_sock,
            buffer,
        }
    }

    /// Run until the control connection closes, the session is cancelled,
    /// or a socket fails. All three sockets are released on return.
    pub async fn run(self, shutdown: CancellationToken) -> Result<()> {
        let UdpRelay {
            mut control,
            relay_sock,
            upstream_sock,
            buffer,
        } = self;

        // the client endpoint is pinned by the first inbound datagram
        let mut client: Option<SocketAddr> = None;
        let mut inbound = vec![0u8; buffer];
        let mut outbound = vec![0u8; buffer];
        let mut probe = [0u8; 1];

        loop {
            tokio::select! {
                res = relay_sock.recv_from(&mut inbound) => {
                    let (n, src) = res?;
                    match client {
                        None => {
                            debug!("udp association pinned to {src}");
                            client = Some(src);
                        }
                        Some(pinned) if pinned != src => {
                            debug!("dropping datagram from unexpected peer {src}");
                            continue;
                        }
                        Some(_) => {}
                    }
                    forward(&upstream_sock, &inbound[..n], src).await;
                }
                res = upstream_sock.recv_from(&mut outbound) => {
                    let (n, from) = res?;
                    let Some(endpoint) = client else {
                        debug!("dropping reply from {from}: no client endpoint yet");
                        continue;
                    };
                    let header = UdpHeader::new(
                        Address::from(from),
                        Bytes::copy_from_slice(&outbound[..n]),
                    );
                    match header.encode() {
                        Ok(datagram) => {
                            if let Err(e) = relay_sock.send_to(&datagram, endpoint).await {
                                warn!("udp reply to {endpoint} failed: {e}");
                            }
                        }
                        Err(e) => debug!("unable to encapsulate reply from {from}: {e}"),
                    }
                }
                res = control.read(&mut probe) => match res {
                    Ok(0) | Err(_) => {
                        debug!("control connection closed, ending udp association");
                        break;
                    }
                    Ok(_) => continue,
                },
                _ = shutdown.cancelled() => {
                    debug!("udp association cancelled");
                    break;
                }
            }
        }

        Ok(())
    }
}

/// Unwrap one inbound datagram and forward its payload to the destination
async fn forward(upstream_sock: &UdpSocket, datagram: &[u8], src: SocketAddr) {
    let header = match UdpHeader::decode(datagram).await {
        Ok(header) => header,
        Err(e) => {
            debug!("malformed datagram from {src}: {e}");
            return;
        }
    };

    if header.is_fragmented() {
        debug!("dropping fragmented datagram from {src} (frag={})", header.frag);
        return;
    }

    let target = match header.dst.resolve().await {
        Ok(target) => target,
        Err(e) => {
            debug!("unable to resolve udp destination {}: {e}", header.dst);
            return;
        }
    };

    if let Err(e) = upstream_sock.send_to(&header.data, target).await {
        warn!("udp forward to {target} failed: {e}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::net::TcpListener;

    async fn tcp_pair() -> (TcpStream, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (a, b) = tokio::join!(TcpStream::connect(addr), listener.accept());
        (a.unwrap(), b.unwrap().0)
    }

    async fn start_relay() -> (SocketAddr, TcpStream, CancellationToken) {
        let (control, control_peer) = tcp_pair().await;
        let relay_sock = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let relay_addr = relay_sock.local_addr().unwrap();
        let upstream_sock = UdpSocket::bind("127.0.0.1:0").await.unwrap();

        let token = CancellationToken::new();
        let relay = UdpRelay::new(control, relay_sock, upstream_sock, 65535);
        tokio::spawn(relay.run(token.clone()));
        (relay_addr, control_peer, token)
    }

    async fn udp_echo() -> SocketAddr {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = socket.local_addr().unwrap();
        tokio::spawn(async move {
            let mut buf = [0u8; 65535];
            while let Ok((n, from)) = socket.recv_from(&mut buf).await {
                let _ = socket.send_to(&buf[..n], from).await;
            }
        });
        addr
    }

    #[tokio::test]
    async fn datagrams_are_relayed_and_reencapsulated() {
        let (relay_addr, _control_peer, _token) = start_relay().await;
        let echo_addr = udp_echo().await;

        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let request = UdpHeader::new(Address::from(echo_addr), Bytes::from_static(b"hi"))
            .encode()
            .unwrap();
        client.send_to(&request, relay_addr).await.unwrap();

        let mut buf = [0u8; 1024];
        let (n, from) = tokio::time::timeout(
            Duration::from_secs(2),
            client.recv_from(&mut buf),
        )
        .await
        .unwrap()
        .unwrap();
        assert_eq!(from, relay_addr);

        let reply = UdpHeader::decode(&buf[..n]).await.unwrap();
        assert_eq!(reply.frag, 0);
        assert_eq!(reply.dst, Address::from(echo_addr));
        assert_eq!(reply.data, Bytes::from_static(b"hi"));
    }

    #[tokio::test]
    async fn fragmented_datagrams_are_dropped() {
        let (relay_addr, _control_peer, _token) = start_relay().await;
        let echo_addr = udp_echo().await;

        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let mut header = UdpHeader::new(Address::from(echo_addr), Bytes::from_static(b"frag"));
        header.frag = 1;
        client
            .send_to(&header.encode().unwrap(), relay_addr)
            .await
            .unwrap();

        let mut buf = [0u8; 1024];
        let reply = tokio::time::timeout(
            Duration::from_millis(300),
            client.recv_from(&mut buf),
        )
        .await;
        assert!(reply.is_err(), "fragmented datagram should not be relayed");
    }

    #[tokio::test]
    async fn control_eof_ends_the_relay() {
        let (relay_addr, control_peer, _token) = start_relay().await;
        let echo_addr = udp_echo().await;

        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let request = UdpHeader::new(Address::from(echo_addr), Bytes::from_static(b"one"))
            .encode()
            .unwrap();
        client.send_to(&request, relay_addr).await.unwrap();
        let mut buf = [0u8; 1024];
        tokio::time::timeout(Duration::from_secs(2), client.recv_from(&mut buf))
            .await
            .unwrap()
            .unwrap();

        // closing the control connection must close both relay sockets
        drop(control_peer);
        tokio::time::sleep(Duration::from_millis(200)).await;

        client.send_to(&request, relay_addr).await.unwrap();
        let reply = tokio::time::timeout(
            Duration::from_millis(300),
            client.recv_from(&mut buf),
        )
        .await;
        assert!(reply.is_err(), "relay kept running after control EOF");
    }

    #[tokio::test]
    async fn datagrams_from_other_peers_are_dropped() {
        let (relay_addr, _control_peer, _token) = start_relay().await;
        let echo_addr = udp_echo().await;

        let pinned = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let intruder = UdpSocket::bind("127.0.0.1:0").await.unwrap();

        let request = UdpHeader::new(Address::from(echo_addr), Bytes::from_static(b"mine"))
            .encode()
            .unwrap();
        pinned.send_to(&request, relay_addr).await.unwrap();

        let mut buf = [0u8; 1024];
        tokio::time::timeout(Duration::from_secs(2), pinned.recv_from(&mut buf))
            .await
            .unwrap()
            .unwrap();

        // a different source address must be ignored after pinning
        let stray = UdpHeader::new(Address::from(echo_addr), Bytes::from_static(b"stolen"))
            .encode()
            .unwrap();
        intruder.send_to(&stray, relay_addr).await.unwrap();
        let reply = tokio::time::timeout(
            Duration::from_millis(300),
            intruder.recv_from(&mut buf),
        )
        .await;
        assert!(reply.is_err(), "intruder datagram should be dropped");
    }
}
