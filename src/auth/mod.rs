//! Authentication methods and method negotiation
//!
//! The negotiation exchange selects a method; the [`Auth`] capability then
//! drives the method-specific sub-protocol on either side of the
//! connection.

mod none;
mod password;

pub use none::NoAuth;
pub use password::PasswordAuth;

use crate::conn::Conn;
use crate::error::{Result, SocksError};
use crate::protocol::consts::METHOD_NO_ACCEPTABLE;
use crate::protocol::{MethodReply, MethodRequest};
use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::time::Instant;

/// An authentication method with both halves of its sub-protocol.
///
/// Stateless implementations may be shared freely; the server and client
/// hold them behind `Arc<dyn Auth>`.
#[async_trait]
pub trait Auth: Send + Sync {
    /// The method code advertised during negotiation
    fn method(&self) -> u8;

    /// Drive the client half of the sub-negotiation
    async fn client_handshake(
        &self,
        conn: &mut Conn<TcpStream>,
        deadline: Option<Instant>,
    ) -> Result<()>;

    /// Drive the server half of the sub-negotiation.
    ///
    /// An error aborts the session.
    async fn server_handshake(
        &self,
        conn: &mut Conn<TcpStream>,
        deadline: Option<Instant>,
    ) -> Result<()>;
}

/// Client side of method selection: offer `methods`, return the method the
/// server picked.
///
/// A 0xFF reply means no offered method was acceptable. Servers that select
/// a method outside the offered list are tolerated; the selection is
/// returned verbatim and the sub-negotiation will fail if it is
/// unsupported.
pub async fn negotiate_client<S>(
    conn: &mut Conn<S>,
    methods: &[u8],
    deadline: Option<Instant>,
) -> Result<u8>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    let request = MethodRequest {
        methods: methods.to_vec(),
    };
    conn.write_message(&request, deadline).await?;

    let reply: MethodReply = conn.read_message(deadline).await?;
    if reply.method == METHOD_NO_ACCEPTABLE {
        return Err(SocksError::Auth(
            "no offered authentication method is acceptable to the server".into(),
        ));
    }
    Ok(reply.method)
}

/// Server side of method selection: accept `method` if the client offers
/// it, otherwise reply 0xFF and fail.
///
/// The server carries a single configured method, not a preference list.
pub async fn negotiate_server<S>(
    conn: &mut Conn<S>,
    method: u8,
    deadline: Option<Instant>,
) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    let request: MethodRequest = conn.read_message(deadline).await?;

    if !request.methods.contains(&method) {
        let _ = conn
            .write_message(
                &MethodReply {
                    method: METHOD_NO_ACCEPTABLE,
                },
                deadline,
            )
            .await;
        return Err(SocksError::Auth(format!(
            "authentication method ({method:#04x}) is not supported by the client"
        )));
    }

    conn.write_message(&MethodReply { method }, deadline).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::consts::{METHOD_NONE, METHOD_PASSWORD};
    use tokio::io::duplex;

    #[tokio::test]
    async fn client_and_server_agree() {
        let (client, server) = duplex(256);
        let mut client = Conn::new(client);
        let mut server = Conn::new(server);

        let server_side =
            tokio::spawn(async move { negotiate_server(&mut server, METHOD_NONE, None).await });

        let selected = negotiate_client(&mut client, &[METHOD_NONE, METHOD_PASSWORD], None)
            .await
            .unwrap();
        assert_eq!(selected, METHOD_NONE);
        assert!(server_side.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn server_rejects_unsupported_client() {
        let (client, server) = duplex(256);
        let mut client = Conn::new(client);
        let mut server = Conn::new(server);

        let server_side =
            tokio::spawn(async move { negotiate_server(&mut server, METHOD_PASSWORD, None).await });

        // the client only offers no-auth, the server demands a password
        let err = negotiate_client(&mut client, &[METHOD_NONE], None)
            .await
            .unwrap_err();
        assert!(matches!(err, SocksError::Auth(_)));
        assert!(server_side.await.unwrap().is_err());
    }

    #[tokio::test]
    async fn client_tolerates_off_list_selection() {
        let (client, server) = duplex(256);
        let mut client = Conn::new(client);
        let mut server = Conn::new(server);

        tokio::spawn(async move {
            let _req: MethodRequest = server.read_message(None).await.unwrap();
            server
                .write_message(&MethodReply { method: 0x03 }, None)
                .await
                .unwrap();
        });

        let selected = negotiate_client(&mut client, &[METHOD_NONE], None)
            .await
            .unwrap();
        assert_eq!(selected, 0x03);
    }
}
