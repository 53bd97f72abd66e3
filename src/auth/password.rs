//! Username/password authentication (RFC 1929)

use super::Auth;
use crate::conn::Conn;
use crate::error::{Result, SocksError};
use crate::protocol::consts::{AUTH_STATUS_FAILURE, AUTH_STATUS_SUCCESS, METHOD_PASSWORD};
use crate::protocol::{PasswordReply, PasswordRequest};
use async_trait::async_trait;
use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::time::Instant;

/// Username/password authentication.
///
/// Credentials are opaque byte strings (0-255 bytes each) compared
/// byte-for-byte. On the server side a mismatch sends a failure reply and
/// aborts the session.
#[derive(Debug, Clone)]
pub struct PasswordAuth {
    username: Bytes,
    password: Bytes,
}

impl PasswordAuth {
    /// Create an authenticator with the given credentials
    pub fn new(username: impl AsRef<[u8]>, password: impl AsRef<[u8]>) -> Self {
        PasswordAuth {
            username: Bytes::copy_from_slice(username.as_ref()),
            password: Bytes::copy_from_slice(password.as_ref()),
        }
    }

    /// Client half: send the credentials and check the status byte
    pub async fn drive_client<S>(&self, conn: &mut Conn<S>, deadline: Option<Instant>) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send,
    {
        let request = PasswordRequest {
            username: self.username.clone(),
            password: self.password.clone(),
        };
        conn.write_message(&request, deadline).await?;

        let reply: PasswordReply = conn.read_message(deadline).await?;
        if !reply.success() {
            return Err(SocksError::Auth(
                "username or password rejected by the server".into(),
            ));
        }
        Ok(())
    }

    /// Server half: read the credentials, reply with the verdict, and fail
    /// the session on a mismatch
    pub async fn drive_server<S>(&self, conn: &mut Conn<S>, deadline: Option<Instant>) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send,
    {
        let request: PasswordRequest = conn.read_message(deadline).await?;

        if request.username == self.username && request.password == self.password {
            conn.write_message(
                &PasswordReply {
                    status: AUTH_STATUS_SUCCESS,
                },
                deadline,
            )
            .await
        } else {
            let _ = conn
                .write_message(
                    &PasswordReply {
                        status: AUTH_STATUS_FAILURE,
                    },
                    deadline,
                )
                .await;
            Err(SocksError::Auth("invalid username or password".into()))
        }
    }
}

#[async_trait]
impl Auth for PasswordAuth {
    fn method(&self) -> u8 {
        METHOD_PASSWORD
    }

    async fn client_handshake(
        &self,
        conn: &mut Conn<TcpStream>,
        deadline: Option<Instant>,
    ) -> Result<()> {
        self.drive_client(conn, deadline).await
    }

    async fn server_handshake(
        &self,
        conn: &mut Conn<TcpStream>,
        deadline: Option<Instant>,
    ) -> Result<()> {
        self.drive_server(conn, deadline).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Message;
    use tokio::io::duplex;

    #[tokio::test]
    async fn matching_credentials_succeed() {
        let (client, server) = duplex(256);
        let mut client = Conn::new(client);
        let mut server = Conn::new(server);

        let auth = PasswordAuth::new("user", "secret");
        let server_auth = auth.clone();
        let server_side =
            tokio::spawn(async move { server_auth.drive_server(&mut server, None).await });

        auth.drive_client(&mut client, None).await.unwrap();
        assert!(server_side.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn wrong_password_fails_both_sides() {
        let (client, server) = duplex(256);
        let mut client = Conn::new(client);
        let mut server = Conn::new(server);

        let server_side = tokio::spawn(async move {
            PasswordAuth::new("user", "right")
                .drive_server(&mut server, None)
                .await
        });

        let client_err = PasswordAuth::new("user", "wrong")
            .drive_client(&mut client, None)
            .await
            .unwrap_err();
        assert!(matches!(client_err, SocksError::Auth(_)));

        let server_err = server_side.await.unwrap().unwrap_err();
        assert!(matches!(server_err, SocksError::Auth(_)));
    }

    #[tokio::test]
    async fn failure_reply_is_sent_exactly_once() {
        let (client, server) = duplex(256);
        let mut server = Conn::new(server);

        let server_side = tokio::spawn(async move {
            PasswordAuth::new("user", "right")
                .drive_server(&mut server, None)
                .await
        });

        let mut client = client;
        PasswordRequest {
            username: Bytes::from_static(b"user"),
            password: Bytes::from_static(b"wrong"),
        }
        .write_to(&mut client)
        .await
        .unwrap();

        let reply = PasswordReply::read_from(&mut client).await.unwrap();
        assert_eq!(reply.status, AUTH_STATUS_FAILURE);
        assert!(server_side.await.unwrap().is_err());

        // no second (success) reply follows the failure
        use tokio::io::AsyncReadExt;
        let mut extra = [0u8; 2];
        let trailing = tokio::time::timeout(
            std::time::Duration::from_millis(100),
            client.read(&mut extra),
        )
        .await;
        match trailing {
            Err(_) => {}                      // nothing arrived
            Ok(Ok(0)) => {}                   // peer closed
            Ok(Ok(n)) => panic!("unexpected {n} trailing bytes"),
            Ok(Err(_)) => {}
        }
    }

    #[tokio::test]
    async fn empty_credentials_are_valid() {
        let (client, server) = duplex(256);
        let mut client = Conn::new(client);
        let mut server = Conn::new(server);

        let auth = PasswordAuth::new("", "");
        let server_auth = auth.clone();
        let server_side =
            tokio::spawn(async move { server_auth.drive_server(&mut server, None).await });

        auth.drive_client(&mut client, None).await.unwrap();
        assert!(server_side.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn server_rejects_wrong_subversion() {
        let (mut client, server) = duplex(256);
        let mut server = Conn::new(server);

        let server_side = tokio::spawn(async move {
            PasswordAuth::new("u", "p").drive_server(&mut server, None).await
        });

        use tokio::io::AsyncWriteExt;
        // version byte 0x05 instead of the sub-negotiation version 0x01
        client.write_all(&[0x05, 1, b'u', 1, b'p']).await.unwrap();
        assert!(server_side.await.unwrap().is_err());
    }
}
