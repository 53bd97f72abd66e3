//! The "no authentication" method

use super::Auth;
use crate::conn::Conn;
use crate::error::Result;
use crate::protocol::consts::METHOD_NONE;
use async_trait::async_trait;
use tokio::net::TcpStream;
use tokio::time::Instant;

/// No authentication required; both handshake halves are no-ops
#[derive(Debug, Clone, Copy, Default)]
pub struct NoAuth;

#[async_trait]
impl Auth for NoAuth {
    fn method(&self) -> u8 {
        METHOD_NONE
    }

    async fn client_handshake(
        &self,
        _conn: &mut Conn<TcpStream>,
        _deadline: Option<Instant>,
    ) -> Result<()> {
        Ok(())
    }

    async fn server_handshake(
        &self,
        _conn: &mut Conn<TcpStream>,
        _deadline: Option<Instant>,
    ) -> Result<()> {
        Ok(())
    }
}
