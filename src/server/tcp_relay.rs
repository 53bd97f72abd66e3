//! Full-duplex TCP relay

use crate::error::Result;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Copy bytes between two streams in both directions until either
/// direction finishes (EOF or error) or the session is cancelled.
///
/// The two directions are independent; no cross-direction ordering is
/// promised. Returning drops both streams, so the relay closes both
/// sockets unconditionally.
pub async fn relay_tcp<A, B>(a: A, b: B, shutdown: CancellationToken) -> Result<()>
where
    A: AsyncRead + AsyncWrite + Unpin,
    B: AsyncRead + AsyncWrite + Unpin,
{
    let (mut a_read, mut a_write) = tokio::io::split(a);
    let (mut b_read, mut b_write) = tokio::io::split(b);

    let a_to_b = tokio::io::copy(&mut a_read, &mut b_write);
    let b_to_a = tokio::io::copy(&mut b_read, &mut a_write);

    tokio::select! {
        result = a_to_b => match result {
            Ok(bytes) => debug!("relay a->b finished after {bytes} bytes"),
            Err(e) => debug!("relay a->b ended with error: {e}"),
        },
        result = b_to_a => match result {
            Ok(bytes) => debug!("relay b->a finished after {bytes} bytes"),
            Err(e) => debug!("relay b->a ended with error: {e}"),
        },
        _ = shutdown.cancelled() => debug!("relay cancelled"),
    }

    Ok(())
}
