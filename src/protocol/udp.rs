//! UDP datagram header codec
//!
//! Each datagram relayed through a UDP association carries the header
//! `RSV (2) | FRAG (1) | ATYP | DST.ADDR | DST.PORT | DATA`, where DATA
//! extends to the end of the datagram.

use crate::error::{Result, SocksError};
use crate::protocol::addr::Address;
use bytes::{BufMut, Bytes, BytesMut};
use std::io::Cursor;
use tokio::io::AsyncReadExt;

/// A decoded SOCKS5 UDP datagram
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UdpHeader {
    /// Fragment number; 0 means standalone
    pub frag: u8,
    /// Destination (client to relay) or source (relay to client) address
    pub dst: Address,
    /// The raw payload
    pub data: Bytes,
}

impl UdpHeader {
    /// Create a standalone (FRAG=0) datagram
    pub fn new(dst: Address, data: Bytes) -> Self {
        UdpHeader { frag: 0, dst, data }
    }

    /// Whether this datagram is part of a fragment sequence
    pub fn is_fragmented(&self) -> bool {
        self.frag != 0
    }

    /// Encode header and payload into one datagram buffer
    pub fn encode(&self) -> Result<BytesMut> {
        let mut buf = BytesMut::with_capacity(3 + self.dst.wire_len() + self.data.len());
        buf.put_u16(0); // RSV
        buf.put_u8(self.frag);
        self.dst.encode_into(&mut buf)?;
        buf.put_slice(&self.data);
        Ok(buf)
    }

    /// Decode one datagram.
    ///
    /// The reserved field must be zero; everything after the address is the
    /// payload.
    pub async fn decode(datagram: &[u8]) -> Result<UdpHeader> {
        if datagram.len() < 4 {
            return Err(SocksError::Protocol(format!(
                "udp datagram too short ({} bytes)",
                datagram.len()
            )));
        }
        let mut cursor = Cursor::new(datagram);
        let rsv = cursor.read_u16().await?;
        if rsv != 0 {
            return Err(SocksError::Protocol(format!(
                "invalid reserved field ({rsv:#06x})"
            )));
        }
        let frag = cursor.read_u8().await?;
        let dst = Address::read_from(&mut cursor).await?;
        let data = Bytes::copy_from_slice(&datagram[cursor.position() as usize..]);
        Ok(UdpHeader { frag, dst, data })
    }
}
