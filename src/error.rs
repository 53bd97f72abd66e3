//! Error types for sockspipe
//!
//! Every fallible operation in the crate returns [`SocksError`]. Errors are
//! grouped by kind: protocol violations, socket failures, authentication
//! failures, cancellations, and reply-bearing SOCKS errors that carry the
//! REP code a server must put on the wire.

use std::io;
use thiserror::Error;

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, SocksError>;

/// Main error type for SOCKS5 operations
#[derive(Error, Debug)]
pub enum SocksError {
    /// Socket read/write/dial failure
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Malformed bytes, wrong version, or otherwise invalid wire data
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Credential mismatch or unsupported authentication method
    #[error("authentication error: {0}")]
    Auth(String),

    /// Deadline exceeded or parent context closed
    #[error("cancelled: {0}")]
    Cancelled(String),

    /// An error that maps to a SOCKS5 reply code.
    ///
    /// Raised server-side when a failure reply must be sent (unknown
    /// command, unreachable upstream, ...) and client-side when the proxy
    /// answered with a non-zero REP.
    #[error("{message}")]
    Socks {
        /// The REP code describing the failure
        code: ReplyCode,
        /// Human-readable context, including the original request
        message: String,
    },
}

impl SocksError {
    /// Build a reply-bearing error from a code and a message
    pub fn socks(code: ReplyCode, message: impl Into<String>) -> Self {
        SocksError::Socks {
            code,
            message: message.into(),
        }
    }

    /// The SOCKS5 reply code carried by this error, if any
    pub fn reply_code(&self) -> Option<ReplyCode> {
        match self {
            SocksError::Socks { code, .. } => Some(*code),
            _ => None,
        }
    }
}

/// Reply codes for the SOCKS5 protocol (the REP field)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ReplyCode {
    /// Request succeeded
    Succeeded = 0x00,
    /// General SOCKS server failure
    GeneralFailure = 0x01,
    /// Connection not allowed by ruleset
    ConnectionNotAllowed = 0x02,
    /// Network unreachable
    NetworkUnreachable = 0x03,
    /// Host unreachable
    HostUnreachable = 0x04,
    /// Connection refused
    ConnectionRefused = 0x05,
    /// TTL expired
    TtlExpired = 0x06,
    /// Command not supported
    CommandNotSupported = 0x07,
    /// Address type not supported
    AddressTypeNotSupported = 0x08,
}

impl ReplyCode {
    /// Classify a dial failure into the reply code to send back.
    ///
    /// Anything that is not an identifiable network-layer failure counts as
    /// host-unreachable, the default classification for failed upstream
    /// dials.
    pub fn classify_dial(err: &SocksError) -> ReplyCode {
        match err {
            SocksError::Io(e) => ReplyCode::from(e),
            SocksError::Cancelled(_) => ReplyCode::HostUnreachable,
            _ => ReplyCode::GeneralFailure,
        }
    }
}

impl std::fmt::Display for ReplyCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            ReplyCode::Succeeded => "succeeded",
            ReplyCode::GeneralFailure => "general SOCKS server failure",
            ReplyCode::ConnectionNotAllowed => "connection not allowed by ruleset",
            ReplyCode::NetworkUnreachable => "network unreachable",
            ReplyCode::HostUnreachable => "host unreachable",
            ReplyCode::ConnectionRefused => "connection refused",
            ReplyCode::TtlExpired => "TTL expired",
            ReplyCode::CommandNotSupported => "command not supported",
            ReplyCode::AddressTypeNotSupported => "address type not supported",
        };
        f.write_str(text)
    }
}

impl From<ReplyCode> for u8 {
    fn from(code: ReplyCode) -> Self {
        code as u8
    }
}

impl TryFrom<u8> for ReplyCode {
    type Error = SocksError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0x00 => Ok(ReplyCode::Succeeded),
            0x01 => Ok(ReplyCode::GeneralFailure),
            0x02 => Ok(ReplyCode::ConnectionNotAllowed),
            0x03 => Ok(ReplyCode::NetworkUnreachable),
            0x04 => Ok(ReplyCode::HostUnreachable),
            0x05 => Ok(ReplyCode::ConnectionRefused),
            0x06 => Ok(ReplyCode::TtlExpired),
            0x07 => Ok(ReplyCode::CommandNotSupported),
            0x08 => Ok(ReplyCode::AddressTypeNotSupported),
            other => Err(SocksError::Protocol(format!(
                "unknown reply code ({other:#04x})"
            ))),
        }
    }
}

impl From<&io::Error> for ReplyCode {
    fn from(err: &io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::ConnectionRefused => ReplyCode::ConnectionRefused,
            io::ErrorKind::PermissionDenied => ReplyCode::ConnectionNotAllowed,
            io::ErrorKind::NetworkUnreachable => ReplyCode::NetworkUnreachable,
            _ => ReplyCode::HostUnreachable,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reply_code_round_trip() {
        for byte in 0x00..=0x08u8 {
            let code = ReplyCode::try_from(byte).unwrap();
            assert_eq!(u8::from(code), byte);
        }
    }

    #[test]
    fn reply_code_rejects_unknown() {
        assert!(ReplyCode::try_from(0x09).is_err());
        assert!(ReplyCode::try_from(0xFF).is_err());
    }

    #[test]
    fn dial_errors_classify() {
        let refused = io::Error::new(io::ErrorKind::ConnectionRefused, "refused");
        assert_eq!(ReplyCode::from(&refused), ReplyCode::ConnectionRefused);

        let denied = io::Error::new(io::ErrorKind::PermissionDenied, "denied");
        assert_eq!(ReplyCode::from(&denied), ReplyCode::ConnectionNotAllowed);

        let timed_out = io::Error::new(io::ErrorKind::TimedOut, "timed out");
        assert_eq!(ReplyCode::from(&timed_out), ReplyCode::HostUnreachable);

        let other = io::Error::new(io::ErrorKind::Other, "other");
        assert_eq!(ReplyCode::from(&other), ReplyCode::HostUnreachable);
    }

    #[test]
    fn classify_dial_defaults_to_host_unreachable() {
        let cancelled = SocksError::Cancelled("deadline".into());
        assert_eq!(
            ReplyCode::classify_dial(&cancelled),
            ReplyCode::HostUnreachable
        );

        let protocol = SocksError::Protocol("bad".into());
        assert_eq!(
            ReplyCode::classify_dial(&protocol),
            ReplyCode::GeneralFailure
        );
    }

    #[test]
    fn socks_error_exposes_code() {
        let err = SocksError::socks(ReplyCode::CommandNotSupported, "unknown command");
        assert_eq!(err.reply_code(), Some(ReplyCode::CommandNotSupported));
        assert_eq!(format!("{}", err), "unknown command");

        let io_err: SocksError = io::Error::new(io::ErrorKind::Other, "boom").into();
        assert_eq!(io_err.reply_code(), None);
    }
}
