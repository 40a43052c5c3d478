//! Domain-specific error types for the USSD gateway link.
//!
//! All fallible operations return `Result<T, UssdError>`.
//! Errors split into two families: connection-level errors that end the
//! session (framing at end of stream, logon, transport) and dialog-level
//! errors that only drop the single event being answered (validation,
//! menu resolution).

use std::time::Duration;
use thiserror::Error;

/// The canonical error type for the USSD link.
#[derive(Debug, Error)]
pub enum UssdError {
    // ── Framing Errors ───────────────────────────────────────────
    /// Inbound bytes could not be cut into a frame.
    #[error("framing error: {0}")]
    Framing(#[from] FramingError),

    /// The encoded frame does not fit the 3-digit length field.
    #[error("frame too large: {size} bytes (max {max})")]
    FrameTooLarge { size: usize, max: usize },

    /// An outbound XML document could not be produced.
    #[error("encoding error: {0}")]
    Encoding(String),

    /// An inbound XML document could not be parsed.
    #[error("xml error: {0}")]
    Xml(String),

    // ── Session Errors ───────────────────────────────────────────
    /// The logon exchange failed.
    #[error("logon failed: {0}")]
    Handshake(String),

    /// No logon response arrived before the deadline.
    #[error("logon timed out after {0:?}")]
    HandshakeTimeout(Duration),

    // ── Connection Errors ────────────────────────────────────────
    /// The TCP/IO layer reported an error.
    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),

    /// The gateway closed the stream.
    #[error("connection closed by peer")]
    ConnectionClosed,

    /// The writer task has stopped; the link is gone.
    #[error("channel closed")]
    ChannelClosed,

    /// A bounded read produced nothing before its deadline.
    #[error("timeout after {0:?}")]
    Timeout(Duration),

    // ── Dialog Errors ────────────────────────────────────────────
    /// An inbound dialog event failed field validation.
    #[error("invalid dialog event: {0}")]
    Validation(#[from] ValidationError),

    /// The menu service failed or answered with garbage.
    #[error("menu resolver error: {0}")]
    Resolver(String),

    /// A lifecycle step was attempted from the wrong phase.
    #[error("protocol violation: {0}")]
    ProtocolViolation(&'static str),

    // ── Application Errors ───────────────────────────────────────
    /// Missing or malformed configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// Catch-all for errors that do not fit another variant.
    #[error("{0}")]
    Other(String),
}

impl UssdError {
    /// Returns `true` when the error means the connection can no longer
    /// be used and the session must end.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            UssdError::Transport(_)
                | UssdError::ConnectionClosed
                | UssdError::ChannelClosed
                | UssdError::Handshake(_)
                | UssdError::HandshakeTimeout(_)
        )
    }

    /// Returns `true` for a read deadline that expired with nothing
    /// buffered, i.e. "no message available".
    pub fn is_idle_timeout(&self) -> bool {
        matches!(self, UssdError::Timeout(_))
    }
}

// ── FramingError ─────────────────────────────────────────────────

/// Typed error for malformed or undersized frames.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FramingError {
    /// The length digits of the header are not ASCII decimal.
    #[error("invalid length field {0:?}")]
    InvalidLength(String),

    /// The declared length is smaller than the fixed part it must cover.
    #[error("declared length {declared} below minimum {min}")]
    LengthOutOfRange { declared: usize, min: usize },

    /// The stream ended or the deadline passed mid-frame.
    #[error("incomplete frame: got {received} of {expected} bytes")]
    Incomplete { expected: usize, received: usize },

    /// A session key longer than the 16-byte field.
    #[error("session key too long: {0} bytes")]
    InvalidKey(usize),
}

// ── ValidationError ──────────────────────────────────────────────

/// Reasons a continuing dialog event is dropped before menu resolution.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    /// `msgtype` is neither a menu request nor mobile-originated text.
    #[error("unsupported message type {0}")]
    UnsupportedMsgType(u8),

    /// `userdata` is absent or empty.
    #[error("missing user data")]
    MissingUserData,
}

// ── Convenient From implementations ──────────────────────────────

impl From<String> for UssdError {
    fn from(s: String) -> Self {
        UssdError::Other(s)
    }
}

impl From<&str> for UssdError {
    fn from(s: &str) -> Self {
        UssdError::Other(s.to_string())
    }
}

impl<T> From<tokio::sync::mpsc::error::SendError<T>> for UssdError {
    fn from(_: tokio::sync::mpsc::error::SendError<T>) -> Self {
        UssdError::ChannelClosed
    }
}

impl From<quick_xml::DeError> for UssdError {
    fn from(e: quick_xml::DeError) -> Self {
        UssdError::Xml(e.to_string())
    }
}

impl From<quick_xml::SeError> for UssdError {
    fn from(e: quick_xml::SeError) -> Self {
        UssdError::Encoding(e.to_string())
    }
}

impl From<reqwest::Error> for UssdError {
    fn from(e: reqwest::Error) -> Self {
        UssdError::Resolver(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_messages() {
        let e = UssdError::FrameTooLarge {
            size: 1200,
            max: 999,
        };
        assert!(e.to_string().contains("1200"));
        assert!(e.to_string().contains("999"));

        let e: UssdError = FramingError::Incomplete {
            expected: 25,
            received: 10,
        }
        .into();
        assert!(e.to_string().contains("10 of 25"));
    }

    #[test]
    fn from_string() {
        let e: UssdError = "something broke".into();
        assert!(matches!(e, UssdError::Other(_)));
    }

    #[test]
    fn from_io_is_fatal() {
        let io_err = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe broke");
        let e: UssdError = io_err.into();
        assert!(matches!(e, UssdError::Transport(_)));
        assert!(e.is_fatal());
    }

    #[test]
    fn dialog_errors_are_not_fatal() {
        let e: UssdError = ValidationError::MissingUserData.into();
        assert!(!e.is_fatal());
        assert!(!UssdError::Resolver("503".into()).is_fatal());
        assert!(!UssdError::Framing(FramingError::InvalidLength("x1".into())).is_fatal());
    }

    #[test]
    fn idle_timeout_classification() {
        assert!(UssdError::Timeout(Duration::from_secs(5)).is_idle_timeout());
        assert!(!UssdError::ConnectionClosed.is_idle_timeout());
    }
}
