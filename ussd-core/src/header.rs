//! The fixed 19-byte frame header.
//!
//! ```text
//! 0                16   19
//! +----------------+---+---------------------+
//! | session key    |len| XML body ...        |
//! | (16, padded)   |3d |                     |
//! +----------------+---+---------------------+
//! ```
//!
//! `len` is three ASCII decimal digits. What it counts depends on the
//! [`LengthMode`] agreed with the gateway; encoder and decoder of one
//! codec always use the same mode.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{FramingError, UssdError};

/// Width of the session key field.
pub const KEY_SIZE: usize = 16;
/// Width of the decimal length field.
pub const LENGTH_DIGITS: usize = 3;
/// Total header size on the wire.
pub const HEADER_SIZE: usize = KEY_SIZE + LENGTH_DIGITS;
/// Largest value the 3-digit length field can carry.
pub const MAX_DECLARED_LENGTH: usize = 999;

pub type HeaderBytes = [u8; HEADER_SIZE];

// ── SessionKey ───────────────────────────────────────────────────

/// A 16-byte, left-justified correlation token.
///
/// Shorter keys are NUL-padded on the wire; decoding strips trailing NUL
/// and space padding.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionKey([u8; KEY_SIZE]);

impl SessionKey {
    /// Build a key from text, rejecting anything wider than the field.
    pub fn new(key: &str) -> Result<Self, UssdError> {
        let bytes = key.as_bytes();
        if bytes.len() > KEY_SIZE {
            return Err(FramingError::InvalidKey(bytes.len()).into());
        }
        let mut raw = [0u8; KEY_SIZE];
        raw[..bytes.len()].copy_from_slice(bytes);
        Ok(Self(raw))
    }

    /// Build a key from text, silently cutting it to 16 bytes.
    pub fn truncated(key: &str) -> Self {
        let bytes = key.as_bytes();
        let len = bytes.len().min(KEY_SIZE);
        let mut raw = [0u8; KEY_SIZE];
        raw[..len].copy_from_slice(&bytes[..len]);
        Self(raw)
    }

    /// Wrap the raw header field as received.
    pub fn from_raw(raw: [u8; KEY_SIZE]) -> Self {
        Self(raw)
    }

    /// The raw field, padding included.
    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }

    /// The key with padding removed.
    pub fn as_str(&self) -> std::borrow::Cow<'_, str> {
        let end = self
            .0
            .iter()
            .rposition(|b| *b != 0 && *b != b' ')
            .map_or(0, |i| i + 1);
        String::from_utf8_lossy(&self.0[..end])
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_str())
    }
}

impl fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SessionKey({:?})", self.as_str())
    }
}

// ── LengthMode ───────────────────────────────────────────────────

/// What the 3-digit length field counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LengthMode {
    /// Whole frame: `declared = 19 + body`.
    #[default]
    FrameTotal,
    /// Key plus body: `declared = 16 + body`, so the receiver reads
    /// `declared - 16` bytes after the header.
    KeyAndBody,
}

impl LengthMode {
    /// Bytes the length field counts beyond the body.
    pub const fn overhead(self) -> usize {
        match self {
            LengthMode::FrameTotal => HEADER_SIZE,
            LengthMode::KeyAndBody => KEY_SIZE,
        }
    }

    /// Largest body that still fits the length field.
    pub const fn max_body(self) -> usize {
        MAX_DECLARED_LENGTH - self.overhead()
    }

    /// Declared length for a body of `body_len` bytes.
    pub fn declared_for(self, body_len: usize) -> Result<usize, UssdError> {
        let declared = body_len + self.overhead();
        if declared > MAX_DECLARED_LENGTH {
            return Err(UssdError::FrameTooLarge {
                size: declared,
                max: MAX_DECLARED_LENGTH,
            });
        }
        Ok(declared)
    }

    /// Body length implied by a declared length.
    pub fn body_len(self, declared: usize) -> Result<usize, FramingError> {
        declared
            .checked_sub(self.overhead())
            .ok_or(FramingError::LengthOutOfRange {
                declared,
                min: self.overhead(),
            })
    }
}

// ── FrameHeader ──────────────────────────────────────────────────

/// Parsed form of the 19 header bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    session_key: SessionKey,
    declared_length: usize,
}

impl FrameHeader {
    pub fn new(session_key: SessionKey, declared_length: usize) -> Result<Self, UssdError> {
        if declared_length > MAX_DECLARED_LENGTH {
            return Err(UssdError::FrameTooLarge {
                size: declared_length,
                max: MAX_DECLARED_LENGTH,
            });
        }
        Ok(Self {
            session_key,
            declared_length,
        })
    }

    pub fn to_bytes(&self) -> HeaderBytes {
        let mut header: HeaderBytes = [0; HEADER_SIZE];
        header[..KEY_SIZE].copy_from_slice(self.session_key.as_bytes());
        let digits = format!("{:03}", self.declared_length);
        header[KEY_SIZE..].copy_from_slice(digits.as_bytes());
        header
    }

    pub fn from_bytes(bytes: &HeaderBytes) -> Result<Self, FramingError> {
        let mut key = [0u8; KEY_SIZE];
        key.copy_from_slice(&bytes[..KEY_SIZE]);

        let digits = &bytes[KEY_SIZE..];
        if !digits.iter().all(u8::is_ascii_digit) {
            return Err(FramingError::InvalidLength(
                String::from_utf8_lossy(digits).into_owned(),
            ));
        }
        let declared_length = digits
            .iter()
            .fold(0usize, |acc, d| acc * 10 + usize::from(d - b'0'));

        Ok(Self {
            session_key: SessionKey::from_raw(key),
            declared_length,
        })
    }

    pub fn session_key(&self) -> SessionKey {
        self.session_key
    }

    pub fn declared_length(&self) -> usize {
        self.declared_length
    }
}
