//! One complete protocol message: header key plus XML body.

use std::fmt;

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{FramingError, UssdError};
use crate::header::{FrameHeader, HEADER_SIZE, HeaderBytes, LengthMode, SessionKey};

#[derive(Clone, PartialEq, Eq)]
pub struct Frame {
    key: SessionKey,
    payload: Bytes,
}

impl Frame {
    pub fn new(key: SessionKey, payload: impl Into<Bytes>) -> Self {
        Self {
            key,
            payload: payload.into(),
        }
    }

    /// Frame an XML document under `key`.
    pub fn xml(key: SessionKey, document: String) -> Self {
        Self::new(key, Bytes::from(document))
    }

    pub fn key(&self) -> SessionKey {
        self.key
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// The body as text, for parsing and logging.
    pub fn payload_str(&self) -> Result<&str, UssdError> {
        std::str::from_utf8(&self.payload).map_err(|e| UssdError::Xml(e.to_string()))
    }

    /// Header this frame gets under `mode`.
    pub fn header(&self, mode: LengthMode) -> Result<FrameHeader, UssdError> {
        let declared = mode.declared_for(self.payload.len())?;
        FrameHeader::new(self.key, declared)
    }

    /// Append the wire form of this frame to `dst`.
    pub fn encode_into(&self, mode: LengthMode, dst: &mut BytesMut) -> Result<(), UssdError> {
        let header = self.header(mode)?;
        dst.reserve(HEADER_SIZE + self.payload.len());
        dst.put_slice(&header.to_bytes());
        dst.put_slice(&self.payload);
        Ok(())
    }

    /// Wire form of this frame.
    pub fn to_bytes(&self, mode: LengthMode) -> Result<Vec<u8>, UssdError> {
        let mut buf = BytesMut::new();
        self.encode_into(mode, &mut buf)?;
        Ok(buf.to_vec())
    }

    /// Parse exactly one frame from `bytes`.
    ///
    /// Fewer bytes than the header declares is `Incomplete`; trailing
    /// bytes are rejected too so nothing is silently dropped.
    pub fn from_bytes(bytes: &[u8], mode: LengthMode) -> Result<Self, UssdError> {
        if bytes.len() < HEADER_SIZE {
            return Err(FramingError::Incomplete {
                expected: HEADER_SIZE,
                received: bytes.len(),
            }
            .into());
        }
        let mut raw: HeaderBytes = [0; HEADER_SIZE];
        raw.copy_from_slice(&bytes[..HEADER_SIZE]);
        let header = FrameHeader::from_bytes(&raw)?;
        let expected = HEADER_SIZE + mode.body_len(header.declared_length())?;

        if bytes.len() < expected {
            return Err(FramingError::Incomplete {
                expected,
                received: bytes.len(),
            }
            .into());
        } else if bytes.len() > expected {
            return Err(UssdError::Other(format!(
                "{} trailing bytes after frame",
                bytes.len() - expected
            )));
        }

        Ok(Self::new(
            header.session_key(),
            Bytes::copy_from_slice(&bytes[HEADER_SIZE..]),
        ))
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("key", &self.key)
            .field("payload", &String::from_utf8_lossy(&self.payload))
            .finish()
    }
}
