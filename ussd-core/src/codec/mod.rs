use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder};

use crate::error::{FramingError, UssdError};
use crate::frame::Frame;
use crate::header::{FrameHeader, HEADER_SIZE, HeaderBytes, LengthMode};

/// Length-prefixed codec for gateway frames.
///
/// Decoding is incremental: a partially received frame stays in the
/// buffer until the rest arrives, so a slow peer never desynchronizes
/// the stream. A header whose length digits cannot be parsed leaves no
/// way to find the next frame boundary; the buffered bytes are dropped
/// and the error is returned.
#[derive(Debug, Clone, Copy, Default)]
pub struct UssdCodec {
    mode: LengthMode,
}

impl UssdCodec {
    pub fn new(mode: LengthMode) -> Self {
        Self { mode }
    }

    pub fn mode(&self) -> LengthMode {
        self.mode
    }

    /// Bytes needed to complete the frame at the head of `src`.
    pub fn expected_len(&self, src: &[u8]) -> usize {
        if src.len() < HEADER_SIZE {
            return HEADER_SIZE;
        }
        match self.peek_header(src) {
            Ok(header) => self
                .mode
                .body_len(header.declared_length())
                .map_or(HEADER_SIZE, |body| HEADER_SIZE + body),
            Err(_) => HEADER_SIZE,
        }
    }

    fn peek_header(&self, src: &[u8]) -> Result<FrameHeader, FramingError> {
        let mut raw: HeaderBytes = [0; HEADER_SIZE];
        raw.copy_from_slice(&src[..HEADER_SIZE]);
        FrameHeader::from_bytes(&raw)
    }
}

impl Decoder for UssdCodec {
    type Item = Frame;
    type Error = UssdError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.len() < HEADER_SIZE {
            src.reserve(HEADER_SIZE - src.len());
            return Ok(None);
        }

        let header = match self.peek_header(src) {
            Ok(header) => header,
            Err(e) => {
                src.clear();
                return Err(e.into());
            }
        };
        let body_len = match self.mode.body_len(header.declared_length()) {
            Ok(len) => len,
            Err(e) => {
                src.clear();
                return Err(e.into());
            }
        };

        let total = HEADER_SIZE + body_len;
        if src.len() < total {
            src.reserve(total - src.len());
            return Ok(None);
        }

        let mut frame = src.split_to(total);
        let payload = frame.split_off(HEADER_SIZE).freeze();
        Ok(Some(Frame::new(header.session_key(), payload)))
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.decode(src)? {
            Some(frame) => Ok(Some(frame)),
            None if src.is_empty() => Ok(None),
            None => {
                let err = FramingError::Incomplete {
                    expected: self.expected_len(src),
                    received: src.len(),
                };
                src.clear();
                Err(err.into())
            }
        }
    }
}

impl Encoder<Frame> for UssdCodec {
    type Error = UssdError;

    fn encode(&mut self, item: Frame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        item.encode_into(self.mode, dst)
    }
}
