//! Deadline-bounded frame reads over the inbound half of the stream.

use std::time::Duration;

use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::time::Instant;
use tokio_util::codec::Decoder;

use crate::codec::UssdCodec;
use crate::error::{FramingError, UssdError};
use crate::frame::Frame;

const INITIAL_CAPACITY: usize = 1024;

/// Single-consumer reader of gateway frames.
///
/// Bytes received so far survive a timed-out read, so a frame that
/// straddles two read attempts is still decoded intact. `read_frame` is
/// cancel-safe for the same reason.
#[derive(Debug)]
pub struct FrameReader<R> {
    inner: R,
    codec: UssdCodec,
    buffer: BytesMut,
    eof: bool,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(inner: R, codec: UssdCodec) -> Self {
        Self {
            inner,
            codec,
            buffer: BytesMut::with_capacity(INITIAL_CAPACITY),
            eof: false,
        }
    }

    /// Bytes of an unfinished frame currently held.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Read one frame, waiting at most `timeout`.
    ///
    /// - nothing arrived: [`UssdError::Timeout`]
    /// - part of a frame arrived: [`FramingError::Incomplete`]; the
    ///   partial bytes are kept for the next call
    /// - the peer closed the stream: [`UssdError::ConnectionClosed`], or
    ///   `Incomplete` once if it closed mid-frame
    pub async fn read_frame(&mut self, timeout: Duration) -> Result<Frame, UssdError> {
        if self.eof {
            return Err(UssdError::ConnectionClosed);
        }
        let deadline = Instant::now() + timeout;

        loop {
            if let Some(frame) = self.codec.decode(&mut self.buffer)? {
                return Ok(frame);
            }

            match tokio::time::timeout_at(deadline, self.inner.read_buf(&mut self.buffer)).await {
                Ok(Ok(0)) => {
                    self.eof = true;
                    return match self.codec.decode_eof(&mut self.buffer)? {
                        Some(frame) => Ok(frame),
                        None => Err(UssdError::ConnectionClosed),
                    };
                }
                Ok(Ok(_)) => continue,
                Ok(Err(e)) => return Err(e.into()),
                Err(_) if self.buffer.is_empty() => return Err(UssdError::Timeout(timeout)),
                Err(_) => {
                    return Err(FramingError::Incomplete {
                        expected: self.codec.expected_len(&self.buffer),
                        received: self.buffer.len(),
                    }
                    .into());
                }
            }
        }
    }
}
