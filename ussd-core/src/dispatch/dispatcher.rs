use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncRead;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::responder::Responder;
use crate::error::UssdError;
use crate::frame::Frame;
use crate::message::InboundMessage;
use crate::network::FrameReader;
use crate::task::DialogPool;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchTiming {
    /// Deadline for one frame read.
    pub read_timeout: Duration,
    /// Pause after an idle read or a recoverable read error.
    pub idle_backoff: Duration,
}

impl Default for DispatchTiming {
    fn default() -> Self {
        Self {
            read_timeout: Duration::from_secs(5),
            idle_backoff: Duration::from_secs(1),
        }
    }
}

/// The only reader of the gateway stream.
///
/// Dialog events are handed to the pool and reading resumes at once;
/// every other frame is discarded.
pub struct Dispatcher<R> {
    reader: FrameReader<R>,
    responder: Arc<Responder>,
    pool: DialogPool,
    timing: DispatchTiming,
}

impl<R: AsyncRead + Unpin> Dispatcher<R> {
    pub fn new(
        reader: FrameReader<R>,
        responder: Arc<Responder>,
        pool: DialogPool,
        timing: DispatchTiming,
    ) -> Self {
        Self {
            reader,
            responder,
            pool,
            timing,
        }
    }

    /// Read until `shutdown` fires or the stream fails for good.
    ///
    /// Idle reads and framing errors are logged and retried after a
    /// short pause; only fatal errors end the loop.
    pub async fn run(mut self, shutdown: CancellationToken) -> Result<(), UssdError> {
        loop {
            if shutdown.is_cancelled() {
                break;
            }

            let read = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                read = self.reader.read_frame(self.timing.read_timeout) => read,
            };

            match read {
                Ok(frame) => self.dispatch(frame),
                Err(e) if e.is_fatal() => {
                    error!("read loop stopping: {e}");
                    return Err(e);
                }
                Err(e) if e.is_idle_timeout() => {
                    debug!("no message available");
                    self.pause(&shutdown).await;
                }
                Err(e) => {
                    warn!(buffered = self.reader.buffered(), "read failed: {e}");
                    self.pause(&shutdown).await;
                }
            }
        }

        info!(in_flight = self.pool.in_flight(), "read loop stopped");
        Ok(())
    }

    fn dispatch(&self, frame: Frame) {
        let document = match frame.payload_str() {
            Ok(document) => document,
            Err(e) => {
                warn!(session_key = %frame.key(), "discarding frame: {e}");
                return;
            }
        };
        debug!(session_key = %frame.key(), payload = document, "[RECV] frame");

        match InboundMessage::parse(document) {
            Ok(InboundMessage::Dialog(request)) => {
                debug!(
                    msisdn = %request.msisdn,
                    request_id = %request.request_id,
                    "dispatching dialog event"
                );
                let responder = self.responder.clone();
                self.pool.spawn(async move {
                    let outcome = responder.handle(request).await;
                    debug!(?outcome, "dialog event done");
                });
            }
            Ok(InboundMessage::Other(tag)) => {
                debug!(root = %tag, "ignoring non-dialog frame");
            }
            Err(e) => {
                warn!(session_key = %frame.key(), "discarding unparsable frame: {e}");
            }
        }
    }

    async fn pause(&self, shutdown: &CancellationToken) {
        tokio::select! {
            _ = shutdown.cancelled() => {}
            _ = tokio::time::sleep(self.timing.idle_backoff) => {}
        }
    }
}
