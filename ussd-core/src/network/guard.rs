//! Single-writer ownership of the outbound half of the stream.
//!
//! Every frame goes through one writer task, so a frame is always
//! written in full before the next one starts, no matter how many
//! dialogs and keepalives are sending at once.

use std::time::Duration;

use futures::SinkExt;
use tokio::io::AsyncWrite;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::codec::FramedWrite;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::codec::UssdCodec;
use crate::error::UssdError;
use crate::frame::Frame;
use crate::header::LengthMode;

struct WriteRequest {
    frame: Frame,
    done: oneshot::Sender<Result<(), UssdError>>,
}

/// Cloneable handle onto the serialized write path.
#[derive(Debug, Clone)]
pub struct FrameSender {
    tx: mpsc::Sender<WriteRequest>,
    mode: LengthMode,
}

impl FrameSender {
    /// Queue `frame` and wait until it has been written and flushed.
    ///
    /// A frame too large for the length field is rejected here and
    /// never reaches the socket.
    pub async fn send(&self, frame: Frame) -> Result<(), UssdError> {
        frame.header(self.mode)?;
        let (done, written) = oneshot::channel();
        self.tx.send(WriteRequest { frame, done }).await?;
        written.await.map_err(|_| UssdError::ChannelClosed)?
    }
}

/// Owns the writer task and the link-wide shutdown signal.
#[derive(Debug)]
pub struct ConnectionGuard {
    sender: FrameSender,
    writer: JoinHandle<Result<(), UssdError>>,
    shutdown: CancellationToken,
}

impl ConnectionGuard {
    /// Start the writer task over `sink`.
    ///
    /// A failed write cancels `shutdown`: the link is presumed dead.
    pub fn spawn<W>(
        sink: FramedWrite<W, UssdCodec>,
        shutdown: CancellationToken,
        queue_depth: usize,
    ) -> Self
    where
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let mode = sink.encoder().mode();
        let (tx, rx) = mpsc::channel(queue_depth.max(1));
        let writer = tokio::spawn(write_loop(sink, rx, shutdown.clone()));
        Self {
            sender: FrameSender { tx, mode },
            writer,
            shutdown,
        }
    }

    pub fn sender(&self) -> FrameSender {
        self.sender.clone()
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Ask readers and schedulers observing the token to stop.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Close the write half once every other sender is gone.
    ///
    /// Waits up to `grace` for the queue to drain; a writer still busy
    /// after that is aborted. Returns the write error that ended the
    /// link, if any.
    pub async fn close(self, grace: Duration) -> Result<(), UssdError> {
        let Self {
            sender, mut writer, ..
        } = self;
        drop(sender);

        match tokio::time::timeout(grace, &mut writer).await {
            Ok(Ok(result)) => result,
            Ok(Err(join)) => Err(UssdError::Other(format!("writer task failed: {join}"))),
            Err(_) => {
                warn!("writer still busy after {grace:?}; aborting");
                writer.abort();
                Ok(())
            }
        }
    }
}

async fn write_loop<W>(
    mut sink: FramedWrite<W, UssdCodec>,
    mut rx: mpsc::Receiver<WriteRequest>,
    shutdown: CancellationToken,
) -> Result<(), UssdError>
where
    W: AsyncWrite + Unpin,
{
    while let Some(WriteRequest { frame, done }) = rx.recv().await {
        let key = frame.key();
        debug!(
            session_key = %key,
            payload = %String::from_utf8_lossy(frame.payload()),
            "[SEND] frame"
        );

        if let Err(e) = sink.send(frame).await {
            error!(session_key = %key, "write failed: {e}");
            let reason = e.to_string();
            let _ = done.send(Err(e));
            shutdown.cancel();
            return Err(UssdError::Transport(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                reason,
            )));
        }
        let _ = done.send(Ok(()));
    }

    if let Err(e) = sink.close().await {
        warn!("closing write half: {e}");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header::SessionKey;
    use bytes::BytesMut;
    use std::pin::Pin;
    use std::task::{Context, Poll};
    use tokio::io::AsyncReadExt;
    use tokio_util::codec::Decoder;

    fn frame(key: &str, body: &str) -> Frame {
        Frame::new(SessionKey::new(key).unwrap(), body.as_bytes().to_vec())
    }

    /// A sink that accepts at most `chunk` bytes per write call, so a
    /// frame always takes several writes to go out.
    struct Trickle<W> {
        inner: W,
        chunk: usize,
    }

    impl<W: AsyncWrite + Unpin> AsyncWrite for Trickle<W> {
        fn poll_write(
            mut self: Pin<&mut Self>,
            cx: &mut Context<'_>,
            buf: &[u8],
        ) -> Poll<std::io::Result<usize>> {
            let n = buf.len().min(self.chunk);
            Pin::new(&mut self.inner).poll_write(cx, &buf[..n])
        }

        fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
            Pin::new(&mut self.inner).poll_flush(cx)
        }

        fn poll_shutdown(
            mut self: Pin<&mut Self>,
            cx: &mut Context<'_>,
        ) -> Poll<std::io::Result<()>> {
            Pin::new(&mut self.inner).poll_shutdown(cx)
        }
    }

    #[tokio::test]
    async fn concurrent_senders_never_interleave() {
        const SENDERS: usize = 32;

        let (client, mut recorder) = tokio::io::duplex(64 * 1024);
        let sink = FramedWrite::new(
            Trickle {
                inner: client,
                chunk: 7,
            },
            UssdCodec::default(),
        );
        let guard = ConnectionGuard::spawn(sink, CancellationToken::new(), 8);

        let mut handles = Vec::new();
        for i in 0..SENDERS {
            let sender = guard.sender();
            handles.push(tokio::spawn(async move {
                let body = format!("<USSDResponse><requestId>R{i}</requestId></USSDResponse>");
                sender.send(frame(&format!("R{i}"), &body)).await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }
        guard.close(Duration::from_secs(1)).await.unwrap();

        let mut captured = Vec::new();
        recorder.read_to_end(&mut captured).await.unwrap();

        let mut codec = UssdCodec::default();
        let mut buf = BytesMut::from(&captured[..]);
        let mut seen = Vec::new();
        while let Some(frame) = codec.decode(&mut buf).unwrap() {
            let body = frame.payload_str().unwrap().to_string();
            assert!(body.contains(&format!("<requestId>{}</requestId>", frame.key())));
            seen.push(frame.key().to_string());
        }
        assert!(buf.is_empty());
        seen.sort();
        seen.dedup();
        assert_eq!(seen.len(), SENDERS);
    }

    #[tokio::test]
    async fn oversized_frame_rejected_before_write() {
        let (client, _recorder) = tokio::io::duplex(1024);
        let guard = ConnectionGuard::spawn(
            FramedWrite::new(client, UssdCodec::default()),
            CancellationToken::new(),
            4,
        );
        let big = Frame::new(SessionKey::new("R1").unwrap(), vec![b'x'; 1000]);
        assert!(matches!(
            guard.sender().send(big).await,
            Err(UssdError::FrameTooLarge { .. })
        ));
        assert!(!guard.is_shutdown());
    }

    #[tokio::test]
    async fn write_failure_cancels_shutdown() {
        let (client, recorder) = tokio::io::duplex(1024);
        drop(recorder);
        let token = CancellationToken::new();
        let guard = ConnectionGuard::spawn(
            FramedWrite::new(client, UssdCodec::default()),
            token.clone(),
            4,
        );
        let sender = guard.sender();

        assert!(sender.send(frame("K", "<ENQRequest/>")).await.is_err());
        assert!(token.is_cancelled());
        assert!(matches!(
            sender.send(frame("K", "<ENQRequest/>")).await,
            Err(UssdError::ChannelClosed)
        ));
        drop(sender);
        assert!(guard.close(Duration::from_secs(1)).await.is_err());
    }
}
