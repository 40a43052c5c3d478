use std::time::Duration;

use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::error::UssdError;
use crate::frame::Frame;
use crate::header::SessionKey;
use crate::message::EnquireLink;
use crate::network::FrameSender;

/// Sends an enquire-link under the session key every `every`.
///
/// The scheduler never reads; acknowledgements reach the dispatcher like
/// any other frame.
#[derive(Debug)]
pub struct KeepaliveScheduler {
    sender: FrameSender,
    session_key: SessionKey,
    every: Duration,
}

impl KeepaliveScheduler {
    pub fn new(sender: FrameSender, session_key: SessionKey, every: Duration) -> Self {
        Self {
            sender,
            session_key,
            every,
        }
    }

    /// Tick until `shutdown` fires or a write fails. The first
    /// enquire-link goes out one interval after start.
    pub async fn run(self, shutdown: CancellationToken) -> Result<(), UssdError> {
        let document = EnquireLink.to_xml()?;
        let mut ticker = tokio::time::interval_at(Instant::now() + self.every, self.every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    debug!("keepalive stopped");
                    return Ok(());
                }
                _ = ticker.tick() => {
                    let frame = Frame::xml(self.session_key, document.clone());
                    if let Err(e) = self.sender.send(frame).await {
                        error!(session_key = %self.session_key, "enquire-link failed: {e}");
                        return Err(e);
                    }
                    debug!(session_key = %self.session_key, "enquire-link sent");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::UssdCodec;
    use crate::network::ConnectionGuard;
    use bytes::BytesMut;
    use tokio::io::AsyncReadExt;
    use tokio_util::codec::{Decoder, FramedWrite};

    #[tokio::test(start_paused = true)]
    async fn ticks_with_session_key_until_cancelled() {
        let (client, mut recorder) = tokio::io::duplex(4096);
        let guard = ConnectionGuard::spawn(
            FramedWrite::new(client, UssdCodec::default()),
            CancellationToken::new(),
            4,
        );
        let key = SessionKey::new("SESSIONKEY000001").unwrap();
        let shutdown = CancellationToken::new();
        let scheduler = KeepaliveScheduler::new(guard.sender(), key, Duration::from_secs(20));
        let task = tokio::spawn(scheduler.run(shutdown.clone()));

        tokio::time::sleep(Duration::from_secs(61)).await;
        shutdown.cancel();
        task.await.unwrap().unwrap();
        guard.close(Duration::from_secs(1)).await.unwrap();

        let mut captured = Vec::new();
        recorder.read_to_end(&mut captured).await.unwrap();
        let mut buf = BytesMut::from(&captured[..]);
        let mut codec = UssdCodec::default();
        let mut count = 0;
        while let Some(frame) = codec.decode(&mut buf).unwrap() {
            assert_eq!(frame.key(), key);
            assert_eq!(frame.payload(), b"<ENQRequest/>");
            count += 1;
        }
        assert_eq!(count, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn write_failure_is_reported() {
        let (client, recorder) = tokio::io::duplex(64);
        drop(recorder);
        let guard = ConnectionGuard::spawn(
            FramedWrite::new(client, UssdCodec::default()),
            CancellationToken::new(),
            4,
        );
        let scheduler = KeepaliveScheduler::new(
            guard.sender(),
            SessionKey::new("K").unwrap(),
            Duration::from_secs(1),
        );
        let result = scheduler.run(CancellationToken::new()).await;
        assert!(result.is_err());
    }
}
